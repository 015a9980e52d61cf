//! Snapshot wire format.
//!
//! A snapshot is a stream of uvarint length-delimited protobuf messages. A
//! `Store` item opens a sub-store; every `Iavl` item that follows belongs to
//! it until the next `Store` item or end of stream. The framing matches the
//! inherited wire layout, so snapshots interoperate across implementations
//! that share the message schema.

use crate::sc::SnapshotNode;
use prost::Message;
use std::io::{Read, Write};
use strata_types::StoreError;

/// Header opening a new sub-store in the stream.
#[derive(Clone, PartialEq, Message)]
pub struct SnapshotStoreItem {
    /// Sub-store name.
    #[prost(string, tag = "1")]
    pub name: String,
}

/// One tree node of the current sub-store.
#[derive(Clone, PartialEq, Message)]
pub struct SnapshotIavlItem {
    /// Node key.
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    /// Node value.
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
    /// Tree height; leaves are 0. Bounded to `i8::MAX` on import.
    #[prost(int32, tag = "3")]
    pub height: i32,
    /// Version the node was created at.
    #[prost(int64, tag = "4")]
    pub version: i64,
}

/// One framed snapshot message.
#[derive(Clone, PartialEq, Message)]
pub struct SnapshotItem {
    /// The item payload. `None` decodes from unknown item kinds and ends the
    /// restore loop.
    #[prost(oneof = "snapshot_item::Item", tags = "1, 2")]
    pub item: Option<snapshot_item::Item>,
}

/// Oneof payload of [`SnapshotItem`].
pub mod snapshot_item {
    /// The concrete item kinds.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Item {
        /// Sub-store header.
        #[prost(message, tag = "1")]
        Store(super::SnapshotStoreItem),
        /// Tree node.
        #[prost(message, tag = "2")]
        Iavl(super::SnapshotIavlItem),
    }
}

impl SnapshotItem {
    /// A `Store` header item.
    pub fn store(name: impl Into<String>) -> Self {
        Self {
            item: Some(snapshot_item::Item::Store(SnapshotStoreItem {
                name: name.into(),
            })),
        }
    }

    /// An `Iavl` node item.
    pub fn node(node: &SnapshotNode) -> Self {
        Self {
            item: Some(snapshot_item::Item::Iavl(SnapshotIavlItem {
                key: node.key.clone(),
                value: node.value.clone(),
                height: node.height as i32,
                version: node.version,
            })),
        }
    }
}

/// Writes length-delimited snapshot items to a byte sink.
pub struct SnapshotWriter<W: Write> {
    inner: W,
}

impl<W: Write> SnapshotWriter<W> {
    /// Wrap a sink.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Frame and write one item.
    pub fn write_item(&mut self, item: &SnapshotItem) -> Result<(), StoreError> {
        let mut buf = Vec::with_capacity(item.encoded_len() + 10);
        item.encode_length_delimited(&mut buf)
            .map_err(|e| StoreError::Internal(format!("snapshot item encoding failed: {e}")))?;
        self.inner
            .write_all(&buf)
            .map_err(|e| StoreError::Internal(format!("snapshot write failed: {e}")))
    }

    /// Unwrap the sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads length-delimited snapshot items from a byte source.
pub struct SnapshotReader<R: Read> {
    inner: R,
}

impl<R: Read> SnapshotReader<R> {
    /// Wrap a source.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one framed item; `None` at clean end of stream.
    pub fn read_item(&mut self) -> Result<Option<SnapshotItem>, StoreError> {
        let len = match self.read_uvarint()? {
            Some(len) => len,
            None => return Ok(None),
        };
        if len > MAX_ITEM_LEN {
            return Err(StoreError::InvalidSnapshot(format!(
                "item length {len} exceeds {MAX_ITEM_LEN}"
            )));
        }

        let mut buf = vec![0u8; len as usize];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| StoreError::InvalidSnapshot(format!("truncated item body: {e}")))?;
        SnapshotItem::decode(buf.as_slice())
            .map(Some)
            .map_err(|e| StoreError::InvalidSnapshot(format!("invalid protobuf message: {e}")))
    }

    /// Read a protobuf uvarint; `None` when the stream ends cleanly before
    /// the first byte.
    fn read_uvarint(&mut self) -> Result<Option<u64>, StoreError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let mut byte = [0u8; 1];
            match self.inner.read(&mut byte) {
                Ok(0) if shift == 0 => return Ok(None),
                Ok(0) => {
                    return Err(StoreError::InvalidSnapshot(
                        "truncated length prefix".to_string(),
                    ))
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(StoreError::InvalidSnapshot(format!(
                        "length prefix read failed: {e}"
                    )))
                }
            }

            value |= u64::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                return Ok(Some(value));
            }
            shift += 7;
            if shift >= 64 {
                return Err(StoreError::InvalidSnapshot(
                    "length prefix overflow".to_string(),
                ));
            }
        }
    }
}

/// Upper bound on one framed item: a node is one key/value pair plus fixed
/// overhead, and values in the state layer stay far below this.
const MAX_ITEM_LEN: u64 = 64 << 20;

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(items: &[SnapshotItem]) -> Vec<SnapshotItem> {
        let mut writer = SnapshotWriter::new(Vec::new());
        for item in items {
            writer.write_item(item).unwrap();
        }
        let bytes = writer.into_inner();

        let mut reader = SnapshotReader::new(bytes.as_slice());
        let mut out = Vec::new();
        while let Some(item) = reader.read_item().unwrap() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_stream_roundtrip() {
        let node = SnapshotNode {
            key: b"acct/1".to_vec(),
            value: b"100".to_vec(),
            height: 0,
            version: 7,
        };
        let items = vec![SnapshotItem::store("bank"), SnapshotItem::node(&node)];
        assert_eq!(roundtrip(&items), items);
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = SnapshotReader::new(&[][..]);
        assert!(reader.read_item().unwrap().is_none());
    }

    #[test]
    fn test_truncated_body_rejected() {
        let mut writer = SnapshotWriter::new(Vec::new());
        writer.write_item(&SnapshotItem::store("bank")).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() - 1);

        let mut reader = SnapshotReader::new(bytes.as_slice());
        assert!(matches!(
            reader.read_item(),
            Err(StoreError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_empty_value_survives_roundtrip() {
        let node = SnapshotNode {
            key: b"k".to_vec(),
            value: Vec::new(),
            height: 0,
            version: 1,
        };
        let out = roundtrip(&[SnapshotItem::node(&node)]);
        match &out[0].item {
            Some(snapshot_item::Item::Iavl(item)) => {
                assert_eq!(item.key, b"k");
                assert!(item.value.is_empty());
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }
}
