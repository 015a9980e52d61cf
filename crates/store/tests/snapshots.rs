//! Snapshot export/restore tests.

mod fixtures;

use fixtures::{commitment_store, key_query};
use strata_store::snapshot::{SnapshotIavlItem, SnapshotItem, SnapshotReader, SnapshotWriter};
use strata_store::ss::StateStore;
use strata_store::RootStore;
use strata_types::{StoreError, StoreKey, StoreKind};

/// Build a two-store source with a few versions of history and export it at
/// its latest height.
fn export_source(with_ss: bool) -> (fixtures::TestStore, i64, Vec<u8>) {
    let store = commitment_store(&["bank", "staking"], with_ss);

    store.write("bank", b"acct/1", b"100");
    store.write("staking", b"val", b"7");
    store.root.commit(true);
    store.write("bank", b"acct/2", b"200");
    store.root.commit(true);
    store.write("bank", b"acct/1", b"150");
    let commit = store.root.commit(true);

    let mut writer = SnapshotWriter::new(Vec::new());
    store
        .root
        .snapshot(commit.version as u64, &mut writer)
        .unwrap();
    (store, commit.version, writer.into_inner())
}

/// A fresh root over empty engines, mounted but not loaded.
fn fresh_target(names: &[&str], with_ss: bool) -> fixtures::TestStore {
    let sc = std::sync::Arc::new(strata_store_memory::MemCommitter::new());
    let ss = with_ss.then(|| std::sync::Arc::new(strata_store_memory::MemStateStore::new()));
    let root = RootStore::new(
        sc.clone(),
        ss.clone()
            .map(|ss| ss as std::sync::Arc<dyn strata_store::ss::StateStore>),
        Default::default(),
    );
    let mut keys = std::collections::HashMap::new();
    for name in names {
        let key = StoreKey::commitment(*name);
        root.mount(&key, StoreKind::Commitment).unwrap();
        keys.insert(name.to_string(), key);
    }
    fixtures::TestStore { root, sc, ss, keys }
}

#[test]
fn test_snapshot_roundtrip_preserves_app_hash() {
    let (source, height, bytes) = export_source(false);
    let source_hash = source.root.last_commit_id().hash;

    let target = fresh_target(&["bank", "staking"], false);
    let mut reader = SnapshotReader::new(bytes.as_slice());
    target.root.restore(height as u64, &mut reader).unwrap();

    let restored = target.root.last_commit_id();
    assert_eq!(restored.version, height);
    assert_eq!(restored.hash, source_hash);

    // Proof-bearing queries work at the restored height.
    let res = target
        .root
        .query(&key_query("bank", b"acct/1", height, true))
        .unwrap();
    assert_eq!(res.value, b"150");
    res.proof_ops
        .unwrap()
        .verify("bank", b"acct/1", Some(b"150"), restored.hash)
        .unwrap();
}

#[test]
fn test_restore_feeds_state_storage() {
    let (_source, height, bytes) = export_source(true);

    let target = fresh_target(&["bank", "staking"], true);
    let mut reader = SnapshotReader::new(bytes.as_slice());
    target.root.restore(height as u64, &mut reader).unwrap();

    let ss = target.ss.as_ref().unwrap();
    assert_eq!(ss.latest_version(), height);
    assert_eq!(ss.earliest_version(), height);

    // Push the latest version past the restore height so historical queries
    // route through state storage.
    target.write("bank", b"acct/3", b"300");
    let next = target.root.commit(true);
    target.wait_for_ss(next.version);

    let res = target
        .root
        .query(&key_query("bank", b"acct/1", height, false))
        .unwrap();
    assert_eq!(res.value, b"150");
}

#[test]
fn test_snapshot_height_overflow() {
    let (source, _, _) = export_source(false);
    let mut writer = SnapshotWriter::new(Vec::new());
    assert!(matches!(
        source.root.snapshot(u32::MAX as u64 + 1, &mut writer),
        Err(StoreError::VersionOverflow { .. })
    ));
}

#[test]
fn test_restore_rejects_node_height_overflow_then_retries() {
    let (_source, height, good_bytes) = export_source(false);

    let mut writer = SnapshotWriter::new(Vec::new());
    writer.write_item(&SnapshotItem::store("bank")).unwrap();
    writer
        .write_item(&SnapshotItem {
            item: Some(strata_store::snapshot::snapshot_item::Item::Iavl(
                SnapshotIavlItem {
                    key: b"k".to_vec(),
                    value: b"v".to_vec(),
                    height: 200,
                    version: 1,
                },
            )),
        })
        .unwrap();
    let bad_bytes = writer.into_inner();

    let target = fresh_target(&["bank", "staking"], false);
    let mut reader = SnapshotReader::new(bad_bytes.as_slice());
    assert!(matches!(
        target.root.restore(height as u64, &mut reader),
        Err(StoreError::NodeHeightOverflow { height: 200 })
    ));

    // Nothing of the partial stream was applied.
    assert_eq!(target.root.last_commit_id().version, 0);

    // A full retry succeeds.
    let mut reader = SnapshotReader::new(good_bytes.as_slice());
    target.root.restore(height as u64, &mut reader).unwrap();
    assert_eq!(target.root.last_commit_id().version, height);
}

#[test]
fn test_restore_stops_at_unknown_item() {
    let (_source, height, _bytes) = export_source(false);

    // Store header, one leaf, then an unknown (empty) item ends the stream.
    let mut writer = SnapshotWriter::new(Vec::new());
    writer.write_item(&SnapshotItem::store("bank")).unwrap();
    writer
        .write_item(&SnapshotItem {
            item: Some(strata_store::snapshot::snapshot_item::Item::Iavl(
                SnapshotIavlItem {
                    key: b"k".to_vec(),
                    value: b"v".to_vec(),
                    height: 0,
                    version: height,
                },
            )),
        })
        .unwrap();
    writer.write_item(&SnapshotItem { item: None }).unwrap();
    let bytes = writer.into_inner();

    let target = fresh_target(&["bank"], false);
    let mut reader = SnapshotReader::new(bytes.as_slice());
    target.root.restore(height as u64, &mut reader).unwrap();
    assert_eq!(
        target.root.kv_store(target.key("bank")).get(b"k"),
        Some(b"v".to_vec())
    );
}

#[test]
fn test_restore_rejects_node_before_header() {
    let mut writer = SnapshotWriter::new(Vec::new());
    writer
        .write_item(&SnapshotItem {
            item: Some(strata_store::snapshot::snapshot_item::Item::Iavl(
                SnapshotIavlItem {
                    key: b"k".to_vec(),
                    value: b"v".to_vec(),
                    height: 0,
                    version: 1,
                },
            )),
        })
        .unwrap();
    let bytes = writer.into_inner();

    let target = fresh_target(&["bank"], false);
    let mut reader = SnapshotReader::new(bytes.as_slice());
    assert!(matches!(
        target.root.restore(1, &mut reader),
        Err(StoreError::InvalidSnapshot(_))
    ));
}
