//! Ordered merge of a write overlay over a base range.
//!
//! Both the commitment sub-store (pending writes over the committed tree) and
//! the cache layer (dirty writes over a parent store) need the same view: an
//! ordered scan where overlay entries shadow base entries and tombstones hide
//! them entirely.

use crate::kv::KvIter;
use std::cmp::Ordering;
use std::iter::Peekable;

/// Merge an overlay range into a base range, both sorted in the same
/// direction.
///
/// Overlay items are `(key, Some(value))` for writes and `(key, None)` for
/// tombstones; on a key collision the overlay wins and tombstoned keys are
/// skipped. `reverse` must match the direction both inputs are sorted in.
pub fn merge_iter(
    overlay: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    base: KvIter,
    reverse: bool,
) -> KvIter {
    Box::new(MergedIter {
        overlay: overlay.into_iter().peekable(),
        base: base.peekable(),
        reverse,
    })
}

struct MergedIter {
    overlay: Peekable<std::vec::IntoIter<(Vec<u8>, Option<Vec<u8>>)>>,
    base: Peekable<KvIter>,
    reverse: bool,
}

fn key_order(reverse: bool, overlay_key: &[u8], base_key: &[u8]) -> Ordering {
    let ord = overlay_key.cmp(base_key);
    if reverse {
        ord.reverse()
    } else {
        ord
    }
}

impl Iterator for MergedIter {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let ord = match (self.overlay.peek(), self.base.peek()) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((ok, _)), Some((bk, _))) => key_order(self.reverse, ok, bk),
            };

            match ord {
                Ordering::Less => {
                    let (key, value) = self.overlay.next().expect("peeked");
                    if let Some(value) = value {
                        return Some((key, value));
                    }
                    // tombstone with no base entry underneath
                }
                Ordering::Greater => return self.base.next(),
                Ordering::Equal => {
                    let (key, value) = self.overlay.next().expect("peeked");
                    self.base.next();
                    if let Some(value) = value {
                        return Some((key, value));
                    }
                    // tombstone shadowing the base entry
                }
            }
        }
    }
}
