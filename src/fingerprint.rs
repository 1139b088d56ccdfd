//! Snapshot fingerprint: a content-addressable digest over the
//! canonical-order entry list, independent of storage internals.
//!
//! Uses the same `Digest`-trait hashing family (`md-5`) as the per-file
//! playback digest in `player.rs`, so the crate does not pull in a second
//! hash algorithm just for this.

use crate::model::Entry;
use md5::{Digest, Md5};

/// Computes the fingerprint over `entries`, which must already be in
/// canonical (sorted) order. Two snapshots with identical fingerprints are
/// guaranteed by this wire form to produce identical streams.
pub fn compute_fingerprint(entries: &[Entry]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for entry in entries {
        write_bytes(&mut hasher, &entry.arc_path);
        hasher.update([entry.kind.typeflag()]);
        hasher.update(entry.size.to_le_bytes());
        hasher.update(entry.mode.to_le_bytes());
        hasher.update(entry.mtime.to_le_bytes());
        match &entry.link_target {
            Some(target) => {
                hasher.update([1u8]);
                write_bytes(&mut hasher, target);
            }
            None => hasher.update([0u8]),
        }
    }
    hasher.finalize().into()
}

fn write_bytes(hasher: &mut Md5, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    fn entry(arc_path: &str) -> Entry {
        Entry {
            arc_path: arc_path.as_bytes().to_vec(),
            kind: EntryKind::File,
            size: 10,
            mode: 0o644,
            mtime: 100,
            link_target: None,
            start_offset: 0,
            payload_blocks: 1,
        }
    }

    #[test]
    fn identical_input_yields_identical_fingerprint() {
        let a = vec![entry("a"), entry("b")];
        let b = vec![entry("a"), entry("b")];
        assert_eq!(compute_fingerprint(&a), compute_fingerprint(&b));
    }

    #[test]
    fn differing_content_yields_differing_fingerprint() {
        let a = vec![entry("a")];
        let b = vec![entry("a-different-name")];
        assert_ne!(compute_fingerprint(&a), compute_fingerprint(&b));
    }

    #[test]
    fn fingerprint_ignores_start_offset() {
        // start_offset/payload_blocks are derived, not identity; the
        // fingerprint must not depend on them directly (it's recomputed
        // from kind/size anyway, but guard against accidental inclusion).
        let mut a = entry("a");
        let mut b = entry("a");
        a.start_offset = 0;
        b.start_offset = 99999;
        assert_eq!(compute_fingerprint(&[a]), compute_fingerprint(&[b]));
    }
}
