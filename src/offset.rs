//! Offset planner: assigns `start_offset`/`payload_blocks` and answers
//! "what lives at byte `o`?".
//!
//! The per-entry `offset`/`size` index idea is grounded on
//! `kata-containers`' `tarindex/src/lib.rs`.

use crate::model::{Entry, Region, BLOCK_LEN, TERMINATOR_LEN};

/// Assigns `start_offset` and `payload_blocks` to each entry in place, in a
/// single left-to-right pass, and returns the total stream length `L`
/// (including the 1024-byte terminator).
pub fn plan_offsets(entries: &mut [Entry]) -> u64 {
    let mut cursor = 0u64;
    for entry in entries.iter_mut() {
        entry.payload_blocks = Entry::compute_payload_blocks(entry.kind, entry.size);
        entry.start_offset = cursor;
        cursor += entry.span();
    }
    cursor + TERMINATOR_LEN
}

/// Maps an absolute byte offset strictly inside `[0, L)` to
/// `(index, region, local_offset)`. `index == entries.len()` means the
/// offset falls in the terminator. Callers are responsible for handling
/// `offset == L` (end of stream) and `offset > L` (`InvalidOffsetError`)
/// before calling this.
pub fn locate(entries: &[Entry], offset: u64) -> (usize, Region, u64) {
    let body_end = entries
        .last()
        .map(|e| e.start_offset + e.span())
        .unwrap_or(0);
    if offset >= body_end {
        return (entries.len(), Region::Terminator, offset - body_end);
    }
    let idx = match entries.binary_search_by(|e| e.start_offset.cmp(&offset)) {
        Ok(i) => i,
        Err(0) => 0,
        Err(i) => i - 1,
    };
    let entry = &entries[idx];
    let header_end = entry.start_offset + BLOCK_LEN;
    let payload_end = header_end + entry.size;
    if offset < header_end {
        (idx, Region::Header, offset - entry.start_offset)
    } else if offset < payload_end {
        (idx, Region::Body, offset - header_end)
    } else {
        (idx, Region::Padding, offset - payload_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    fn entry(kind: EntryKind, size: u64) -> Entry {
        Entry {
            arc_path: b"x".to_vec(),
            kind,
            size,
            mode: 0o644,
            mtime: 0,
            link_target: None,
            start_offset: 0,
            payload_blocks: 0,
        }
    }

    #[test]
    fn offsets_chain_left_to_right() {
        let mut entries = vec![entry(EntryKind::Dir, 0), entry(EntryKind::File, 1000)];
        let len = plan_offsets(&mut entries);
        assert_eq!(entries[0].start_offset, 0);
        assert_eq!(entries[1].start_offset, 512);
        // 1000 bytes -> 2 blocks (1024) of payload.
        assert_eq!(entries[1].payload_blocks, 2);
        assert_eq!(len, 512 + 512 + 1024 + 1024);
    }

    #[test]
    fn locate_maps_header_body_padding_terminator() {
        let mut entries = vec![entry(EntryKind::File, 1)];
        plan_offsets(&mut entries);
        assert_eq!(locate(&entries, 0), (0, Region::Header, 0));
        assert_eq!(locate(&entries, 511), (0, Region::Header, 511));
        assert_eq!(locate(&entries, 512), (0, Region::Body, 0));
        assert_eq!(locate(&entries, 513), (0, Region::Padding, 0));
        assert_eq!(locate(&entries, 1024), (1, Region::Terminator, 0));
        assert_eq!(locate(&entries, 2047), (1, Region::Terminator, 1023));
    }

    #[test]
    fn empty_archive_is_all_terminator() {
        let entries: Vec<Entry> = Vec::new();
        assert_eq!(locate(&entries, 0), (0, Region::Terminator, 0));
    }
}
