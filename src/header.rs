//! Pure USTAR header codec with GNU base-256 size fallback.
//!
//! Grounded on `TarOutput::tar_write_dir`/`tar_write_file`'s manual
//! 512-byte buffer with a space-fill-then-sum-then-overwrite checksum, and
//! `alexcrichton-tar-rs`'s `Header` (fixed byte offsets, octal helpers).

use crate::error::{Result, TartapeError};
use crate::model::{Entry, EntryKind};
use crate::options::Options;

pub const HEADER_LEN: usize = 512;

/// Size at and above which the GNU base-256 extension is used instead of
/// the 11-octal-digit field (2^33 == 8 GiB, the largest value 11 octal
/// digits can hold).
const BASE256_THRESHOLD: u64 = 1u64 << 33;

/// Encodes `entry` as exactly 512 raw header bytes.
///
/// A pure function of `(arc_path, kind, size, mode, mtime, link_target)`
/// plus the identity-flattening `opts`; no clock, locale, or environment
/// input is consulted.
pub fn encode_header(entry: &Entry, opts: &Options) -> Result<[u8; HEADER_LEN]> {
    let mut h = [0u8; HEADER_LEN];

    match entry.kind {
        EntryKind::Dir => {
            if entry.arc_path.len() > 100 {
                return Err(TartapeError::DirectoryNameTooLong {
                    name: String::from_utf8_lossy(&entry.arc_path).into_owned(),
                    len: entry.arc_path.len(),
                });
            }
            h[0..entry.arc_path.len()].copy_from_slice(&entry.arc_path);
        }
        EntryKind::File | EntryKind::Symlink => {
            let (name, prefix) = split_path(&entry.arc_path).ok_or_else(|| {
                TartapeError::PathTooLong {
                    path: std::path::PathBuf::from(String::from_utf8_lossy(&entry.arc_path).into_owned()),
                    len: entry.arc_path.len(),
                }
            })?;
            h[0..name.len()].copy_from_slice(&name);
            h[345..345 + prefix.len()].copy_from_slice(&prefix);
        }
    }

    write_octal(&mut h[100..108], entry.mode as u64, 7); // mode
    write_octal_space(&mut h[108..116], opts.uid() as u64); // uid, flattened
    write_octal_space(&mut h[116..124], opts.gid() as u64); // gid, flattened
    write_size(&mut h[124..136], entry.size);
    write_octal(&mut h[136..148], entry.mtime.max(0) as u64, 11); // mtime

    h[148..156].copy_from_slice(b"        "); // checksum placeholder
    h[156] = entry.kind.typeflag();

    if let Some(target) = &entry.link_target {
        h[157..157 + target.len()].copy_from_slice(target);
    }

    h[257..263].copy_from_slice(b"ustar\0");
    h[263..265].copy_from_slice(b"00");

    let uname = opts.uname().as_bytes();
    let ulen = uname.len().min(32);
    h[265..265 + ulen].copy_from_slice(&uname[..ulen]);

    let gname = opts.gname().as_bytes();
    let glen = gname.len().min(32);
    h[297..297 + glen].copy_from_slice(&gname[..glen]);

    // devmajor/devminor (329..345) and pad (500..512) stay zero.

    let sum: u32 = h.iter().map(|b| *b as u32).sum();
    let cksum = format!("{sum:06o}\0 ");
    h[148..156].copy_from_slice(cksum.as_bytes());

    Ok(h)
}

/// Splits `arc_path` into `(name, prefix)` under the 100/155 rule. Returns
/// `None` if no valid split exists (the path is illegal).
pub(crate) fn split_path(arc_path: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    if arc_path.len() <= 100 {
        return Some((arc_path.to_vec(), Vec::new()));
    }
    for i in (0..arc_path.len()).rev() {
        if arc_path[i] == b'/' {
            let suffix_len = arc_path.len() - i - 1;
            let prefix_len = i;
            if suffix_len <= 100 && suffix_len > 0 && prefix_len <= 155 {
                return Some((arc_path[i + 1..].to_vec(), arc_path[..i].to_vec()));
            }
        }
    }
    None
}

fn write_octal(dst: &mut [u8], value: u64, digits: usize) {
    debug_assert_eq!(dst.len(), digits + 1);
    let s = format!("{value:0digits$o}\0");
    dst.copy_from_slice(s.as_bytes());
}

fn write_octal_space(dst: &mut [u8], value: u64) {
    debug_assert_eq!(dst.len(), 8);
    let s = format!("{value:06o}\0 ");
    dst.copy_from_slice(s.as_bytes());
}

fn write_size(dst: &mut [u8], size: u64) {
    debug_assert_eq!(dst.len(), 12);
    if size < BASE256_THRESHOLD {
        write_octal(dst, size, 11);
    } else {
        dst.fill(0);
        dst[0] = 0x80;
        dst[4..12].copy_from_slice(&size.to_be_bytes());
    }
}

/// Verifies the checksum field of a 512-byte header under the USTAR rule:
/// the sum of all bytes with the checksum field replaced by ASCII spaces
/// must equal the stored (octal) checksum.
pub fn verify_checksum(header: &[u8; HEADER_LEN]) -> bool {
    let stored = match std::str::from_utf8(&header[148..154]) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let stored = match u32::from_str_radix(stored.trim_matches(['\0', ' ']), 8) {
        Ok(n) => n,
        Err(_) => return false,
    };
    let mut scratch = *header;
    scratch[148..156].copy_from_slice(b"        ");
    let sum: u32 = scratch.iter().map(|b| *b as u32).sum();
    sum == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_entry(path: &str, size: u64) -> Entry {
        Entry {
            arc_path: path.as_bytes().to_vec(),
            kind: EntryKind::File,
            size,
            mode: 0o644,
            mtime: 1_700_000_000,
            link_target: None,
            start_offset: 0,
            payload_blocks: Entry::compute_payload_blocks(EntryKind::File, size),
        }
    }

    #[test]
    fn header_is_always_512_bytes() {
        let opts = Options::default();
        let h = encode_header(&file_entry("a.txt", 10), &opts).unwrap();
        assert_eq!(h.len(), 512);
    }

    #[test]
    fn checksum_round_trips() {
        let opts = Options::default();
        let h = encode_header(&file_entry("a.txt", 10), &opts).unwrap();
        assert!(verify_checksum(&h));
    }

    #[test]
    fn anonymized_identity_fields() {
        let opts = Options::default();
        let h = encode_header(&file_entry("a.txt", 10), &opts).unwrap();
        assert_eq!(&h[108..116], b"000000 \0");
        assert_eq!(&h[116..124], b"000000 \0");
        assert_eq!(&h[265..269], b"root");
        assert_eq!(&h[297..301], b"root");
    }

    #[test]
    fn override_uid_gid_flattened() {
        let opts = Options {
            override_uid: Some(1000),
            override_gid: Some(1000),
            ..Options::default()
        };
        let h = encode_header(&file_entry("a.txt", 10), &opts).unwrap();
        assert_eq!(&h[108..116], b"001750 \0");
        assert_eq!(&h[116..124], b"001750 \0");
    }

    #[test]
    fn small_size_uses_octal_field() {
        let opts = Options::default();
        let h = encode_header(&file_entry("a.txt", 1), &opts).unwrap();
        assert_eq!(&h[124..136], b"00000000001\0");
    }

    #[test]
    fn large_size_uses_gnu_base256() {
        let opts = Options::default();
        let size = 8u64 * 1024 * 1024 * 1024 + 1;
        let h = encode_header(&file_entry("big.bin", size), &opts).unwrap();
        assert_eq!(h[124] & 0x80, 0x80);
        let mut be = [0u8; 8];
        be.copy_from_slice(&h[128..136]);
        assert_eq!(u64::from_be_bytes(be), size);
        assert_eq!(&h[125..128], &[0, 0, 0]);
    }

    #[test]
    fn path_fitting_in_name_has_no_prefix() {
        let (name, prefix) = split_path(b"short/path.txt").unwrap();
        assert_eq!(name, b"short/path.txt");
        assert!(prefix.is_empty());
    }

    #[test]
    fn long_path_splits_at_rightmost_boundary() {
        let long_dir = "d".repeat(150);
        let path = format!("{long_dir}/file.txt");
        let (name, prefix) = split_path(path.as_bytes()).unwrap();
        assert_eq!(name, b"file.txt");
        assert_eq!(prefix, long_dir.as_bytes());
    }

    #[test]
    fn unsplittable_path_is_illegal() {
        let segment = "x".repeat(200);
        let path = format!("{segment}/{segment}");
        assert!(split_path(path.as_bytes()).is_none());
    }

    #[test]
    fn directory_over_100_bytes_is_illegal() {
        let opts = Options::default();
        let name = "d".repeat(150);
        let entry = Entry {
            arc_path: format!("{name}/").into_bytes(),
            kind: EntryKind::Dir,
            size: 0,
            mode: 0o755,
            mtime: 0,
            link_target: None,
            start_offset: 0,
            payload_blocks: 0,
        };
        assert!(matches!(
            encode_header(&entry, &opts),
            Err(TartapeError::DirectoryNameTooLong { .. })
        ));
    }
}
