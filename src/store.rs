//! Snapshot store: a narrow persistence interface, backed by a concrete
//! indexed flat file. A real deployment's on-disk key-value or SQL engine
//! is an external collaborator; an indexed flat file is sufficient here.
//!
//! Grounded on the fixed-size-record convention documented in
//! `AOSC-Dev-aoscbootstrap`'s `tar_dir_size.rs` header-layout comments and
//! `alexcrichton-tar-rs`'s fixed-offset `Header` struct.

use crate::error::{Result, TartapeError};
use crate::fingerprint::compute_fingerprint;
use crate::model::{Entry, EntryKind, Region};
use crate::offset::{locate as locate_offset, plan_offsets};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"TTP1";
const ARC_PATH_CAP: usize = 255;
const LINK_TARGET_CAP: usize = 100;
/// `arc_path` (255 + 1 len byte) + kind (1) + size (8) + mode (4) +
/// mtime (8) + link-present (1) + link target (100) + start_offset (8) +
/// payload_blocks (8).
const RECORD_LEN: usize = (ARC_PATH_CAP + 1) + 1 + 8 + 4 + 8 + 1 + LINK_TARGET_CAP + 8 + 8;
/// magic (4) + entry count (8) + fingerprint (16) + root_mtime_at_T0 (8) +
/// stream_len (8).
const FILE_HEADER_LEN: usize = 4 + 8 + 16 + 8 + 8;

/// The interface the recorder and player consume; §4.5 names this a narrow
/// contract so alternative backing stores (a database, a remote service)
/// can be substituted without touching `recorder.rs`/`player.rs`.
pub trait SnapshotStore {
    fn begin_transaction(&mut self) -> Result<()>;
    fn append(&mut self, entry: Entry) -> Result<()>;
    /// Plans offsets over the appended entries, computes the fingerprint,
    /// and persists atomically. Returns the fingerprint.
    fn commit(&mut self, root_mtime_at_t0: i64) -> Result<[u8; 16]>;
    fn count(&self) -> usize;
    fn get(&self, index: usize) -> Result<Entry>;
    fn locate(&self, byte_offset: u64) -> Result<(usize, Region, u64)>;
    fn iterate(&self, from_index: usize) -> Box<dyn Iterator<Item = Entry> + '_>;
    fn stream_len(&self) -> u64;
    fn fingerprint(&self) -> [u8; 16];
    fn root_mtime_at_t0(&self) -> i64;
}

/// An indexed flat-file snapshot store: one small file header followed by
/// fixed-size entry records. Loaded fully into memory on open (snapshots
/// are expected to be sized for "large-scale data movement" inventories,
/// not unbounded — a streaming reader would be a straightforward follow-up
/// if that assumption stops holding).
pub struct FlatFileSnapshotStore {
    path: PathBuf,
    entries: Vec<Entry>,
    pending: Vec<Entry>,
    fingerprint: [u8; 16],
    stream_len: u64,
    root_mtime_at_t0: i64,
}

impl FlatFileSnapshotStore {
    /// Creates a store that will persist to `path` on commit. `path` need
    /// not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FlatFileSnapshotStore {
            path: path.into(),
            entries: Vec::new(),
            pending: Vec::new(),
            fingerprint: [0u8; 16],
            stream_len: crate::model::TERMINATOR_LEN,
            root_mtime_at_t0: 0,
        }
    }

    /// Loads a previously committed snapshot from `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = File::open(&path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        if buf.len() < FILE_HEADER_LEN {
            return Err(corrupt(&path, "file shorter than header"));
        }
        if &buf[0..4] != MAGIC {
            return Err(corrupt(&path, "bad magic"));
        }
        let count = u64::from_le_bytes(buf[4..12].try_into().unwrap()) as usize;
        let mut fingerprint = [0u8; 16];
        fingerprint.copy_from_slice(&buf[12..28]);
        let root_mtime_at_t0 = i64::from_le_bytes(buf[28..36].try_into().unwrap());
        let stream_len = u64::from_le_bytes(buf[36..44].try_into().unwrap());

        let expected_len = FILE_HEADER_LEN + count * RECORD_LEN;
        if buf.len() != expected_len {
            return Err(corrupt(
                &path,
                &format!("expected {expected_len} bytes for {count} entries, found {}", buf.len()),
            ));
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let start = FILE_HEADER_LEN + i * RECORD_LEN;
            let record = &buf[start..start + RECORD_LEN];
            entries.push(decode_record(record).map_err(|e| corrupt(&path, &e))?);
        }

        for i in 1..entries.len() {
            if entries[i].arc_path <= entries[i - 1].arc_path {
                return Err(corrupt(&path, "entries not strictly increasing"));
            }
        }
        let recomputed = compute_fingerprint(&entries);
        if recomputed != fingerprint {
            return Err(corrupt(&path, "fingerprint mismatch"));
        }

        Ok(FlatFileSnapshotStore {
            path,
            entries,
            pending: Vec::new(),
            fingerprint,
            stream_len,
            root_mtime_at_t0,
        })
    }
}

impl SnapshotStore for FlatFileSnapshotStore {
    fn begin_transaction(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn append(&mut self, entry: Entry) -> Result<()> {
        self.pending.push(entry);
        Ok(())
    }

    fn commit(&mut self, root_mtime_at_t0: i64) -> Result<[u8; 16]> {
        let mut entries = std::mem::take(&mut self.pending);
        crate::order::sort_entries(&mut entries);
        let stream_len = plan_offsets(&mut entries);
        let fingerprint = compute_fingerprint(&entries);

        persist_atomically(&self.path, &entries, &fingerprint, root_mtime_at_t0, stream_len)?;

        self.entries = entries;
        self.fingerprint = fingerprint;
        self.stream_len = stream_len;
        self.root_mtime_at_t0 = root_mtime_at_t0;
        Ok(fingerprint)
    }

    fn count(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Result<Entry> {
        self.entries.get(index).cloned().ok_or_else(|| {
            TartapeError::SnapshotCorrupt {
                path: self.path.clone(),
                reason: format!("index {index} out of range ({} entries)", self.entries.len()),
            }
        })
    }

    fn locate(&self, byte_offset: u64) -> Result<(usize, Region, u64)> {
        if byte_offset > self.stream_len {
            return Err(TartapeError::InvalidOffset {
                offset: byte_offset,
                stream_len: self.stream_len,
            });
        }
        Ok(locate_offset(&self.entries, byte_offset))
    }

    fn iterate(&self, from_index: usize) -> Box<dyn Iterator<Item = Entry> + '_> {
        Box::new(self.entries[from_index.min(self.entries.len())..].iter().cloned())
    }

    fn stream_len(&self) -> u64 {
        self.stream_len
    }

    fn fingerprint(&self) -> [u8; 16] {
        self.fingerprint
    }

    fn root_mtime_at_t0(&self) -> i64 {
        self.root_mtime_at_t0
    }
}

fn corrupt(path: &Path, reason: &str) -> TartapeError {
    TartapeError::SnapshotCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn persist_atomically(
    path: &Path,
    entries: &[Entry],
    fingerprint: &[u8; 16],
    root_mtime_at_t0: i64,
    stream_len: u64,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(MAGIC)?;
        tmp.write_all(&(entries.len() as u64).to_le_bytes())?;
        tmp.write_all(fingerprint)?;
        tmp.write_all(&root_mtime_at_t0.to_le_bytes())?;
        tmp.write_all(&stream_len.to_le_bytes())?;
        for entry in entries {
            tmp.write_all(&encode_record(entry))?;
        }
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn encode_record(entry: &Entry) -> [u8; RECORD_LEN] {
    let mut rec = [0u8; RECORD_LEN];
    let mut off = 0;

    let path_len = entry.arc_path.len().min(ARC_PATH_CAP);
    rec[off] = path_len as u8;
    off += 1;
    rec[off..off + path_len].copy_from_slice(&entry.arc_path[..path_len]);
    off += ARC_PATH_CAP;

    rec[off] = entry.kind.typeflag();
    off += 1;

    rec[off..off + 8].copy_from_slice(&entry.size.to_le_bytes());
    off += 8;

    rec[off..off + 4].copy_from_slice(&entry.mode.to_le_bytes());
    off += 4;

    rec[off..off + 8].copy_from_slice(&entry.mtime.to_le_bytes());
    off += 8;

    match &entry.link_target {
        Some(target) => {
            rec[off] = 1;
            off += 1;
            let len = target.len().min(LINK_TARGET_CAP);
            rec[off..off + len].copy_from_slice(&target[..len]);
        }
        None => {
            rec[off] = 0;
            off += 1;
        }
    }
    off += LINK_TARGET_CAP;

    rec[off..off + 8].copy_from_slice(&entry.start_offset.to_le_bytes());
    off += 8;
    rec[off..off + 8].copy_from_slice(&entry.payload_blocks.to_le_bytes());

    rec
}

fn decode_record(rec: &[u8]) -> std::result::Result<Entry, String> {
    let mut off = 0;
    let path_len = rec[off] as usize;
    off += 1;
    if path_len > ARC_PATH_CAP {
        return Err("arc_path length exceeds capacity".to_string());
    }
    let arc_path = rec[off..off + path_len].to_vec();
    off += ARC_PATH_CAP;

    let kind = match rec[off] {
        b'0' => EntryKind::File,
        b'5' => EntryKind::Dir,
        b'2' => EntryKind::Symlink,
        other => return Err(format!("unknown typeflag {other}")),
    };
    off += 1;

    let size = u64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;
    let mode = u32::from_le_bytes(rec[off..off + 4].try_into().unwrap());
    off += 4;
    let mtime = i64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;

    let link_present = rec[off];
    off += 1;
    let link_target = if link_present == 1 {
        let end = rec[off..off + LINK_TARGET_CAP]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(LINK_TARGET_CAP);
        Some(rec[off..off + end].to_vec())
    } else {
        None
    };
    off += LINK_TARGET_CAP;

    let start_offset = u64::from_le_bytes(rec[off..off + 8].try_into().unwrap());
    off += 8;
    let payload_blocks = u64::from_le_bytes(rec[off..off + 8].try_into().unwrap());

    Ok(Entry {
        arc_path,
        kind,
        size,
        mode,
        mtime,
        link_target,
        start_offset,
        payload_blocks,
    })
}
