//! Stream player: replays a snapshot as a lazy pull-based `Event` sequence,
//! verifying integrity and supporting resumption from any byte offset.
//!
//! The per-entry streaming loop (chunked read, running digest) is a
//! generalization of a plain chunked read-and-hash loop into a pull-based
//! iterator with per-entry integrity pre-checks and optional mid-entry
//! resumption.

use crate::error::{Result, TartapeError};
use crate::header::encode_header;
use crate::model::{Entry, EntryKind, Region, TERMINATOR_LEN};
use crate::options::Options;
use crate::store::SnapshotStore;
use crate::tape::Tape;
use crate::walk::posix_bytes;
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// One item of the playback sequence.
#[derive(Debug, Clone)]
pub enum Event {
    FileStart {
        entry: Entry,
        start_offset: u64,
        resumed: bool,
    },
    FileData {
        bytes: Vec<u8>,
    },
    FileEnd {
        entry: Entry,
        end_offset: u64,
        /// `None` once the entry has been resumed mid-body: a digest over
        /// a truncated read would be meaningless, so it is simply omitted
        /// rather than computed over a partial read.
        md5: Option<[u8; 16]>,
    },
    TapeCompleted,
}

/// Drives playback of a [`Tape`] against a live source tree.
pub struct TapePlayer<'a> {
    tape: &'a Tape,
    source_root: PathBuf,
    options: Options,
}

impl<'a> TapePlayer<'a> {
    pub fn new(tape: &'a Tape, source_root: impl Into<PathBuf>) -> Self {
        TapePlayer {
            tape,
            source_root: source_root.into(),
            options: Options::default(),
        }
    }

    pub fn with_options(tape: &'a Tape, source_root: impl Into<PathBuf>, options: Options) -> Self {
        TapePlayer {
            tape,
            source_root: source_root.into(),
            options,
        }
    }

    /// Begins playback at `start_offset`. Single-threaded, cooperative,
    /// pull-based: each call to `next()` on the returned iterator may
    /// perform blocking I/O. `play(0)` and `play(k)[.]` must
    /// agree with `play(0)[k..]` byte for byte.
    pub fn play(&self, start_offset: u64) -> Result<PlaySession<'a>> {
        let stream_len = self.tape.stream_len();
        if start_offset > stream_len {
            return Err(TartapeError::InvalidOffset {
                offset: start_offset,
                stream_len,
            });
        }

        tracing::info!(start_offset, stream_len, "starting playback");

        if start_offset == stream_len {
            return Ok(PlaySession {
                tape: self.tape,
                source_root: self.source_root.clone(),
                options: self.options.clone(),
                first_index: 0,
                first_region: Region::Terminator,
                first_local: 0,
                first_consumed: true,
                next_index: self.tape.entry_count(),
                current: None,
                terminator_remaining: Some(0),
                done: false,
            });
        }

        let (i0, region, local) = self.tape.store.locate(start_offset)?;
        let count = self.tape.entry_count();

        if i0 >= count {
            // Resumption lands inside the terminator itself; no entries
            // remain to replay.
            Ok(PlaySession {
                tape: self.tape,
                source_root: self.source_root.clone(),
                options: self.options.clone(),
                first_index: i0,
                first_region: region,
                first_local: local,
                first_consumed: true,
                next_index: i0,
                current: None,
                terminator_remaining: Some(TERMINATOR_LEN - local),
                done: false,
            })
        } else {
            Ok(PlaySession {
                tape: self.tape,
                source_root: self.source_root.clone(),
                options: self.options.clone(),
                first_index: i0,
                first_region: region,
                first_local: local,
                first_consumed: false,
                next_index: i0 + 1,
                current: None,
                terminator_remaining: None,
                done: false,
            })
        }
    }
}

/// The iterator returned by [`TapePlayer::play`]. Non-restartable,
/// single-pass, pull-driven.
pub struct PlaySession<'a> {
    tape: &'a Tape,
    source_root: PathBuf,
    options: Options,
    first_index: usize,
    first_region: Region,
    first_local: u64,
    first_consumed: bool,
    next_index: usize,
    current: Option<EntrySession>,
    terminator_remaining: Option<u64>,
    done: bool,
}

impl<'a> Iterator for PlaySession<'a> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Result<Event>> {
        loop {
            if self.done {
                return None;
            }

            if let Some(cur) = self.current.as_mut() {
                match cur.next_event(&self.source_root, &self.options) {
                    Ok(Some(ev)) => return Some(Ok(ev)),
                    Ok(None) => {
                        self.current = None;
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "fatal error during playback");
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }

            if !self.first_consumed {
                self.first_consumed = true;
                let entry = match self.tape.store.get(self.first_index) {
                    Ok(e) => e,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                };
                let resumed = self.first_region != Region::Header || self.first_local != 0;
                self.current = Some(EntrySession::new(entry, self.first_region, self.first_local, resumed));
                continue;
            }

            if self.next_index < self.tape.entry_count() {
                let idx = self.next_index;
                self.next_index += 1;
                let entry = match self.tape.store.get(idx) {
                    Ok(e) => e,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                };
                self.current = Some(EntrySession::new(entry, Region::Header, 0, false));
                continue;
            }

            let remaining = self.terminator_remaining.get_or_insert(TERMINATOR_LEN);
            if *remaining > 0 {
                let n = *remaining;
                *remaining = 0;
                return Some(Ok(Event::FileData {
                    bytes: vec![0u8; n as usize],
                }));
            }

            self.done = true;
            tracing::info!("playback completed");
            return Some(Ok(Event::TapeCompleted));
        }
    }
}

#[derive(Clone, Copy)]
enum Phase {
    NotStarted,
    Header { pos: usize },
    NeedOpenBody,
    Body { remaining: u64 },
    Padding { remaining: u64 },
    NeedEnd,
    Finished,
}

/// Per-entry playback state: header slicing, body streaming with a running
/// digest, and zero-fill padding. One of these is live at a time so memory
/// use does not scale with archive size.
struct EntrySession {
    entry: Entry,
    region: Region,
    local: u64,
    resumed: bool,
    phase: Phase,
    file: Option<File>,
    seek_amount: u64,
    remaining_body: u64,
    digest: Option<Md5>,
    digest_disabled: bool,
}

impl EntrySession {
    fn new(entry: Entry, region: Region, local: u64, resumed: bool) -> Self {
        EntrySession {
            entry,
            region,
            local,
            resumed,
            phase: Phase::NotStarted,
            file: None,
            seek_amount: 0,
            remaining_body: 0,
            digest: None,
            digest_disabled: false,
        }
    }

    fn source_path(&self, source_root: &Path) -> PathBuf {
        let mut p = self.entry.arc_path.clone();
        if p.last() == Some(&b'/') {
            p.pop();
        }
        source_root.join(std::ffi::OsStr::from_bytes(&p))
    }

    fn check_integrity(&self, source_root: &Path) -> Result<()> {
        let abspath = self.source_path(source_root);
        let meta = fs::symlink_metadata(&abspath)?;
        match self.entry.kind {
            EntryKind::File => {
                if meta.len() != self.entry.size || meta.mtime() != self.entry.mtime {
                    return Err(TartapeError::Integrity {
                        path: abspath,
                        reason: format!(
                            "expected size={} mtime={}, found size={} mtime={}",
                            self.entry.size,
                            self.entry.mtime,
                            meta.len(),
                            meta.mtime()
                        ),
                    });
                }
            }
            EntryKind::Dir => {
                if meta.mtime() != self.entry.mtime {
                    return Err(TartapeError::Integrity {
                        path: abspath,
                        reason: format!(
                            "directory mtime changed: expected {}, found {}",
                            self.entry.mtime,
                            meta.mtime()
                        ),
                    });
                }
            }
            EntryKind::Symlink => {
                let target = fs::read_link(&abspath)?;
                let target_bytes = posix_bytes(&target);
                if self.entry.link_target.as_deref() != Some(target_bytes.as_slice()) {
                    return Err(TartapeError::Integrity {
                        path: abspath,
                        reason: "symlink target changed".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Produces the next event for this entry, or `Ok(None)` once the
    /// entry (header, body, padding, FILE_END) is fully played.
    fn next_event(&mut self, source_root: &Path, options: &Options) -> Result<Option<Event>> {
        loop {
            match self.phase {
                Phase::NotStarted => {
                    self.check_integrity(source_root)?;
                    match self.region {
                        Region::Header => {
                            self.seek_amount = 0;
                            self.remaining_body = self.entry.size;
                            self.digest_disabled = false;
                            self.phase = Phase::Header { pos: self.local as usize };
                        }
                        Region::Body => {
                            self.seek_amount = self.local;
                            self.remaining_body = self.entry.size - self.local;
                            self.digest_disabled = true;
                            self.phase = Phase::NeedOpenBody;
                        }
                        Region::Padding => {
                            self.seek_amount = 0;
                            self.remaining_body = 0;
                            self.digest_disabled = true;
                            let remaining_padding = padding_len(&self.entry) - self.local;
                            self.phase = Phase::Padding { remaining: remaining_padding };
                        }
                        Region::Terminator => unreachable!("entries never map to the terminator region"),
                    }
                    if !self.digest_disabled {
                        self.digest = Some(Md5::new());
                    }
                    return Ok(Some(Event::FileStart {
                        entry: self.entry.clone(),
                        start_offset: self.entry.start_offset,
                        resumed: self.resumed,
                    }));
                }
                Phase::Header { pos } => {
                    let header = encode_header(&self.entry, options)?;
                    let bytes = header[pos..].to_vec();
                    self.phase = if self.entry.kind == EntryKind::File {
                        Phase::NeedOpenBody
                    } else {
                        Phase::NeedEnd
                    };
                    return Ok(Some(Event::FileData { bytes }));
                }
                Phase::NeedOpenBody => {
                    if self.remaining_body == 0 {
                        self.phase = Phase::Padding { remaining: padding_len(&self.entry) };
                        continue;
                    }
                    let mut file = File::open(self.source_path(source_root))?;
                    if self.seek_amount > 0 {
                        file.seek(SeekFrom::Start(self.seek_amount))?;
                    }
                    self.file = Some(file);
                    self.phase = Phase::Body { remaining: self.remaining_body };
                    continue;
                }
                Phase::Body { remaining } => {
                    if remaining == 0 {
                        self.file = None;
                        self.phase = Phase::Padding { remaining: padding_len(&self.entry) };
                        continue;
                    }
                    let take = remaining.min(options.chunk_size as u64) as usize;
                    let mut buf = vec![0u8; take];
                    let file = self.file.as_mut().expect("open body file");
                    if let Err(e) = file.read_exact(&mut buf) {
                        if e.kind() == std::io::ErrorKind::UnexpectedEof {
                            return Err(TartapeError::Integrity {
                                path: self.source_path(source_root),
                                reason: format!("file shrank mid-read, {remaining} bytes still expected"),
                            });
                        }
                        return Err(e.into());
                    }
                    if let Some(d) = self.digest.as_mut() {
                        d.update(&buf);
                    }
                    self.phase = Phase::Body { remaining: remaining - take as u64 };
                    return Ok(Some(Event::FileData { bytes: buf }));
                }
                Phase::Padding { remaining } => {
                    if remaining == 0 {
                        self.phase = Phase::NeedEnd;
                        continue;
                    }
                    self.phase = Phase::NeedEnd;
                    return Ok(Some(Event::FileData { bytes: vec![0u8; remaining as usize] }));
                }
                Phase::NeedEnd => {
                    let md5 = if self.entry.kind != EntryKind::File || self.digest_disabled {
                        None
                    } else {
                        self.digest.take().map(|d| d.finalize().into())
                    };
                    self.phase = Phase::Finished;
                    let end_offset = self.entry.start_offset + self.entry.span();
                    return Ok(Some(Event::FileEnd {
                        entry: self.entry.clone(),
                        end_offset,
                        md5,
                    }));
                }
                Phase::Finished => return Ok(None),
            }
        }
    }
}

fn padding_len(entry: &Entry) -> u64 {
    (512 - entry.size % 512) % 512
}
