//! Error taxonomy for the tape engine.

use std::path::PathBuf;

/// The kinds of failure the recorder and player can raise.
///
/// Each variant corresponds to one entry in the error taxonomy: callers
/// wrapping this crate in a CLI are expected to map variants to distinct
/// process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum TartapeError {
    #[error("path {path:?} is {len} bytes long, exceeding the 255-byte USTAR limit")]
    PathTooLong { path: PathBuf, len: usize },

    #[error("directory name {name:?} is {len} bytes long, exceeding the 100-byte USTAR limit")]
    DirectoryNameTooLong { name: String, len: usize },

    #[error("unsupported file kind at {path:?}")]
    UnsupportedKind { path: PathBuf },

    #[error("snapshot at {path:?} failed its internal consistency check: {reason}")]
    SnapshotCorrupt { path: PathBuf, reason: String },

    #[error("integrity check failed for {path:?}: {reason}")]
    Integrity { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset {offset} exceeds stream length {stream_len}")]
    InvalidOffset { offset: u64, stream_len: u64 },
}

pub type Result<T> = std::result::Result<T, TartapeError>;
