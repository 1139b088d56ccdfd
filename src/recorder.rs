//! `TapeRecorder`: walks a root and commits the T0 snapshot.
//!
//! Restructures a walk-then-write-each-item loop into an explicit
//! walk → order → plan offsets → persist pipeline.

use crate::error::Result;
use crate::options::Options;
use crate::store::{FlatFileSnapshotStore, SnapshotStore};
use crate::walk;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Default location of the snapshot sidecar, relative to the tape root.
pub const SNAPSHOT_SUBDIR: &str = ".tartape";
pub const SNAPSHOT_FILE: &str = "index.db";

/// Records a T0 inventory of `root` into `root/.tartape/index.db`.
pub struct TapeRecorder {
    root: PathBuf,
    options: Options,
}

impl TapeRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TapeRecorder {
            root: root.into(),
            options: Options::default(),
        }
    }

    pub fn with_options(root: impl Into<PathBuf>, options: Options) -> Self {
        TapeRecorder {
            root: root.into(),
            options,
        }
    }

    /// Walks the root, orders and offset-plans the entries, and persists
    /// the snapshot atomically. Returns the snapshot fingerprint.
    pub fn commit(&self) -> Result<[u8; 16]> {
        tracing::info!(root = %self.root.display(), "recording snapshot");

        let root_meta = fs::symlink_metadata(&self.root)?;
        let root_mtime_at_t0 = root_meta.mtime();

        let entries = walk::walk(&self.root, &self.options)?;
        tracing::debug!(count = entries.len(), "walk produced candidate entries");

        let snapshot_path = self.snapshot_path();
        let mut store = FlatFileSnapshotStore::new(&snapshot_path);
        store.begin_transaction()?;
        for entry in entries {
            store.append(entry)?;
        }
        let fingerprint = store.commit(root_mtime_at_t0)?;

        tracing::info!(
            fingerprint = %hex::encode(fingerprint),
            entries = store.count(),
            stream_len = store.stream_len(),
            "committed snapshot"
        );
        Ok(fingerprint)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_SUBDIR).join(SNAPSHOT_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
