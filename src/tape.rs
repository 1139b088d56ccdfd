//! `Tape::discover`: loads a previously committed snapshot.

use crate::error::Result;
use crate::recorder::{SNAPSHOT_FILE, SNAPSHOT_SUBDIR};
use crate::store::{FlatFileSnapshotStore, SnapshotStore};
use std::path::{Path, PathBuf};

/// A loaded, read-only snapshot, ready to be played back against a source
/// tree by [`crate::player::TapePlayer`].
pub struct Tape {
    pub(crate) store: FlatFileSnapshotStore,
    root: PathBuf,
}

impl Tape {
    /// Loads the snapshot persisted under `root/.tartape/index.db`.
    pub fn discover(root: impl Into<PathBuf>) -> Result<Tape> {
        let root = root.into();
        let snapshot_path = root.join(SNAPSHOT_SUBDIR).join(SNAPSHOT_FILE);
        tracing::info!(path = %snapshot_path.display(), "loading snapshot");
        let store = FlatFileSnapshotStore::load(&snapshot_path)?;
        Ok(Tape { store, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fingerprint(&self) -> [u8; 16] {
        self.store.fingerprint()
    }

    pub fn stream_len(&self) -> u64 {
        self.store.stream_len()
    }

    pub fn entry_count(&self) -> usize {
        self.store.count()
    }
}
