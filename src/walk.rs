//! Path walker & filter.
//!
//! Grounded directly on `DirWalkIterator`: a stack of remaining
//! directories, `lstat`-based classification (symlinks are never
//! dereferenced here), and ignoring the engine's own sidecar directory.
//! Does not sort at each directory level — it hands back an unordered
//! candidate list and leaves sorting to [`crate::order`], splitting walking
//! from ordering into separate components.

use crate::error::{Result, TartapeError};
use crate::header::split_path;
use crate::model::{Entry, EntryKind};
use crate::options::Options;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

const TARTAPE_DIR: &str = ".tartape";
const MAX_PATH_LEN: usize = 255;
const MAX_LINK_LEN: usize = 100;

/// Depth-first walk of `root`. Every discovered directory is emitted as its
/// own entry (never folded into a prefix); `root` itself is not emitted.
/// Returns entries in arbitrary order.
pub fn walk(root: &Path, opts: &Options) -> Result<Vec<Entry>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for child in fs::read_dir(&dir)? {
            let child = child?;
            let abspath = child.path();

            if dir.as_path() == root && abspath.file_name().map(|n| n == TARTAPE_DIR).unwrap_or(false) {
                continue;
            }

            let relpath = abspath
                .strip_prefix(root)
                .expect("walked path is always under root");
            let base_arc_path = posix_bytes(relpath);
            let meta = fs::symlink_metadata(&abspath)?;
            let file_type = meta.file_type();

            if file_type.is_symlink() {
                check_total_len(&abspath, &base_arc_path)?;
                let target = fs::read_link(&abspath)?;
                let target_bytes = posix_bytes(&target);
                if target_bytes.len() > MAX_LINK_LEN {
                    return Err(TartapeError::PathTooLong {
                        path: abspath.clone(),
                        len: target_bytes.len(),
                    });
                }
                if split_path(&base_arc_path).is_none() {
                    return Err(TartapeError::PathTooLong {
                        path: abspath,
                        len: base_arc_path.len(),
                    });
                }
                tracing::debug!(path = %abspath.display(), "walked symlink");
                out.push(Entry {
                    arc_path: base_arc_path,
                    kind: EntryKind::Symlink,
                    size: 0,
                    mode: meta.mode() & 0o7777,
                    mtime: meta.mtime(),
                    link_target: Some(target_bytes),
                    start_offset: 0,
                    payload_blocks: 0,
                });
            } else if file_type.is_dir() {
                let mut dir_arc_path = base_arc_path;
                dir_arc_path.push(b'/');
                check_total_len(&abspath, &dir_arc_path)?;
                if dir_arc_path.len() > MAX_LINK_LEN {
                    return Err(TartapeError::DirectoryNameTooLong {
                        name: String::from_utf8_lossy(&dir_arc_path).into_owned(),
                        len: dir_arc_path.len(),
                    });
                }
                tracing::debug!(path = %abspath.display(), "walked directory");
                out.push(Entry {
                    arc_path: dir_arc_path,
                    kind: EntryKind::Dir,
                    size: 0,
                    mode: meta.mode() & 0o7777,
                    mtime: meta.mtime(),
                    link_target: None,
                    start_offset: 0,
                    payload_blocks: 0,
                });
                stack.push(abspath);
            } else if file_type.is_file() {
                check_total_len(&abspath, &base_arc_path)?;
                if split_path(&base_arc_path).is_none() {
                    return Err(TartapeError::PathTooLong {
                        path: abspath,
                        len: base_arc_path.len(),
                    });
                }
                let size = meta.size();
                tracing::debug!(path = %abspath.display(), size, "walked file");
                out.push(Entry {
                    arc_path: base_arc_path,
                    kind: EntryKind::File,
                    size,
                    mode: meta.mode() & 0o7777,
                    mtime: meta.mtime(),
                    link_target: None,
                    start_offset: 0,
                    payload_blocks: 0,
                });
            } else if opts.strict_unsupported {
                return Err(TartapeError::UnsupportedKind { path: abspath });
            } else {
                tracing::warn!(path = %abspath.display(), "skipping unsupported file kind");
            }
        }
    }

    Ok(out)
}

fn check_total_len(path: &Path, arc_path: &[u8]) -> Result<()> {
    if arc_path.len() > MAX_PATH_LEN {
        return Err(TartapeError::PathTooLong {
            path: path.to_path_buf(),
            len: arc_path.len(),
        });
    }
    Ok(())
}

/// Converts a relative filesystem path into its POSIX-separated archive
/// path bytes. On Unix, path components are raw OS bytes already; this
/// just stitches them together with `/`.
pub(crate) fn posix_bytes(relpath: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    let mut out = Vec::new();
    for (i, component) in relpath.components().enumerate() {
        if i > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(component.as_os_str().as_bytes());
    }
    out
}
