//! Iterative tree walker
//!
//! Explicit pending-work stack instead of native recursion, so arbitrarily
//! deep trees cannot overflow the call stack. Entries that vanish or are
//! unreadable mid-walk are skipped silently (debug-logged). Symlinks are
//! not followed; only regular files are yielded.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Lazy, finite, non-restartable iterator over the regular files under one
/// or more roots. Directory entries are visited in lexicographic order, so
/// the yield order is deterministic for a given tree.
pub struct FileWalker {
    stack: Vec<PathBuf>,
}

impl FileWalker {
    pub fn new<I>(roots: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut stack: Vec<PathBuf> = roots.into_iter().collect();
        stack.reverse();
        Self { stack }
    }

    pub fn single(root: &Path) -> Self {
        Self::new([root.to_path_buf()])
    }
}

impl Iterator for FileWalker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        while let Some(current) = self.stack.pop() {
            let meta = match fs::symlink_metadata(&current) {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(path = %current.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            if meta.is_dir() {
                let entries = match fs::read_dir(&current) {
                    Ok(entries) => entries,
                    Err(e) => {
                        debug!(path = %current.display(), error = %e, "skipping unreadable directory");
                        continue;
                    }
                };
                let mut children: Vec<PathBuf> =
                    entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
                children.sort();
                // Reversed so the stack pops them in lexicographic order.
                for child in children.into_iter().rev() {
                    self.stack.push(child);
                }
            } else if meta.is_file() {
                return Some(current);
            }
            // Symlinks and special files are skipped.
        }
        None
    }
}
