//! Filesystem mutations performed by transactions.
//!
//! The patch engine and the alternate runtime manager never touch the
//! filesystem directly for mutating steps. They go through [`FileOps`] so a
//! different implementation can be supplied, such as one that injects
//! faults.
use std::{fmt::Debug, io, path::Path};

/// Mutating filesystem operations.
pub trait FileOps: Debug + Send + Sync {
    /// Renames a file or directory, replacing `to` if it is a file.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Creates or truncates a file with the given contents.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Removes a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Removes a directory and its contents.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Removes a file or a directory tree.
    fn remove_any(&self, path: &Path) -> io::Result<()> {
        if path.symlink_metadata()?.is_dir() {
            self.remove_dir_all(path)
        } else {
            self.remove_file(path)
        }
    }
}

/// [`FileOps`] backed by [`std::fs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl FileOps for StdFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tracing::debug!(?from, ?to, "rename");
        std::fs::rename(from, to)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tracing::debug!(?path, len = contents.len(), "write");
        std::fs::write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        tracing::debug!(?path, "remove file");
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        tracing::debug!(?path, "remove directory");
        std::fs::remove_dir_all(path)
    }
}
