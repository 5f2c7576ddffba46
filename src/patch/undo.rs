use std::{
    io,
    path::{Path, PathBuf},
};

use crate::{fs::FileOps, install::TransactionState};

/// A recorded forward step and how to revert it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoStep {
    /// `from` was renamed to `to`; reverting renames it back.
    Rename {
        /// Original location.
        from: PathBuf,
        /// Current location.
        to: PathBuf,
    },
    /// A file was created; reverting removes it if present.
    Remove(PathBuf),
}

impl UndoStep {
    fn revert(&self, fs: &dyn FileOps) -> io::Result<()> {
        match self {
            Self::Rename { from, to } => fs.rename(to, from),
            Self::Remove(path) => match fs.remove_file(path) {
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        }
    }
}

/// Ordered list of completed steps in a transaction.
#[derive(Debug, Default)]
pub struct UndoLog {
    steps: Vec<UndoStep>,
}

impl UndoLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed rename.
    pub fn push_rename(&mut self, from: &Path, to: &Path) {
        self.steps.push(UndoStep::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
    }

    /// Records a file that is about to be created.
    pub fn push_remove(&mut self, path: &Path) {
        self.steps.push(UndoStep::Remove(path.to_path_buf()));
    }

    /// Recorded steps in forward order.
    pub fn steps(&self) -> &[UndoStep] {
        &self.steps
    }

    /// Returns whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Reverts every recorded step, newest first.
    ///
    /// Failures do not stop the walk; they are logged and collected in the
    /// report.
    pub fn rollback(self, fs: &dyn FileOps) -> RollbackReport {
        let mut failures = Vec::new();

        if !self.steps.is_empty() {
            tracing::warn!(steps = self.steps.len(), "undoing partial transaction");
        }

        for step in self.steps.into_iter().rev() {
            match step.revert(fs) {
                Ok(()) => tracing::debug!(?step, "reverted"),
                Err(error) => {
                    tracing::error!(?step, %error, "failed to revert step, installation is probably broken");
                    failures.push((step, error));
                }
            }
        }

        if failures.is_empty() {
            tracing::info!("reverted all changes");
        }

        RollbackReport { failures }
    }
}

/// Result of [`UndoLog::rollback`].
#[derive(Debug)]
pub struct RollbackReport {
    failures: Vec<(UndoStep, io::Error)>,
}

impl RollbackReport {
    /// Returns whether every step was reverted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Steps that could not be reverted.
    pub fn failures(&self) -> &[(UndoStep, io::Error)] {
        &self.failures
    }

    /// The installation state after the rollback.
    pub fn state(&self) -> TransactionState {
        if self.is_complete() {
            TransactionState::FailedRolledBack
        } else {
            TransactionState::FailedUnrecoverable
        }
    }
}
