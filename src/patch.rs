//! Patch transaction engine.
//!
//! Patching moves `app.asar` aside to `_app.asar` and writes a shim archive
//! in its place. Unpatching moves the shim to `app.asar.tmp`, moves the
//! original back and deletes the temporary file once everything succeeded.
//!
//! Every rename and write is recorded in an [`UndoLog`]. When a step fails,
//! the log is walked backwards so the installation ends up as it was before
//! the transaction started.
//!
//! Transactions are not synchronized. Callers must not run two transactions
//! against the same installation at once.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    asar::ShimArchive,
    classify::{
        self, APP_ASAR, APP_ASAR_UNPACKED, BACKUP_ASAR, BACKUP_ASAR_UNPACKED, LEGACY_APP_DIR,
        TEMP_ASAR,
    },
    error::{PatchError, PatchErrorKind},
    fs::{FileOps, StdFs},
    install::{Installation, TransactionState},
    platform::Platform,
};

pub use self::undo::*;

mod undo;

/// Applies and removes the patch on installations.
#[derive(Debug, Clone)]
pub struct Patcher {
    platform: Arc<dyn Platform>,
    fs: Arc<dyn FileOps>,
    bundle_path: PathBuf,
}

impl Patcher {
    /// Creates a patcher whose shim loads the bundle at `bundle_path`.
    pub fn new(platform: Arc<dyn Platform>, bundle_path: PathBuf) -> Self {
        Self {
            platform,
            fs: Arc::new(StdFs),
            bundle_path,
        }
    }

    /// Replaces the filesystem implementation.
    pub fn with_file_ops(mut self, fs: Arc<dyn FileOps>) -> Self {
        self.fs = fs;
        self
    }

    /// Path of the bundle the shim loads.
    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    /// Replaces the stock archive with the shim.
    ///
    /// An already patched installation is unpatched first. On failure every
    /// completed step is reverted.
    pub fn patch(&self, installation: &mut Installation) -> Result<(), PatchError> {
        tracing::info!(path = ?installation.root_path(), "patching");

        let shim = ShimArchive::for_bundle(&self.bundle_path)?.to_bytes()?;

        self.platform.check_install(installation)?;
        self.platform.prepare(installation);

        if installation.refresh_patched() {
            tracing::info!(path = ?installation.root_path(), "already patched, unpatching first");

            if let Err(error) = self.unpatch_impl(installation) {
                if error.is_permission_denied() {
                    return Err(error);
                }
                return Err(error.with_context(format!(
                    "failed to unpatch already patched install {}",
                    installation.root_path().display()
                )));
            }
        }

        let uses_shared_runtime = installation.uses_shared_runtime();
        let mut log = UndoLog::new();

        installation.set_state(TransactionState::Transitioning);

        for dir in installation.resource_dirs().to_vec() {
            if let Err(error) = self.patch_dir(&dir, uses_shared_runtime, &shim, &mut log) {
                self.abort(installation, log);
                return Err(error.with_context(format!("failed to patch {}", dir.display())));
            }
        }

        installation.set_patched(true);
        tracing::info!(path = ?installation.root_path(), "patched");

        let bundle_dir = self.bundle_path.parent().unwrap_or(&self.bundle_path);
        self.platform.after_patch(installation, bundle_dir)
    }

    /// Restores the stock archive.
    pub fn unpatch(&self, installation: &mut Installation) -> Result<(), PatchError> {
        tracing::info!(path = ?installation.root_path(), "unpatching");

        self.platform.check_install(installation)?;
        self.platform.prepare(installation);

        self.unpatch_impl(installation)
    }

    fn unpatch_impl(&self, installation: &mut Installation) -> Result<(), PatchError> {
        let dirs = installation.resource_dirs().to_vec();
        let uses_shared_runtime = installation.uses_shared_runtime();

        // Checked up front so nothing is touched when a directory holds
        // foreign files.
        for dir in &dirs {
            for name in [LEGACY_APP_DIR, APP_ASAR, TEMP_ASAR] {
                let path = dir.join(name);
                if path.is_dir() {
                    classify::check_safe_to_delete(&path)?;
                }
            }
        }

        let mut log = UndoLog::new();
        let mut cleanup = Vec::new();

        installation.set_state(TransactionState::Transitioning);

        for dir in &dirs {
            if let Err(error) = self.unpatch_dir(dir, uses_shared_runtime, &mut log, &mut cleanup)
            {
                self.abort(installation, log);
                return Err(error.with_context(format!("failed to unpatch {}", dir.display())));
            }
        }

        for path in cleanup {
            tracing::debug!(?path, "deleting");

            if let Err(error) = self.fs.remove_any(&path) {
                tracing::warn!(
                    ?path,
                    %error,
                    "failed to delete leftover patch files, delete them manually"
                );
            }
        }

        installation.set_patched(false);
        tracing::info!(path = ?installation.root_path(), "unpatched");

        Ok(())
    }

    fn patch_dir(
        &self,
        dir: &Path,
        uses_shared_runtime: bool,
        shim: &[u8],
        log: &mut UndoLog,
    ) -> Result<(), PatchError> {
        let app_asar = dir.join(APP_ASAR);

        self.rename(&app_asar, &dir.join(BACKUP_ASAR), log)?;

        if uses_shared_runtime {
            let unpacked = dir.join(APP_ASAR_UNPACKED);

            if unpacked.exists() {
                self.rename(&unpacked, &dir.join(BACKUP_ASAR_UNPACKED), log)?;
            }
        }

        tracing::debug!(path = ?app_asar, "writing shim archive");
        log.push_remove(&app_asar);
        self.fs
            .write(&app_asar, shim)
            .map_err(|error| self.platform.map_io_error(error))
    }

    fn unpatch_dir(
        &self,
        dir: &Path,
        uses_shared_runtime: bool,
        log: &mut UndoLog,
        cleanup: &mut Vec<PathBuf>,
    ) -> Result<(), PatchError> {
        let app_asar = dir.join(APP_ASAR);
        let backup = dir.join(BACKUP_ASAR);
        let temp = dir.join(TEMP_ASAR);

        if backup.exists() {
            if temp.symlink_metadata().is_ok() {
                tracing::debug!(path = ?temp, "removing stale temporary archive");
                self.fs
                    .remove_any(&temp)
                    .map_err(|error| self.platform.map_io_error(error))?;
            }

            if app_asar.symlink_metadata().is_ok() {
                self.rename(&app_asar, &temp, log)?;
                cleanup.push(temp);
            }

            self.rename(&backup, &app_asar, log)?;
        } else if app_asar.is_dir() {
            return Err(PatchError::new(PatchErrorKind::MissingBackup)
                .with_context(format!("{} is a directory", app_asar.display())));
        }

        if uses_shared_runtime {
            let unpacked = dir.join(BACKUP_ASAR_UNPACKED);

            if unpacked.exists() {
                self.rename(&unpacked, &dir.join(APP_ASAR_UNPACKED), log)?;
            }
        }

        let legacy = dir.join(LEGACY_APP_DIR);

        if legacy.is_dir() {
            cleanup.push(legacy);
        }

        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path, log: &mut UndoLog) -> Result<(), PatchError> {
        tracing::debug!(?from, ?to, "renaming");

        self.fs.rename(from, to).map_err(|error| {
            self.platform
                .map_io_error(error)
                .with_context(format!("failed to rename {} to {}", from.display(), to.display()))
        })?;
        log.push_rename(from, to);

        Ok(())
    }

    fn abort(&self, installation: &mut Installation, log: UndoLog) {
        let report = log.rollback(&*self.fs);

        installation.refresh_patched();
        installation.set_state(report.state());

        tracing::error!(
            path = ?installation.root_path(),
            state = ?installation.state(),
            "transaction failed"
        );
    }
}
