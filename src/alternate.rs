//! OpenAsar, the alternate desktop runtime.
//!
//! OpenAsar replaces the stock `app.asar` (or `_app.asar` behind the shim) and
//! is toggled independently from the Vencord patch. The stock archive is kept
//! as `app.asar.original` while it is active.
use std::{path::Path, sync::Arc};

use crate::{
    classify::{self, ALTERNATE_BACKUP_ASAR},
    error::{PatchError, PatchErrorKind},
    fs::{FileOps, StdFs},
    install::{AlternateRuntimeState, Installation},
    patch::UndoLog,
    platform::Platform,
    release::Downloader,
};

/// Download location of the nightly OpenAsar build.
pub const OPENASAR_DOWNLOAD_URL: &str =
    "https://github.com/GooseMod/OpenAsar/releases/download/nightly/app.asar";

/// Installs and removes OpenAsar.
#[derive(Debug, Clone)]
pub struct AlternateRuntime {
    platform: Arc<dyn Platform>,
    downloader: Arc<dyn Downloader>,
    fs: Arc<dyn FileOps>,
    url: String,
}

impl AlternateRuntime {
    /// Creates a manager downloading from [`OPENASAR_DOWNLOAD_URL`].
    pub fn new(platform: Arc<dyn Platform>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            platform,
            downloader,
            fs: Arc::new(StdFs),
            url: OPENASAR_DOWNLOAD_URL.to_string(),
        }
    }

    /// Replaces the filesystem implementation.
    pub fn with_file_ops(mut self, fs: Arc<dyn FileOps>) -> Self {
        self.fs = fs;
        self
    }

    /// Replaces the download URL.
    pub fn with_url<U: Into<String>>(mut self, url: U) -> Self {
        self.url = url.into();
        self
    }

    /// Returns whether OpenAsar is in use.
    ///
    /// The archive is read once per record; later calls use the cached
    /// state.
    pub fn is_active(&self, installation: &mut Installation) -> bool {
        let state = match installation.alternate_runtime() {
            AlternateRuntimeState::Unknown => installation.refresh_alternate_runtime(),
            state => state,
        };

        state == AlternateRuntimeState::Active
    }

    /// Installs OpenAsar.
    pub fn activate(&self, installation: &mut Installation) -> Result<(), PatchError> {
        tracing::info!(path = ?installation.root_path(), "installing OpenAsar");

        if self.is_active(installation) {
            return Err(PatchError::new(PatchErrorKind::AlreadyApplied)
                .with_context("OpenAsar is already installed"));
        }

        self.platform.prepare(installation);

        let dir = installation.canonical_resource_dir().to_path_buf();
        let archive = classify::find_real_archive(&dir).ok_or_else(|| {
            PatchError::new(PatchErrorKind::NotFound)
                .with_context(format!("{} has no asar file", dir.display()))
        })?;
        let backup = dir.join(ALTERNATE_BACKUP_ASAR);

        let mut log = UndoLog::new();

        if let Err(error) = self.replace_archive(&archive, &backup, &mut log) {
            tracing::error!(%error, "failed to install OpenAsar, restoring original");

            let report = log.rollback(&*self.fs);

            if !report.is_complete() {
                tracing::error!(
                    path = ?archive,
                    "failed to restore original archive, reinstall Discord"
                );
            }

            return Err(error.with_context("failed to install OpenAsar"));
        }

        installation.set_alternate_runtime(AlternateRuntimeState::Active);
        tracing::info!(path = ?installation.root_path(), "installed OpenAsar");

        Ok(())
    }

    fn replace_archive(
        &self,
        archive: &Path,
        backup: &Path,
        log: &mut UndoLog,
    ) -> Result<(), PatchError> {
        tracing::debug!(from = ?archive, to = ?backup, "renaming");
        self.fs
            .rename(archive, backup)
            .map_err(|error| self.platform.map_io_error(error))?;
        log.push_rename(archive, backup);

        let mut buf = Vec::new();
        self.downloader.get(&self.url, &mut buf)?;

        if !classify::has_alternate_runtime_marker(&buf) {
            return Err(PatchError::new(PatchErrorKind::InvalidData)
                .with_context("downloaded file is not OpenAsar"));
        }

        log.push_remove(archive);
        self.fs
            .write(archive, &buf)
            .map_err(|error| self.platform.map_io_error(error))
    }

    /// Restores the stock archive.
    pub fn deactivate(&self, installation: &mut Installation) -> Result<(), PatchError> {
        tracing::info!(path = ?installation.root_path(), "uninstalling OpenAsar");

        self.platform.prepare(installation);

        let dir = installation.canonical_resource_dir().to_path_buf();
        let backup = dir.join(ALTERNATE_BACKUP_ASAR);

        if !backup.is_file() {
            return Err(PatchError::new(PatchErrorKind::MissingBackup)
                .with_context(format!("no {ALTERNATE_BACKUP_ASAR} in {}", dir.display())));
        }

        let archive = classify::find_real_archive(&dir).ok_or_else(|| {
            PatchError::new(PatchErrorKind::NotApplied)
                .with_context(format!("{} has no asar file", dir.display()))
        })?;

        tracing::debug!(from = ?backup, to = ?archive, "renaming");
        self.fs
            .rename(&backup, &archive)
            .map_err(|error| self.platform.map_io_error(error))?;

        installation.set_alternate_runtime(AlternateRuntimeState::Inactive);
        tracing::info!(path = ?installation.root_path(), "uninstalled OpenAsar");

        Ok(())
    }
}
