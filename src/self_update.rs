//! Updating the patcher's own executable.
use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    time::Duration,
};

use crate::{
    error::{AddPatchContext, PatchError, PatchErrorKind},
    os::OsFamily,
    release::{Downloader, GithubRelease, ReleaseFeed},
};

/// Base URL of the installer's release downloads.
pub const INSTALLER_DOWNLOAD_BASE_URL: &str =
    "https://github.com/Vencord/Installer/releases/latest/download/";

/// Release tag of this build.
pub const CURRENT_TAG: &str = match option_env!("VENCORD_PATCHER_TAG") {
    Some(value) => value,
    None => concat!("v", env!("CARGO_PKG_VERSION")),
};

const OLD_EXE_RETRIES: u32 = 10;

/// Returns the download link of the latest command-line build for a family.
pub fn download_link(family: OsFamily) -> String {
    let file_name = match family {
        OsFamily::Windows => "VencordInstallerCli.exe",
        OsFamily::MacOs => "VencordInstaller.MacOS.zip",
        OsFamily::Linux => "VencordInstallerCli-linux",
    };

    format!("{INSTALLER_DOWNLOAD_BASE_URL}{file_name}")
}

/// Checks for and applies updates to the running executable.
#[derive(Debug, Clone)]
pub struct SelfUpdater {
    family: OsFamily,
    downloader: Arc<dyn Downloader>,
    current_tag: String,
}

impl SelfUpdater {
    /// Creates an updater for the command-line build.
    pub fn new(family: OsFamily, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            family,
            downloader,
            current_tag: CURRENT_TAG.to_string(),
        }
    }

    /// Overrides the tag of the running build.
    pub fn with_current_tag<T: Into<String>>(mut self, tag: T) -> Self {
        self.current_tag = tag.into();
        self
    }

    /// Link to the latest build for this host.
    pub fn download_link(&self) -> String {
        download_link(self.family)
    }

    /// Returns whether the release is newer than the running build.
    pub fn is_outdated(&self, release: &GithubRelease) -> bool {
        release.tag_name != self.current_tag
    }

    /// Returns whether the executable can replace itself.
    ///
    /// macOS builds ship as app bundles and must be updated by hand.
    pub fn can_update(&self, release: &GithubRelease) -> bool {
        self.is_outdated(release) && self.family != OsFamily::MacOs
    }

    /// Starts checking the installer feed in the background.
    pub fn spawn_check(&self, feed: ReleaseFeed) -> PendingSelfUpdate {
        let (sender, receiver) = mpsc::sync_channel(1);
        let downloader = self.downloader.clone();

        std::thread::spawn(move || {
            tracing::debug!("checking for installer updates");
            let _ = sender.send(feed.fetch(&*downloader));
        });

        PendingSelfUpdate { receiver }
    }

    /// Downloads the latest build and replaces the running executable.
    pub fn update(&self, release: &GithubRelease) -> Result<(), PatchError> {
        if !self.can_update(release) {
            return Err(PatchError::new(PatchErrorKind::NotApplied).with_context(
                "cannot update self, either no update is available or the host is macOS",
            ));
        }

        let url = self.download_link();
        let exe_dir = crate::os::current_exe_dir()?;

        tracing::info!(%url, ?exe_dir, "updating self");

        let mut temp = tempfile::Builder::new()
            .prefix("VencordInstallerUpdate")
            .tempfile_in(&exe_dir)
            .map_err(PatchError::from)
            .patch_context("failed to create temporary file")?;

        self.downloader.get(&url, temp.as_file_mut())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o755))
                .map_err(PatchError::from)
                .patch_context("failed to chmod 755")?;
        }

        self_replace::self_replace(temp.path())
            .map_err(PatchError::from)
            .patch_context(
                "failed to replace self with updated executable, download the installer manually",
            )?;

        tracing::info!("updated self");

        Ok(())
    }
}

/// Result of [`SelfUpdater::spawn_check`].
#[derive(Debug)]
pub struct PendingSelfUpdate {
    receiver: mpsc::Receiver<Result<GithubRelease, PatchError>>,
}

impl PendingSelfUpdate {
    /// Blocks until the check is done.
    pub fn wait(self) -> Result<GithubRelease, PatchError> {
        self.receiver.recv().map_err(|_| {
            PatchError::new(PatchErrorKind::Other).with_context("self update check thread ended")
        })?
    }
}

/// Returns the path older installers moved their executable to.
pub fn old_executable_path(exe: &Path) -> PathBuf {
    let mut path = exe.as_os_str().to_owned();
    path.push(".old");
    PathBuf::from(path)
}

/// Removes the `<exe>.old` file left by older installers.
///
/// The file may still be locked by the exiting process, so removal is
/// retried a few times.
pub fn delete_old_executable(exe: &Path, delay: Duration) {
    let path = old_executable_path(exe);

    for attempt in 1..=OLD_EXE_RETRIES {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(?path, "removed old executable");
                return;
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return,
            Err(error) => {
                tracing::warn!(?path, attempt, %error, "failed to remove old executable, retrying");
                std::thread::sleep(delay);
            }
        }
    }
}
