use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use crate::{
    classify::{APP_ASAR, BACKUP_ASAR},
    error::{PatchError, PatchErrorKind},
    install::{Channel, Installation},
    os::OsFamily,
};

use super::{HostEnv, Platform};

const VERSION_DIR_PREFIX: &str = "app-";

/// Windows hosts.
///
/// Each variant lives in `%LocalAppData%\<Variant>` with one `app-<version>`
/// directory per version the updater has installed.
#[derive(Debug, Clone)]
pub struct WindowsPlatform {
    local_app_data: Option<PathBuf>,
    program_data: Option<PathBuf>,
    username: Option<OsString>,
    stop_processes: bool,
}

impl WindowsPlatform {
    /// Creates a platform from the host environment.
    pub fn new(env: &HostEnv) -> Self {
        Self {
            local_app_data: env.local_app_data.clone(),
            program_data: env.program_data.clone(),
            username: env.username.clone(),
            stop_processes: true,
        }
    }

    /// Sets the directory scanned for installations.
    pub fn with_local_app_data(mut self, path: PathBuf) -> Self {
        self.local_app_data = Some(path);
        self
    }

    /// Sets whether the running client is stopped before operations.
    pub fn with_process_control(mut self, value: bool) -> Self {
        self.stop_processes = value;
        self
    }
}

impl Platform for WindowsPlatform {
    fn family(&self) -> OsFamily {
        OsFamily::Windows
    }

    fn discover(&self) -> Vec<Installation> {
        let Some(local_app_data) = &self.local_app_data else {
            tracing::warn!("LOCALAPPDATA is not set");
            return Vec::new();
        };

        Channel::ALL
            .iter()
            .filter_map(|channel| {
                let path = local_app_data.join(channel.windows_dir_name());
                let installation = self.classify(&path, Some(*channel))?;
                tracing::info!(?path, "found installation");
                Some(installation)
            })
            .collect()
    }

    fn classify(&self, path: &Path, channel: Option<Channel>) -> Option<Installation> {
        let mut resource_dirs = super::read_subdirs(path)
            .into_iter()
            .filter(|(name, _)| name.starts_with(VERSION_DIR_PREFIX))
            .map(|(_, version_dir)| version_dir.join("resources"))
            .filter(|resources| {
                resources.is_dir()
                    && (resources.join(APP_ASAR).exists() || resources.join(BACKUP_ASAR).exists())
            })
            .collect::<Vec<_>>();

        // Greatest first; older versions are still patched so the updater
        // cannot fall back to them.
        resource_dirs.sort_unstable_by(|a, b| b.cmp(a));
        tracing::debug!(?path, ?resource_dirs, "version directories");

        let channel = channel.unwrap_or_else(|| {
            Channel::infer(&path.file_name().unwrap_or_default().to_string_lossy())
        });

        Installation::new(OsFamily::Windows, path.to_path_buf(), channel, resource_dirs)
    }

    fn prepare(&self, installation: &Installation) {
        if !self.stop_processes {
            return;
        }

        if let Some(name) = installation.root_path().file_name() {
            crate::os::windows::stop_process(&name.to_string_lossy());
        }
    }

    fn check_install(&self, installation: &Installation) -> Result<(), PatchError> {
        let (Some(program_data), Some(username), Some(dir_name)) = (
            &self.program_data,
            &self.username,
            installation.root_path().file_name(),
        ) else {
            return Ok(());
        };

        if crate::os::windows::has_moved_install(program_data, username, &dir_name.to_string_lossy())
        {
            return Err(PatchError::new(PatchErrorKind::MovedInstall).with_context(format!(
                "found a copy in {}",
                program_data.join(username).join(dir_name).display()
            )));
        }

        Ok(())
    }

    fn map_io_error(&self, error: io::Error) -> PatchError {
        if crate::os::is_sharing_violation(&error) {
            PatchError::new(PatchErrorKind::ResourceBusy).with_source(error)
        } else {
            super::transaction_error(error)
        }
    }
}
