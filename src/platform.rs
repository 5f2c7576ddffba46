//! Per OS family installation layout.
//!
//! A [`Platform`] knows where a family keeps client installations, how to
//! turn a candidate path into an [`Installation`], and which extra steps
//! surround a transaction on that family. Implementations are selected at
//! runtime with [`for_family`] and all of them compile on every host.
use std::{
    ffi::OsString,
    fmt::Debug,
    io,
    path::{Path, PathBuf},
};

use crate::{
    error::{PatchError, PatchErrorKind},
    install::{Channel, Installation},
    os::{OsFamily, RealUser},
};

pub use self::linux::*;
pub use self::macos::*;
pub use self::windows::*;

mod linux;
mod macos;
mod windows;

/// Locator, classifier and transaction hooks for one OS family.
pub trait Platform: Debug + Send + Sync {
    /// The family this implementation handles.
    fn family(&self) -> OsFamily;

    /// Enumerates installations in the well-known locations.
    ///
    /// Missing or unreadable locations are skipped.
    fn discover(&self) -> Vec<Installation>;

    /// Builds an installation record for a candidate root path.
    ///
    /// Returns `None` if the path is not a valid installation root.
    fn classify(&self, path: &Path, channel: Option<Channel>) -> Option<Installation>;

    /// Runs before any primary or alternate runtime operation.
    fn prepare(&self, installation: &Installation) {
        let _ = installation;
    }

    /// Refuses installations that must not be modified.
    fn check_install(&self, installation: &Installation) -> Result<(), PatchError> {
        let _ = installation;
        Ok(())
    }

    /// Runs after a successful patch.
    ///
    /// `bundle_dir` is the directory holding the Vencord bundle.
    fn after_patch(&self, installation: &Installation, bundle_dir: &Path) -> Result<(), PatchError> {
        let _ = (installation, bundle_dir);
        Ok(())
    }

    /// Gives files created while elevated back to the real user.
    fn fix_ownership(&self, path: &Path) -> Result<(), PatchError> {
        let _ = path;
        Ok(())
    }

    /// Converts an error from a transaction step.
    fn map_io_error(&self, error: io::Error) -> PatchError {
        transaction_error(error)
    }
}

/// Maps an error from a rename/write step.
///
/// Permission errors keep their kind so front-ends can suggest a remedy.
pub fn transaction_error(error: io::Error) -> PatchError {
    match error.kind() {
        io::ErrorKind::PermissionDenied => error.into(),
        _ => PatchError::new(PatchErrorKind::TransactionFailure).with_source(error),
    }
}

/// Host details the platforms depend on.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct HostEnv {
    /// Home directory of the real user.
    pub home: PathBuf,
    /// The invoking user when running elevated through sudo/doas.
    pub real_user: Option<RealUser>,
    /// Whether the process has superuser identity.
    pub superuser: bool,
    /// `%LocalAppData%`.
    pub local_app_data: Option<PathBuf>,
    /// `%ProgramData%`.
    pub program_data: Option<PathBuf>,
    /// `%USERNAME%`.
    pub username: Option<OsString>,
}

impl HostEnv {
    /// Creates an environment with only a home directory.
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            home,
            ..Default::default()
        }
    }

    /// Reads the host details from the process.
    ///
    /// On Linux, fails with [`PatchErrorKind::UnsafeInvocation`] when running
    /// as superuser without an identifiable invoking user. Other families
    /// use the process's own home directory.
    pub fn from_env(family: OsFamily) -> Result<Self, PatchError> {
        #[cfg(unix)]
        let (real_user, superuser) = (
            if resolves_invoking_user(family) {
                crate::os::unix::resolve_real_user()?
            } else {
                None
            },
            crate::os::unix::is_superuser(),
        );
        #[cfg(not(unix))]
        let (real_user, superuser) = {
            let _ = family;
            (None, false)
        };

        let home = match &real_user {
            Some(user) => user.home.clone(),
            None => PathBuf::from(
                crate::os::env_var("HOME").or_else(|_| crate::os::env_var("USERPROFILE"))?,
            ),
        };

        let env = Self {
            home,
            real_user,
            superuser,
            local_app_data: std::env::var_os("LOCALAPPDATA").map(PathBuf::from),
            program_data: std::env::var_os("PROGRAMDATA").map(PathBuf::from),
            username: std::env::var_os("USERNAME"),
        };

        tracing::debug!(?env, "host environment");

        Ok(env)
    }
}

/// Returns whether elevated runs are mapped back to the invoking user.
pub fn resolves_invoking_user(family: OsFamily) -> bool {
    family == OsFamily::Linux
}

/// Returns the platform implementation for a family.
pub fn for_family(family: OsFamily, env: &HostEnv) -> Box<dyn Platform> {
    match family {
        OsFamily::Linux => Box::new(LinuxPlatform::new(env)),
        OsFamily::Windows => Box::new(WindowsPlatform::new(env)),
        OsFamily::MacOs => Box::new(MacPlatform::new(env)),
    }
}

/// Lists the subdirectories of `dir`.
///
/// A missing directory yields nothing. Other errors are logged.
pub(crate) fn read_subdirs(dir: &Path) -> Vec<(String, PathBuf)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != io::ErrorKind::NotFound {
                tracing::warn!(?dir, %error, "failed to read directory");
            }
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(?dir, %error, "failed to read directory entry");
                None
            }
        })
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            entry
                .file_name()
                .into_string()
                .ok()
                .map(|name| (name, entry.path()))
        })
        .collect()
}
