//! Environment driven configuration.
//!
//! | Variable | Effect |
//! |---|---|
//! | `VENCORD_USER_DATA_DIR` | Data directory root. |
//! | `DISCORD_USER_DATA_DIR` | Data directory root becomes `<value>/../VencordData`. |
//! | `VENCORD_DIRECTORY` | Path of the downloaded Vencord bundle. |
//! | `VENCORD_DEV_INSTALL` | When `1`, the bundle is never downloaded. |
//!
//! Without overrides, the data directory is `Vencord` in the user
//! configuration directory of the OS family.
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{
    error::{PatchError, PatchErrorKind},
    os::OsFamily,
};

/// File name of the bundle inside the data directory.
pub const BUNDLE_FILE_NAME: &str = "vencord.asar";

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Directory holding the downloaded Vencord files.
    pub data_dir: PathBuf,
    /// Path of the Vencord bundle the shim archive loads.
    pub bundle_path: PathBuf,
    /// Whether this is a development install that must not be overwritten
    /// by release downloads.
    pub dev_install: bool,
}

impl Config {
    /// Creates a config from explicit paths.
    pub fn new(data_dir: PathBuf, bundle_path: PathBuf) -> Self {
        Self {
            data_dir,
            bundle_path,
            dev_install: false,
        }
    }

    /// Sets whether this is a development install.
    pub fn with_dev_install(mut self, value: bool) -> Self {
        self.dev_install = value;
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// `home` is the home directory of the real user, which may differ from
    /// `HOME` when running elevated.
    pub fn from_env(family: OsFamily, home: &Path) -> Result<Self, PatchError> {
        Self::from_lookup(family, home, |key| std::env::var_os(key))
    }

    /// Reads the configuration using the given variable lookup function.
    pub fn from_lookup<F>(family: OsFamily, home: &Path, lookup: F) -> Result<Self, PatchError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let lookup = |key: &str| {
            let value = lookup(key).filter(|value| !value.is_empty());
            tracing::trace!(key, ?value, "config variable");
            value
        };

        let data_dir = if let Some(dir) = lookup("VENCORD_USER_DATA_DIR") {
            tracing::debug!("using VENCORD_USER_DATA_DIR");
            PathBuf::from(dir)
        } else if let Some(dir) = lookup("DISCORD_USER_DATA_DIR") {
            tracing::debug!("using DISCORD_USER_DATA_DIR/../VencordData");
            PathBuf::from(dir).join("..").join("VencordData")
        } else {
            tracing::debug!("using user config directory");
            user_config_dir(family, home, &lookup)?.join("Vencord")
        };

        let bundle_path = if let Some(path) = lookup("VENCORD_DIRECTORY") {
            tracing::debug!("using VENCORD_DIRECTORY");
            PathBuf::from(path)
        } else {
            data_dir.join(BUNDLE_FILE_NAME)
        };

        let dev_install = lookup("VENCORD_DEV_INSTALL").is_some_and(|value| value == "1");
        tracing::debug!(?data_dir, ?bundle_path, dev_install, "resolved config");

        Ok(Self {
            data_dir,
            bundle_path,
            dev_install,
        })
    }

    /// Returns the directory containing the bundle.
    ///
    /// Sandboxed installs are granted access to this directory.
    pub fn bundle_dir(&self) -> &Path {
        self.bundle_path.parent().unwrap_or(&self.data_dir)
    }
}

fn user_config_dir<F>(family: OsFamily, home: &Path, lookup: &F) -> Result<PathBuf, PatchError>
where
    F: Fn(&str) -> Option<OsString>,
{
    match family {
        OsFamily::Linux => Ok(lookup("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"))),
        OsFamily::MacOs => Ok(home.join("Library").join("Application Support")),
        OsFamily::Windows => lookup("APPDATA").map(PathBuf::from).ok_or_else(|| {
            PatchError::new(PatchErrorKind::InvalidEnvironmentVariable).with_context("APPDATA")
        }),
    }
}
