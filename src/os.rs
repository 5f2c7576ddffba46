//! OS specific functionalities.
//!
//! The OS family is detected at runtime and passed around as a value
//! ([`OsFamily`]) instead of selecting code with conditional compilation, so
//! every family's discovery and patch logic can be exercised on any host.
//! Only the functions that need real system calls (user database lookups,
//! `chown`) are compiled per target.

use std::{
    ffi::{OsStr, OsString},
    fmt::Display,
    fs::File,
    path::{Path, PathBuf},
};

use crate::error::{PatchError, PatchErrorKind};

#[cfg(unix)]
pub mod unix;
pub mod windows;

/// OS specific error wrapper.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OsError {
    /// Standard IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other error.
    #[error("{0}")]
    Other(&'static str),
}

impl From<OsError> for PatchError {
    fn from(value: OsError) -> Self {
        match value {
            OsError::Io(error) => error.into(),
            other => PatchError::new(PatchErrorKind::Io).with_source(other),
        }
    }
}

/// Host operating system family.
///
/// Each family has its own Discord installation layout convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Unix-like layout with a single bundled runtime per install, plus
    /// flatpak and system-electron variants.
    Linux,
    /// Versioned `app-*` subdirectories maintained by a self-updater, with
    /// mandatory file locking.
    Windows,
    /// Single `.app` bundle per install.
    MacOs,
}

impl OsFamily {
    /// Returns the family of the running host.
    pub fn current() -> Result<Self, PatchError> {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Maps a [`std::env::consts::OS`] style name to a family.
    pub fn from_os_name(name: &str) -> Result<Self, PatchError> {
        match name {
            "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            _ => Err(PatchError::new(PatchErrorKind::UnsupportedOsFamily).with_context(name)),
        }
    }
}

impl Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::MacOs => "macos",
        })
    }
}

/// Information returned by [`file_checksum`].
#[derive(Debug, Clone, PartialEq)]
pub struct FileChecksum {
    /// CRC32C checksum of the file.
    pub crc32c: u32,
    /// Size of the file.
    pub len: u64,
}

/// Computes a checksum for a file.
pub fn file_checksum<P: AsRef<Path>>(path: P) -> std::io::Result<FileChecksum> {
    let path = path.as_ref();
    tracing::trace!(?path, "file checksum");
    let len = path.metadata()?.len();

    let mut file = File::open(path)?;
    let mut compute = crc32c::Crc32cWriter::new(std::io::empty());

    std::io::copy(&mut file, &mut compute)?;

    Ok(FileChecksum {
        crc32c: compute.crc32c(),
        len,
    })
}

/// Returns the directory portion of the current executable's path.
///
/// See also [`std::env::current_exe()`].
pub fn current_exe_dir() -> std::io::Result<PathBuf> {
    tracing::trace!("current_exe_dir");
    let mut path = std::env::current_exe()?;
    path.pop();

    Ok(path)
}

/// Returns a non-empty environment variable.
pub fn env_var<A: AsRef<OsStr>>(key: A) -> Result<OsString, PatchError> {
    tracing::trace!(key = ?key.as_ref(), "env_var");
    std::env::var_os(key.as_ref())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            PatchError::new(PatchErrorKind::InvalidEnvironmentVariable)
                .with_context(key.as_ref().to_string_lossy())
        })
}

const ERROR_SHARING_VIOLATION: i32 = 32;

/// Returns whether the error is a Windows sharing violation.
///
/// Only meaningful for errors produced on [`OsFamily::Windows`]; other
/// platforms reuse the same raw code for unrelated errors.
pub fn is_sharing_violation(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(ERROR_SHARING_VIOLATION)
}

/// Returns the name of the user that invoked the process through sudo/doas.
///
/// `sudo_user` and `doas_user` are the values of `SUDO_USER` and `DOAS_USER`.
/// `None` is returned when not running as superuser. Running as superuser
/// without either variable, or with the superuser itself as the invoking
/// user, is an unsafe invocation: discovery would scan root's home and leave
/// root owned files in the user's data directory.
pub fn invoking_user_name(
    euid: u32,
    sudo_user: Option<String>,
    doas_user: Option<String>,
) -> Result<Option<String>, PatchError> {
    if euid != 0 {
        return Ok(None);
    }

    let name = sudo_user
        .filter(|name| !name.is_empty())
        .or_else(|| doas_user.filter(|name| !name.is_empty()));

    match name {
        Some(name) if name == "root" => Err(PatchError::new(PatchErrorKind::UnsafeInvocation)
            .with_context("must not be run from the root account itself")),
        Some(name) => Ok(Some(name)),
        None => Err(PatchErrorKind::UnsafeInvocation.into()),
    }
}

/// The user account that invoked an elevated process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealUser {
    /// Login name.
    pub name: String,
    /// User ID.
    pub uid: u32,
    /// Primary group ID.
    pub gid: u32,
    /// Home directory from the user database.
    pub home: PathBuf,
}
