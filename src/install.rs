//! Installation records.
//!
//! An [`Installation`] is built fresh on every discovery pass. The patch
//! engine updates the in-memory record after a transaction; the next
//! discovery pass re-derives everything from disk.
use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use crate::{classify, os::OsFamily};

pub use self::channel::*;
pub use self::select::*;

mod channel;
mod select;

/// Whether the alternate desktop runtime (OpenAsar) is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlternateRuntimeState {
    /// Not inspected yet.
    #[default]
    Unknown,
    /// The current archive carries the alternate runtime marker.
    Active,
    /// The current archive is the stock one.
    Inactive,
}

impl AlternateRuntimeState {
    /// Returns `Some(true/false)` when known.
    pub fn known(&self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Active => Some(true),
            Self::Inactive => Some(false),
        }
    }
}

impl From<bool> for AlternateRuntimeState {
    fn from(value: bool) -> Self {
        if value {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

/// Outcome of the most recent transaction on an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Stock archive in place.
    Unpatched,
    /// Shim archive in place.
    Patched,
    /// A transaction is running.
    Transitioning,
    /// A transaction failed and every completed step was reverted.
    FailedRolledBack,
    /// A transaction failed and at least one step could not be reverted.
    FailedUnrecoverable,
}

/// A flatpak (or similar) sandbox an installation runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfinedApp {
    /// Reverse-DNS application ID such as `com.discordapp.Discord`.
    pub app_id: String,
    /// Whether the app is installed system-wide rather than per-user.
    pub system_wide: bool,
}

/// A discovered client installation.
#[derive(Debug, Clone)]
pub struct Installation {
    family: OsFamily,
    root_path: PathBuf,
    channel: Channel,
    resource_dirs: Vec<PathBuf>,
    is_patched: bool,
    confinement: Option<ConfinedApp>,
    uses_shared_runtime: bool,
    alternate_runtime: AlternateRuntimeState,
    state: TransactionState,
}

impl Installation {
    /// Creates a record, deriving the patched state from disk.
    ///
    /// `resource_dirs` is ordered with the authoritative directory first.
    /// Returns `None` when it is empty.
    pub fn new(
        family: OsFamily,
        root_path: PathBuf,
        channel: Channel,
        resource_dirs: Vec<PathBuf>,
    ) -> Option<Self> {
        if resource_dirs.is_empty() {
            tracing::debug!(?root_path, "installation has no resource directories");
            return None;
        }

        let mut installation = Self {
            family,
            root_path,
            channel,
            resource_dirs,
            is_patched: false,
            confinement: None,
            uses_shared_runtime: false,
            alternate_runtime: AlternateRuntimeState::Unknown,
            state: TransactionState::Unpatched,
        };
        installation.refresh_patched();

        Some(installation)
    }

    /// Marks the installation as using a system-wide runtime.
    pub fn with_shared_runtime(mut self, value: bool) -> Self {
        self.uses_shared_runtime = value;
        self.refresh_patched();
        self
    }

    /// Marks the installation as sandboxed.
    pub fn with_confinement(mut self, value: ConfinedApp) -> Self {
        self.confinement = Some(value);
        self
    }

    /// OS family whose layout this record follows.
    pub fn family(&self) -> OsFamily {
        self.family
    }

    /// Base directory of the installation.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Release channel.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Directories containing `app.asar`, authoritative one first.
    pub fn resource_dirs(&self) -> &[PathBuf] {
        &self.resource_dirs
    }

    /// The authoritative resource directory.
    pub fn canonical_resource_dir(&self) -> &Path {
        // Never empty, see `new`.
        &self.resource_dirs[0]
    }

    /// Whether any resource directory shows signs of the patch.
    pub fn is_patched(&self) -> bool {
        self.is_patched
    }

    /// Whether the install runs in a sandbox needing a permission grant.
    pub fn is_confined(&self) -> bool {
        self.confinement.is_some()
    }

    /// Sandbox details if confined.
    pub fn confinement(&self) -> Option<&ConfinedApp> {
        self.confinement.as_ref()
    }

    /// Whether the install uses a system-wide runtime.
    pub fn uses_shared_runtime(&self) -> bool {
        self.uses_shared_runtime
    }

    /// Cached alternate runtime state.
    pub fn alternate_runtime(&self) -> AlternateRuntimeState {
        self.alternate_runtime
    }

    /// Outcome of the most recent transaction.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Re-derives the patched flag from disk.
    pub fn refresh_patched(&mut self) -> bool {
        self.is_patched = classify::is_patched(&self.resource_dirs, self.uses_shared_runtime);
        self.state = if self.is_patched {
            TransactionState::Patched
        } else {
            TransactionState::Unpatched
        };
        self.is_patched
    }

    /// Re-reads the alternate runtime marker and caches the result.
    pub fn refresh_alternate_runtime(&mut self) -> AlternateRuntimeState {
        self.alternate_runtime = classify::alternate_runtime_state(self.canonical_resource_dir());
        self.alternate_runtime
    }

    pub(crate) fn set_patched(&mut self, value: bool) {
        self.is_patched = value;
        self.state = if value {
            TransactionState::Patched
        } else {
            TransactionState::Unpatched
        };
    }

    pub(crate) fn set_state(&mut self, value: TransactionState) {
        self.state = value;
    }

    pub(crate) fn set_alternate_runtime(&mut self, value: AlternateRuntimeState) {
        self.alternate_runtime = value;
    }
}

impl Display for Installation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.channel, self.root_path.display())?;

        if self.is_confined() {
            f.write_str(" (flatpak)")?;
        }
        if self.is_patched {
            f.write_str(" [PATCHED]")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_resource_dirs() {
        assert!(Installation::new(
            OsFamily::Linux,
            PathBuf::from("/opt/discord"),
            Channel::Stable,
            Vec::new()
        )
        .is_none());
    }

    #[test]
    fn test_display() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.asar"), b"").unwrap();
        std::fs::write(dir.path().join("_app.asar"), b"").unwrap();

        let installation = Installation::new(
            OsFamily::MacOs,
            dir.path().to_path_buf(),
            Channel::Canary,
            vec![dir.path().to_path_buf()],
        )
        .unwrap();

        assert!(installation.is_patched());
        assert_eq!(installation.state(), TransactionState::Patched);
        assert!(installation.to_string().starts_with("canary - "));
        assert!(installation.to_string().ends_with("[PATCHED]"));
    }
}
