//! Patched-state and alternate runtime predicates.
//!
//! Every locator and the patch engine derive the patched flag through
//! [`is_patched`] so they cannot disagree.
//!
//! Two generations of the patch leave different evidence in a resource
//! directory:
//!
//! * archive swap: `app.asar` is the shim and `_app.asar` is the original,
//! * loose files: a directory (`app` or `app.asar`) holding only
//!   `index.js` and `package.json`.
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use crate::{
    asar::{INDEX_JS, PACKAGE_JSON},
    error::{PatchError, PatchErrorKind},
    install::AlternateRuntimeState,
};

/// Name of the archive the client loads.
pub const APP_ASAR: &str = "app.asar";
/// Name the original archive is moved to while patched.
pub const BACKUP_ASAR: &str = "_app.asar";
/// Name the shim is moved to during unpatch.
pub const TEMP_ASAR: &str = "app.asar.tmp";
/// Native modules directory next to the archive on shared runtime installs.
pub const APP_ASAR_UNPACKED: &str = "app.asar.unpacked";
/// Name the native modules directory is moved to while patched.
pub const BACKUP_ASAR_UNPACKED: &str = "_app.asar.unpacked";
/// Loose-files patch directory written by old installers.
pub const LEGACY_APP_DIR: &str = "app";
/// Name the stock archive is moved to while the alternate runtime is active.
pub const ALTERNATE_BACKUP_ASAR: &str = "app.asar.original";
/// Substring identifying the alternate runtime archive.
pub const ALTERNATE_RUNTIME_MARKER: &[u8] = b"OpenAsar";

/// Files a loose-files patch directory may contain.
pub const LOOSE_FILE_NAMES: [&str; 2] = [INDEX_JS, PACKAGE_JSON];

/// Returns whether any of the resource directories shows evidence of the
/// patch.
pub fn is_patched(resource_dirs: &[PathBuf], uses_shared_runtime: bool) -> bool {
    resource_dirs
        .iter()
        .any(|dir| is_dir_patched(dir, uses_shared_runtime))
}

fn is_dir_patched(dir: &Path, uses_shared_runtime: bool) -> bool {
    let backup = dir.join(BACKUP_ASAR).exists();
    let loose_app_dir = dir.join(LEGACY_APP_DIR).is_dir();
    let loose_asar_dir = dir.join(APP_ASAR).is_dir();
    let unpacked_moved = uses_shared_runtime && dir.join(BACKUP_ASAR_UNPACKED).exists();

    let patched = backup || loose_app_dir || loose_asar_dir || unpacked_moved;

    tracing::debug!(
        ?dir,
        backup,
        loose_app_dir,
        loose_asar_dir,
        unpacked_moved,
        patched,
        "checked patched state"
    );

    patched
}

/// Returns the path of the real (non-shim) archive in a resource directory.
///
/// The renamed-aside original is preferred over `app.asar`. Directories are
/// never returned.
pub fn find_real_archive(dir: &Path) -> Option<PathBuf> {
    [BACKUP_ASAR, APP_ASAR]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Returns whether the bytes contain the alternate runtime marker.
pub fn has_alternate_runtime_marker(bytes: &[u8]) -> bool {
    bytes
        .windows(ALTERNATE_RUNTIME_MARKER.len())
        .any(|window| window == ALTERNATE_RUNTIME_MARKER)
}

/// Inspects the archive in a resource directory for the alternate runtime.
///
/// The shim archive is skipped in favour of the original behind it. Unreadable
/// or missing archives count as inactive.
pub fn alternate_runtime_state(dir: &Path) -> AlternateRuntimeState {
    let Some(path) = find_real_archive(dir) else {
        tracing::debug!(?dir, "no archive found");
        return AlternateRuntimeState::Inactive;
    };

    let mut buf = Vec::new();

    let result = File::open(&path).and_then(|mut file| file.read_to_end(&mut buf));

    let state = match result {
        Ok(_) => has_alternate_runtime_marker(&buf).into(),
        Err(error) => {
            tracing::warn!(?path, %error, "failed to read archive");
            AlternateRuntimeState::Inactive
        }
    };

    tracing::debug!(?path, ?state, "checked alternate runtime");

    state
}

/// Returns whether a loose-files directory contains only files the patcher
/// writes.
pub fn is_safe_to_delete(dir: &Path) -> std::io::Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let known = name
            .to_str()
            .is_some_and(|name| LOOSE_FILE_NAMES.contains(&name));

        if !known || entry.file_type()?.is_dir() {
            tracing::warn!(?dir, ?name, "unexpected file in patch directory");
            return Ok(false);
        }
    }

    Ok(true)
}

/// Fails with [`PatchErrorKind::UnsafeDeletion`] unless [`is_safe_to_delete`]
/// holds.
pub fn check_safe_to_delete(dir: &Path) -> Result<(), PatchError> {
    if is_safe_to_delete(dir)? {
        Ok(())
    } else {
        Err(PatchError::new(PatchErrorKind::UnsafeDeletion).with_context(format!(
            "{} contains files other than {}",
            dir.display(),
            LOOSE_FILE_NAMES.join(" and ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_is_patched_markers() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().to_path_buf()];
        fs::write(dir.path().join(APP_ASAR), b"stock").unwrap();

        assert!(!is_patched(&dirs, false));

        fs::write(dir.path().join(BACKUP_ASAR), b"stock").unwrap();
        assert!(is_patched(&dirs, false));

        fs::remove_file(dir.path().join(BACKUP_ASAR)).unwrap();
        fs::create_dir(dir.path().join(LEGACY_APP_DIR)).unwrap();
        assert!(is_patched(&dirs, false));
    }

    #[test]
    fn test_is_patched_any_dir() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        fs::write(old.path().join(BACKUP_ASAR), b"").unwrap();

        assert!(is_patched(
            &[new.path().to_path_buf(), old.path().to_path_buf()],
            false
        ));
    }

    #[test]
    fn test_shared_runtime_unpacked_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(BACKUP_ASAR_UNPACKED)).unwrap();
        let dirs = vec![dir.path().to_path_buf()];

        assert!(!is_patched(&dirs, false));
        assert!(is_patched(&dirs, true));
    }

    #[test]
    fn test_find_archives() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_real_archive(dir.path()).is_none());

        fs::create_dir(dir.path().join(APP_ASAR)).unwrap();
        assert!(find_real_archive(dir.path()).is_none());

        fs::write(dir.path().join(BACKUP_ASAR), b"").unwrap();
        assert_eq!(
            find_real_archive(dir.path()).unwrap(),
            dir.path().join(BACKUP_ASAR)
        );
    }

    #[test]
    fn test_alternate_runtime_state() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(APP_ASAR), b"....OpenAsar....").unwrap();
        assert_eq!(
            alternate_runtime_state(dir.path()),
            AlternateRuntimeState::Active
        );

        fs::write(dir.path().join(APP_ASAR), b"stock").unwrap();
        assert_eq!(
            alternate_runtime_state(dir.path()),
            AlternateRuntimeState::Inactive
        );
    }

    #[test]
    fn test_safe_to_delete() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_JS), b"").unwrap();
        fs::write(dir.path().join(PACKAGE_JSON), b"").unwrap();
        assert!(is_safe_to_delete(dir.path()).unwrap());

        fs::write(dir.path().join("evil.dll"), b"").unwrap();
        assert!(!is_safe_to_delete(dir.path()).unwrap());
        assert!(matches!(
            check_safe_to_delete(dir.path()).unwrap_err().kind(),
            PatchErrorKind::UnsafeDeletion
        ));
    }
}
