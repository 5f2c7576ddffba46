//! User database and file ownership helpers.

// Notes on elevated invocation:
// sudo exports SUDO_USER and doas exports DOAS_USER with the invoking login
// name. HOME is root's in both cases, so the real home comes from the user
// database instead.

use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::PatchError;

use super::{OsError, RealUser};

/// Returns the effective user ID of the process.
pub fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

/// Returns whether the process runs with superuser identity.
pub fn is_superuser() -> bool {
    effective_uid() == 0
}

/// Looks up a login name in the user database.
pub fn lookup_user(name: &str) -> Result<RealUser, OsError> {
    tracing::debug!(name, "looking up user");

    let c_name = CString::new(name).map_err(|_| OsError::Other("invalid user name"))?;
    let mut buf = vec![0 as libc::c_char; 16 * 1024];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let passwd = unsafe {
        // SAFETY: all pointers refer to live buffers of the stated size and
        // `passwd` is plain old data.
        let mut passwd: libc::passwd = std::mem::zeroed();
        let code = libc::getpwnam_r(
            c_name.as_ptr(),
            &mut passwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        );

        if code != 0 {
            return Err(std::io::Error::from_raw_os_error(code).into());
        }
        if result.is_null() {
            return Err(OsError::Other("user not found"));
        }

        passwd
    };

    let home = unsafe {
        // SAFETY: getpwnam_r succeeded so pw_dir points into `buf`.
        CStr::from_ptr(passwd.pw_dir)
    };
    let home = PathBuf::from(OsStr::from_bytes(home.to_bytes()));

    tracing::debug!(name, uid = passwd.pw_uid, gid = passwd.pw_gid, ?home, "found user");

    Ok(RealUser {
        name: name.to_string(),
        uid: passwd.pw_uid as u32,
        gid: passwd.pw_gid as u32,
        home,
    })
}

/// Resolves the real invoking user when running elevated.
///
/// Returns `None` for a normal invocation.
pub fn resolve_real_user() -> Result<Option<RealUser>, PatchError> {
    let name = super::invoking_user_name(
        effective_uid(),
        std::env::var("SUDO_USER").ok(),
        std::env::var("DOAS_USER").ok(),
    )?;

    match name {
        Some(name) => {
            tracing::debug!(name, "run with root privileges, resolving actual user");
            Ok(Some(lookup_user(&name)?))
        }
        None => Ok(None),
    }
}

/// Recursively changes ownership of `path` and everything below it.
pub fn chown_tree(path: &Path, uid: u32, gid: u32) -> Result<(), OsError> {
    tracing::debug!(?path, uid, gid, "fixing ownership");

    for entry in walkdir::WalkDir::new(path) {
        let entry = entry.map_err(|error| match error.into_io_error() {
            Some(error) => OsError::Io(error),
            None => OsError::Other("filesystem loop while walking directory"),
        })?;

        let result = std::os::unix::fs::lchown(entry.path(), Some(uid), Some(gid));
        tracing::trace!(path = ?entry.path(), ok = result.is_ok(), "chown");
        result?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_missing_user() {
        assert!(lookup_user("no-such-user-for-vencord-patcher-tests").is_err());
    }

    #[test]
    fn test_chown_tree_to_self() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/file"), b"x").unwrap();

        let uid = effective_uid();
        // SAFETY: getegid has no preconditions.
        let gid = unsafe { libc::getegid() };

        chown_tree(dir.path(), uid, gid as u32).unwrap();
    }
}
