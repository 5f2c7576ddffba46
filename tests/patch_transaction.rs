//! Patch and unpatch installations laid out in temporary directories.
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use vencord_patcher::{
    error::PatchErrorKind,
    fs::{FileOps, StdFs},
    install::{Installation, TransactionState},
    os::{FileChecksum, OsFamily},
    patch::Patcher,
    platform::{HostEnv, LinuxPlatform, Platform, WindowsPlatform},
};

const STOCK_ARCHIVE: &[u8] = b"stock archive contents \x00\x01\x02";

/// Fails every write, or renames of one path.
#[derive(Debug, Default)]
struct FaultyFs {
    fail_writes: bool,
    fail_rename_from: Option<PathBuf>,
    /// Raw OS error code returned by the failing rename.
    rename_os_error: Option<i32>,
}

impl FileOps for FaultyFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.fail_rename_from.as_deref() == Some(from) {
            match self.rename_os_error {
                Some(code) => Err(io::Error::from_raw_os_error(code)),
                None => Err(io::Error::other("injected rename failure")),
            }
        } else {
            StdFs.rename(from, to)
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            Err(io::Error::other("injected write failure"))
        } else {
            StdFs.write(path, contents)
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        StdFs.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        StdFs.remove_dir_all(path)
    }
}

fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Option<FileChecksum>> {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry.path().strip_prefix(dir).unwrap().to_path_buf();
            let checksum = if entry.file_type().is_file() {
                Some(vencord_patcher::os::file_checksum(entry.path()).unwrap())
            } else {
                None
            };
            (relative, checksum)
        })
        .collect()
}

fn linux_platform(home: &Path) -> Arc<dyn Platform> {
    Arc::new(LinuxPlatform::new(&HostEnv::with_home(home.to_path_buf())).with_search_roots(vec![]))
}

fn make_linux_install(root: &Path) -> PathBuf {
    let install = root.join("discord");
    std::fs::create_dir_all(install.join("resources")).unwrap();
    std::fs::write(install.join("resources/app.asar"), STOCK_ARCHIVE).unwrap();
    install
}

fn classify(platform: &Arc<dyn Platform>, path: &Path) -> Installation {
    platform.classify(path, None).unwrap()
}

#[test_log::test]
fn test_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let resources = install.join("resources");
    let bundle = dir.path().join("data/vencord.asar");
    let before = snapshot(&install);

    let platform = linux_platform(dir.path());
    let patcher = Patcher::new(platform.clone(), bundle.clone());
    let mut installation = classify(&platform, &install);

    assert!(!installation.is_patched());

    patcher.patch(&mut installation).unwrap();

    assert!(installation.is_patched());
    assert_eq!(installation.state(), TransactionState::Patched);
    assert_eq!(std::fs::read(resources.join("_app.asar")).unwrap(), STOCK_ARCHIVE);
    assert!(classify(&platform, &install).is_patched());

    patcher.unpatch(&mut installation).unwrap();

    assert!(!installation.is_patched());
    assert_eq!(installation.state(), TransactionState::Unpatched);
    assert_eq!(snapshot(&install), before);
    assert!(!resources.join("_app.asar").exists());
    assert!(!resources.join("app.asar.tmp").exists());
}

#[test_log::test]
fn test_shim_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let bundle = dir.path().join("data \"quoted\"/vencord.asar");

    let platform = linux_platform(dir.path());
    let patcher = Patcher::new(platform.clone(), bundle.clone());
    let mut installation = classify(&platform, &install);

    patcher.patch(&mut installation).unwrap();

    let shim = std::fs::read(install.join("resources/app.asar")).unwrap();
    let expected = format!(
        "require({})",
        serde_json::to_string(&bundle.to_string_lossy()).unwrap()
    );

    assert!(shim
        .windows(expected.len())
        .any(|window| window == expected.as_bytes()));
    assert_eq!(
        shim,
        vencord_patcher::asar::ShimArchive::for_bundle(&bundle)
            .unwrap()
            .to_bytes()
            .unwrap()
    );
}

#[test_log::test]
fn test_patch_twice() {
    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let bundle = dir.path().join("data/vencord.asar");

    let platform = linux_platform(dir.path());
    let patcher = Patcher::new(platform.clone(), bundle);
    let mut installation = classify(&platform, &install);

    patcher.patch(&mut installation).unwrap();
    let once = snapshot(&install);

    patcher.patch(&mut installation).unwrap();
    let twice = snapshot(&install);

    assert_eq!(once, twice);
    assert!(installation.is_patched());
    assert_eq!(
        std::fs::read(install.join("resources/_app.asar")).unwrap(),
        STOCK_ARCHIVE
    );
}

#[test_log::test]
fn test_failed_write_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let before = snapshot(&install);

    let platform = linux_platform(dir.path());
    let fs = FaultyFs {
        fail_writes: true,
        ..Default::default()
    };
    let patcher = Patcher::new(platform.clone(), dir.path().join("vencord.asar"))
        .with_file_ops(Arc::new(fs));
    let mut installation = classify(&platform, &install);

    let error = patcher.patch(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::TransactionFailure));
    assert_eq!(snapshot(&install), before);
    assert!(!installation.is_patched());
    assert_eq!(installation.state(), TransactionState::FailedRolledBack);
    assert!(!classify(&platform, &install).is_patched());
}

#[test_log::test]
fn test_failed_unpatch_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let resources = install.join("resources");
    let bundle = dir.path().join("vencord.asar");

    let platform = linux_platform(dir.path());
    let mut installation = classify(&platform, &install);

    Patcher::new(platform.clone(), bundle.clone())
        .patch(&mut installation)
        .unwrap();

    let patched = snapshot(&install);
    let fs = FaultyFs {
        fail_rename_from: Some(resources.join("_app.asar")),
        ..Default::default()
    };
    let patcher = Patcher::new(platform.clone(), bundle).with_file_ops(Arc::new(fs));

    let error = patcher.unpatch(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::TransactionFailure));
    assert_eq!(snapshot(&install), patched);
    assert!(!resources.join("app.asar.tmp").exists());
    assert!(installation.is_patched());
    assert_eq!(installation.state(), TransactionState::FailedRolledBack);
    assert!(classify(&platform, &install).is_patched());
}

#[test_log::test]
fn test_windows_busy_archive_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let local_app_data = dir.path().join("Local");
    let resources = local_app_data.join("Discord/app-1.0.9/resources");

    std::fs::create_dir_all(&resources).unwrap();
    std::fs::write(resources.join("app.asar"), STOCK_ARCHIVE).unwrap();

    let before = snapshot(&local_app_data);
    let platform: Arc<dyn Platform> = Arc::new(
        WindowsPlatform::new(&HostEnv::default())
            .with_local_app_data(local_app_data.clone())
            .with_process_control(false),
    );
    // ERROR_SHARING_VIOLATION
    let fs = FaultyFs {
        fail_rename_from: Some(resources.join("app.asar")),
        rename_os_error: Some(32),
        ..Default::default()
    };
    let patcher =
        Patcher::new(platform.clone(), dir.path().join("vencord.asar")).with_file_ops(Arc::new(fs));
    let mut installation = platform.discover().into_iter().next().unwrap();

    let error = patcher.patch(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::ResourceBusy));
    assert!(error.to_string().contains("close Discord"));
    assert_eq!(snapshot(&local_app_data), before);
    assert!(!installation.is_patched());
    assert_eq!(installation.state(), TransactionState::FailedRolledBack);
}

#[cfg(unix)]
#[test_log::test]
fn test_non_utf8_bundle_path_refused() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let bundle = dir
        .path()
        .join(OsStr::from_bytes(b"d\xffta"))
        .join("vencord.asar");
    let before = snapshot(&install);

    let platform = linux_platform(dir.path());
    let patcher = Patcher::new(platform.clone(), bundle.clone());
    let mut installation = classify(&platform, &install);

    let error = patcher.patch(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::InvalidData));
    assert!(vencord_patcher::asar::ShimArchive::for_bundle(&bundle).is_err());
    assert_eq!(snapshot(&install), before);
    assert!(!installation.is_patched());
}

#[test_log::test]
fn test_failed_second_directory_rolls_back_first() {
    let dir = tempfile::tempdir().unwrap();
    let local_app_data = dir.path().join("Local");

    for version in ["app-1.0.9", "app-1.0.10"] {
        let resources = local_app_data.join("Discord").join(version).join("resources");
        std::fs::create_dir_all(&resources).unwrap();
        std::fs::write(resources.join("app.asar"), STOCK_ARCHIVE).unwrap();
    }

    let before = snapshot(&local_app_data);
    let platform: Arc<dyn Platform> = Arc::new(
        WindowsPlatform::new(&HostEnv::default())
            .with_local_app_data(local_app_data.clone())
            .with_process_control(false),
    );
    // Directories are patched greatest first, so 1.0.9 is done when 1.0.10
    // fails.
    let fs = FaultyFs {
        fail_rename_from: Some(local_app_data.join("Discord/app-1.0.10/resources/app.asar")),
        ..Default::default()
    };
    let patcher =
        Patcher::new(platform.clone(), dir.path().join("vencord.asar")).with_file_ops(Arc::new(fs));
    let mut installation = platform.discover().into_iter().next().unwrap();

    assert_eq!(installation.resource_dirs().len(), 2);

    let error = patcher.patch(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::TransactionFailure));
    assert_eq!(snapshot(&local_app_data), before);
    assert!(!installation.is_patched());
}

#[test_log::test]
fn test_unexpected_file_blocks_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let loose = install.join("resources/app");

    std::fs::create_dir(&loose).unwrap();
    std::fs::write(loose.join("index.js"), b"require(\"/old/patcher.js\")").unwrap();
    std::fs::write(loose.join("package.json"), b"{}").unwrap();
    std::fs::write(loose.join("evil.dll"), b"MZ").unwrap();

    let before = snapshot(&install);
    let platform = linux_platform(dir.path());
    let patcher = Patcher::new(platform.clone(), dir.path().join("vencord.asar"));
    let mut installation = classify(&platform, &install);

    assert!(installation.is_patched());

    let error = patcher.unpatch(&mut installation).unwrap_err();
    assert!(matches!(error.kind(), PatchErrorKind::UnsafeDeletion));
    assert_eq!(snapshot(&install), before);

    let error = patcher.patch(&mut installation).unwrap_err();
    assert!(matches!(error.kind(), PatchErrorKind::UnsafeDeletion));
    assert_eq!(snapshot(&install), before);
}

#[test_log::test]
fn test_loose_files_migrated() {
    let dir = tempfile::tempdir().unwrap();
    let install = make_linux_install(dir.path());
    let loose = install.join("resources/app");

    std::fs::create_dir(&loose).unwrap();
    std::fs::write(loose.join("index.js"), b"require(\"/old/patcher.js\")").unwrap();
    std::fs::write(loose.join("package.json"), b"{}").unwrap();

    let platform = linux_platform(dir.path());
    let patcher = Patcher::new(platform.clone(), dir.path().join("vencord.asar"));
    let mut installation = classify(&platform, &install);

    patcher.patch(&mut installation).unwrap();

    assert!(!loose.exists());
    assert!(installation.is_patched());
    assert_eq!(
        std::fs::read(install.join("resources/_app.asar")).unwrap(),
        STOCK_ARCHIVE
    );
}

#[test_log::test]
fn test_shared_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let install = dir.path().join("discord");
    std::fs::create_dir_all(install.join("app.asar.unpacked")).unwrap();
    std::fs::write(install.join("app.asar.unpacked/native.node"), b"\x7fELF").unwrap();
    std::fs::write(install.join("app.asar"), STOCK_ARCHIVE).unwrap();
    let before = snapshot(&install);

    let platform = linux_platform(dir.path());
    let patcher = Patcher::new(platform.clone(), dir.path().join("vencord.asar"));
    let mut installation = classify(&platform, &install);

    assert!(installation.uses_shared_runtime());
    assert_eq!(installation.resource_dirs(), [install.clone()]);

    patcher.patch(&mut installation).unwrap();

    assert!(install.join("_app.asar.unpacked/native.node").exists());
    assert!(!install.join("app.asar.unpacked").exists());
    assert!(classify(&platform, &install).is_patched());

    patcher.unpatch(&mut installation).unwrap();

    assert_eq!(snapshot(&install), before);
}

#[test_log::test]
fn test_windows_all_versions_patched() {
    let dir = tempfile::tempdir().unwrap();
    let local_app_data = dir.path().join("Local");
    let versions = ["app-1.0.9", "app-1.0.10"];

    for version in versions {
        let resources = local_app_data.join("DiscordCanary").join(version).join("resources");
        std::fs::create_dir_all(&resources).unwrap();
        std::fs::write(resources.join("app.asar"), STOCK_ARCHIVE).unwrap();
    }

    let before = snapshot(&local_app_data);
    let platform: Arc<dyn Platform> = Arc::new(
        WindowsPlatform::new(&HostEnv::default())
            .with_local_app_data(local_app_data.clone())
            .with_process_control(false),
    );
    let patcher = Patcher::new(platform.clone(), dir.path().join("vencord.asar"));
    let mut installations = platform.discover();

    assert_eq!(installations.len(), 1);
    let installation = &mut installations[0];
    assert_eq!(installation.family(), OsFamily::Windows);

    patcher.patch(installation).unwrap();

    for version in versions {
        let resources = local_app_data.join("DiscordCanary").join(version).join("resources");
        assert_eq!(std::fs::read(resources.join("_app.asar")).unwrap(), STOCK_ARCHIVE);
    }

    patcher.unpatch(installation).unwrap();

    assert_eq!(snapshot(&local_app_data), before);
}

#[test_log::test]
fn test_windows_moved_install_refused() {
    let dir = tempfile::tempdir().unwrap();
    let local_app_data = dir.path().join("Local");
    let program_data = dir.path().join("ProgramData");
    let resources = local_app_data.join("Discord/app-1.0.9/resources");

    std::fs::create_dir_all(&resources).unwrap();
    std::fs::write(resources.join("app.asar"), STOCK_ARCHIVE).unwrap();
    std::fs::create_dir_all(program_data.join("alice/Discord")).unwrap();

    let mut env = HostEnv::default();
    env.program_data = Some(program_data);
    env.username = Some("alice".into());

    let platform: Arc<dyn Platform> = Arc::new(
        WindowsPlatform::new(&env)
            .with_local_app_data(local_app_data.clone())
            .with_process_control(false),
    );
    let patcher = Patcher::new(platform.clone(), dir.path().join("vencord.asar"));
    let mut installation = platform.discover().into_iter().next().unwrap();

    let error = patcher.patch(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::MovedInstall));
    assert_eq!(std::fs::read(resources.join("app.asar")).unwrap(), STOCK_ARCHIVE);
}
