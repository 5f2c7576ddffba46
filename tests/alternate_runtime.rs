//! Toggle OpenAsar on installations laid out in temporary directories.
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use vencord_patcher::{
    alternate::AlternateRuntime,
    error::{PatchError, PatchErrorKind},
    fs::{FileOps, StdFs},
    install::{AlternateRuntimeState, Installation},
    patch::Patcher,
    platform::{HostEnv, LinuxPlatform, Platform},
    release::{Downloader, HttpStatus},
};

const STOCK_ARCHIVE: &[u8] = b"stock archive";
const OPENASAR_ARCHIVE: &[u8] = b"asar header ... OpenAsar nightly ...";

/// Serves one payload for every URL, or fails with a status.
#[derive(Debug)]
struct StaticDownloader(Result<&'static [u8], u16>);

impl Downloader for StaticDownloader {
    fn get(&self, url: &str, writer: &mut dyn Write) -> Result<u64, PatchError> {
        match self.0 {
            Ok(body) => {
                writer.write_all(body)?;
                Ok(body.len() as u64)
            }
            Err(status) => Err(PatchError::new(PatchErrorKind::Network)
                .with_source(HttpStatus(status))
                .with_context(url)),
        }
    }
}

/// Leaves a truncated file behind and fails every write.
#[derive(Debug)]
struct TruncatingFs;

impl FileOps for TruncatingFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        StdFs.rename(from, to)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        StdFs.write(path, &contents[..contents.len() / 2])?;
        Err(io::Error::other("disk full"))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        StdFs.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        StdFs.remove_dir_all(path)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    install: PathBuf,
    resources: PathBuf,
    platform: Arc<dyn Platform>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("discord");
        let resources = install.join("resources");

        std::fs::create_dir_all(&resources).unwrap();
        std::fs::write(resources.join("app.asar"), STOCK_ARCHIVE).unwrap();

        let platform: Arc<dyn Platform> =
            Arc::new(LinuxPlatform::new(&HostEnv::with_home(dir.path().to_path_buf())));

        Self {
            _dir: dir,
            install,
            resources,
            platform,
        }
    }

    fn installation(&self) -> Installation {
        self.platform.classify(&self.install, None).unwrap()
    }

    fn manager(&self, payload: Result<&'static [u8], u16>) -> AlternateRuntime {
        AlternateRuntime::new(self.platform.clone(), Arc::new(StaticDownloader(payload)))
    }

    fn read(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.resources.join(name)).unwrap()
    }

    fn exists(&self, name: &str) -> bool {
        self.resources.join(name).exists()
    }
}

#[test_log::test]
fn test_activate_and_deactivate() {
    let fixture = Fixture::new();
    let manager = fixture.manager(Ok(OPENASAR_ARCHIVE));
    let mut installation = fixture.installation();

    assert!(!manager.is_active(&mut installation));

    manager.activate(&mut installation).unwrap();

    assert_eq!(fixture.read("app.asar"), OPENASAR_ARCHIVE);
    assert_eq!(fixture.read("app.asar.original"), STOCK_ARCHIVE);
    assert!(manager.is_active(&mut installation));
    assert!(manager.is_active(&mut fixture.installation()));
    assert!(!installation.is_patched());

    let error = manager.activate(&mut installation).unwrap_err();
    assert!(matches!(error.kind(), PatchErrorKind::AlreadyApplied));

    manager.deactivate(&mut installation).unwrap();

    assert_eq!(fixture.read("app.asar"), STOCK_ARCHIVE);
    assert!(!fixture.exists("app.asar.original"));
    assert_eq!(
        installation.alternate_runtime(),
        AlternateRuntimeState::Inactive
    );
    assert!(!manager.is_active(&mut fixture.installation()));
}

#[test_log::test]
fn test_deactivate_without_backup() {
    let fixture = Fixture::new();
    let manager = fixture.manager(Ok(OPENASAR_ARCHIVE));
    let mut installation = fixture.installation();

    let error = manager.deactivate(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::MissingBackup));
    assert_eq!(fixture.read("app.asar"), STOCK_ARCHIVE);
}

#[test_log::test]
fn test_failed_download_restores_archive() {
    let fixture = Fixture::new();
    let manager = fixture.manager(Err(404));
    let mut installation = fixture.installation();

    let error = manager.activate(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::Network));
    assert_eq!(fixture.read("app.asar"), STOCK_ARCHIVE);
    assert!(!fixture.exists("app.asar.original"));
    assert!(!manager.is_active(&mut installation));
}

#[test_log::test]
fn test_failed_write_restores_archive() {
    let fixture = Fixture::new();
    let manager = fixture
        .manager(Ok(OPENASAR_ARCHIVE))
        .with_file_ops(Arc::new(TruncatingFs));
    let mut installation = fixture.installation();

    let error = manager.activate(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::TransactionFailure));
    assert_eq!(fixture.read("app.asar"), STOCK_ARCHIVE);
    assert!(!fixture.exists("app.asar.original"));
    assert!(!manager.is_active(&mut fixture.installation()));
}

#[test_log::test]
fn test_unrecognized_download_rejected() {
    let fixture = Fixture::new();
    let manager = fixture.manager(Ok(&b"<html>blocked</html>"[..]));
    let mut installation = fixture.installation();

    let error = manager.activate(&mut installation).unwrap_err();

    assert!(matches!(error.kind(), PatchErrorKind::InvalidData));
    assert_eq!(fixture.read("app.asar"), STOCK_ARCHIVE);
    assert!(!fixture.exists("app.asar.original"));
}

#[test_log::test]
fn test_independent_of_patch() {
    let fixture = Fixture::new();
    let manager = fixture.manager(Ok(OPENASAR_ARCHIVE));
    let patcher = Patcher::new(
        fixture.platform.clone(),
        Path::new("/data/vencord.asar").to_path_buf(),
    );
    let mut installation = fixture.installation();

    patcher.patch(&mut installation).unwrap();
    let shim = fixture.read("app.asar");

    manager.activate(&mut installation).unwrap();

    assert_eq!(fixture.read("app.asar"), shim);
    assert_eq!(fixture.read("_app.asar"), OPENASAR_ARCHIVE);
    assert_eq!(fixture.read("app.asar.original"), STOCK_ARCHIVE);
    assert!(installation.is_patched());
    assert!(manager.is_active(&mut fixture.installation()));

    patcher.unpatch(&mut installation).unwrap();

    assert_eq!(fixture.read("app.asar"), OPENASAR_ARCHIVE);
    assert!(manager.is_active(&mut fixture.installation()));

    manager.deactivate(&mut installation).unwrap();

    assert_eq!(fixture.read("app.asar"), STOCK_ARCHIVE);
    assert!(!fixture.exists("_app.asar"));
}

#[test_log::test]
fn test_state_cached_per_record() {
    let fixture = Fixture::new();
    let manager = fixture.manager(Ok(OPENASAR_ARCHIVE));
    let mut installation = fixture.installation();

    assert_eq!(
        installation.alternate_runtime(),
        AlternateRuntimeState::Unknown
    );
    assert!(!manager.is_active(&mut installation));
    assert_eq!(
        installation.alternate_runtime(),
        AlternateRuntimeState::Inactive
    );

    std::fs::write(fixture.resources.join("app.asar"), OPENASAR_ARCHIVE).unwrap();

    assert!(!manager.is_active(&mut installation));
    assert!(manager.is_active(&mut fixture.installation()));
    assert_eq!(
        installation.refresh_alternate_runtime(),
        AlternateRuntimeState::Active
    );
}
