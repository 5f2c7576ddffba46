//! Release feed and bundle download.
//!
//! Release metadata comes from the GitHub releases API. GitHub rate limits
//! anonymous clients and some networks block it, so a mirror is tried when
//! the primary answers with 401, 403 or 429.
use std::{
    fmt::Debug,
    io::Write,
    path::Path,
    sync::{mpsc, Arc},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    config::Config,
    error::{AddPatchContext, PatchError, PatchErrorKind},
    platform::Platform,
};

/// Vencord release feed.
pub const VENCORD_RELEASE_URL: &str = "https://api.github.com/repos/Vendicated/Vencord/releases/latest";
/// Vencord release feed mirror.
pub const VENCORD_RELEASE_FALLBACK_URL: &str = "https://vencord.dev/releases/vencord";
/// Installer release feed.
pub const INSTALLER_RELEASE_URL: &str =
    "https://api.github.com/repos/Vencord/Installer/releases/latest";
/// Installer release feed mirror.
pub const INSTALLER_RELEASE_FALLBACK_URL: &str = "https://vencord.dev/releases/installer";

/// Name of the bundle asset in a Vencord release.
pub const BUNDLE_ASSET_NAME: &str = "desktop.asar";

const HASH_MARKER: &[u8] = b"// Vencord ";

/// Build identifier sent in the user agent.
pub const BUILD_HASH: &str = match option_env!("VENCORD_PATCHER_GIT_HASH") {
    Some(value) => value,
    None => env!("CARGO_PKG_VERSION"),
};

/// Returns the `User-Agent` header value.
pub fn user_agent() -> String {
    format!("VencordInstaller/{BUILD_HASH} (https://github.com/Vencord/Installer)")
}

/// A downloadable file in a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

/// Subset of a GitHub release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GithubRelease {
    /// Release title; the last word is the build hash.
    pub name: String,
    /// Version tag.
    pub tag_name: String,
    /// Attached files.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl GithubRelease {
    /// Returns the build hash from the release title.
    pub fn latest_hash(&self) -> &str {
        self.name.rsplit(' ').next().unwrap_or(&self.name)
    }

    /// Finds an asset by name.
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// A non-success HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("HTTP status {0}")]
pub struct HttpStatus(pub u16);

/// Returns whether a status means the client is rate limited or blocked.
pub fn is_rate_limited(status: u16) -> bool {
    matches!(status, 401 | 403 | 429)
}

/// Returns the HTTP status carried by a [`PatchErrorKind::Network`] error.
pub fn http_status(error: &PatchError) -> Option<u16> {
    error.downcast_source::<HttpStatus>().map(|status| status.0)
}

/// Performs HTTP GET requests.
pub trait Downloader: Debug + Send + Sync {
    /// Downloads `url` into `writer` and returns the number of bytes written.
    ///
    /// Non-success statuses fail with [`PatchErrorKind::Network`] and an
    /// [`HttpStatus`] source.
    fn get(&self, url: &str, writer: &mut dyn Write) -> Result<u64, PatchError>;
}

/// [`Downloader`] using `ureq`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpDownloader {
    /// Creates a downloader with the default user agent.
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(30))
                .build(),
            user_agent: user_agent(),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for HttpDownloader {
    fn get(&self, url: &str, writer: &mut dyn Write) -> Result<u64, PatchError> {
        tracing::debug!(url, "GET");

        let response = match self.agent.get(url).set("User-Agent", &self.user_agent).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _response)) => {
                tracing::warn!(url, code, "non-success status");
                return Err(PatchError::new(PatchErrorKind::Network)
                    .with_source(HttpStatus(code))
                    .with_context(url));
            }
            Err(error) => {
                tracing::warn!(url, %error, "request failed");
                return Err(PatchError::new(PatchErrorKind::Network)
                    .with_source(error)
                    .with_context(url));
            }
        };

        let expected = response
            .header("Content-Length")
            .and_then(|value| value.parse::<u64>().ok());

        let read = std::io::copy(&mut response.into_reader(), writer).map_err(|error| {
            PatchError::new(PatchErrorKind::Network)
                .with_source(error)
                .with_context(url)
        })?;

        tracing::debug!(url, read, ?expected, "downloaded");

        match expected {
            Some(expected) if expected != read => Err(PatchError::new(PatchErrorKind::Network)
                .with_context(format!(
                    "unexpected end of input: Content-Length was {expected}, but only read {read}"
                ))
                .with_context(url)),
            _ => Ok(read),
        }
    }
}

/// A release feed with a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFeed {
    /// Primary URL.
    pub url: String,
    /// Mirror used when the primary rate limits or blocks.
    pub fallback_url: String,
}

impl ReleaseFeed {
    /// Creates a feed.
    pub fn new<U: Into<String>, F: Into<String>>(url: U, fallback_url: F) -> Self {
        Self {
            url: url.into(),
            fallback_url: fallback_url.into(),
        }
    }

    /// The Vencord feed.
    pub fn vencord() -> Self {
        Self::new(VENCORD_RELEASE_URL, VENCORD_RELEASE_FALLBACK_URL)
    }

    /// The installer's own feed.
    pub fn installer() -> Self {
        Self::new(INSTALLER_RELEASE_URL, INSTALLER_RELEASE_FALLBACK_URL)
    }

    /// Fetches the latest release.
    pub fn fetch(&self, downloader: &dyn Downloader) -> Result<GithubRelease, PatchError> {
        match Self::fetch_url(&self.url, downloader) {
            Err(error) if http_status(&error).is_some_and(is_rate_limited) => {
                tracing::warn!(
                    url = %self.url,
                    fallback = %self.fallback_url,
                    %error,
                    "rate limited or blocked, trying fallback"
                );
                Self::fetch_url(&self.fallback_url, downloader)
            }
            other => other,
        }
    }

    fn fetch_url(url: &str, downloader: &dyn Downloader) -> Result<GithubRelease, PatchError> {
        let mut buf = Vec::new();
        downloader.get(url, &mut buf)?;

        serde_json::from_slice(&buf).map_err(|error| {
            PatchError::new(PatchErrorKind::InvalidData)
                .with_source(error)
                .with_context(format!("failed to decode release from {url}"))
        })
    }
}

/// Release state of the local bundle.
#[derive(Debug, Clone, Default)]
pub struct ReleaseContext {
    /// Hash of the bundle on disk.
    pub installed_hash: Option<String>,
    /// Latest release, if fetched.
    pub latest: Option<GithubRelease>,
    /// Whether downloads are disabled.
    pub dev_mode: bool,
}

impl ReleaseContext {
    /// Creates a context from local state only.
    pub fn offline(config: &Config) -> Self {
        Self {
            installed_hash: installed_hash(&config.bundle_path),
            latest: None,
            dev_mode: config.dev_install,
        }
    }

    /// Starts fetching the latest release in the background.
    ///
    /// Nothing is fetched in development mode.
    pub fn spawn(config: &Config, feed: ReleaseFeed, downloader: Arc<dyn Downloader>) -> PendingRelease {
        let context = Self::offline(config);

        tracing::debug!(
            installed_hash = ?context.installed_hash,
            dev_mode = context.dev_mode,
            "release context"
        );

        if context.dev_mode {
            return PendingRelease {
                context,
                receiver: None,
            };
        }

        let (sender, receiver) = mpsc::sync_channel(1);

        std::thread::spawn(move || {
            let result = feed.fetch(&*downloader);
            let _ = sender.send(result);
        });

        PendingRelease {
            context,
            receiver: Some(receiver),
        }
    }

    /// Hash of the latest release.
    pub fn latest_hash(&self) -> Option<&str> {
        self.latest.as_ref().map(GithubRelease::latest_hash)
    }

    /// Returns whether the local bundle differs from the latest release.
    pub fn is_outdated(&self) -> bool {
        match self.latest_hash() {
            Some(latest) if !self.dev_mode => self.installed_hash.as_deref() != Some(latest),
            _ => false,
        }
    }

    /// Downloads the latest bundle if the local one is outdated.
    pub fn ensure_latest(
        &mut self,
        config: &Config,
        downloader: &dyn Downloader,
        platform: &dyn Platform,
    ) -> Result<(), PatchError> {
        if !self.is_outdated() {
            return Ok(());
        }

        if let Some(release) = &self.latest {
            download_bundle(config, release, downloader, platform)?;
            self.installed_hash = Some(release.latest_hash().to_string());
        }

        Ok(())
    }
}

/// Result of [`ReleaseContext::spawn`].
#[derive(Debug)]
pub struct PendingRelease {
    context: ReleaseContext,
    receiver: Option<mpsc::Receiver<Result<GithubRelease, PatchError>>>,
}

impl PendingRelease {
    /// Blocks until the fetch is done.
    pub fn wait(self) -> Result<ReleaseContext, PatchError> {
        let mut context = self.context;

        if let Some(receiver) = self.receiver {
            let release = receiver.recv().map_err(|_| {
                PatchError::new(PatchErrorKind::Other).with_context("release fetch thread ended")
            })??;

            tracing::info!(
                latest = release.latest_hash(),
                installed = ?context.installed_hash,
                "fetched latest release"
            );
            context.latest = Some(release);
        }

        Ok(context)
    }
}

/// Reads the build hash from a bundle's `// Vencord <hash>` banner.
pub fn installed_hash(bundle_path: &Path) -> Option<String> {
    let bytes = match std::fs::read(bundle_path) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::debug!(?bundle_path, %error, "no existing bundle");
            return None;
        }
    };

    let start = bytes
        .windows(HASH_MARKER.len())
        .position(|window| window == HASH_MARKER)?
        + HASH_MARKER.len();

    let hash = bytes[start..]
        .iter()
        .take_while(|byte| byte.is_ascii_alphanumeric())
        .map(|&byte| byte as char)
        .collect::<String>();

    tracing::debug!(?bundle_path, %hash, "existing bundle hash");

    if hash.is_empty() {
        None
    } else {
        Some(hash)
    }
}

/// Downloads the release's bundle to the configured path.
///
/// The file is downloaded next to its destination and moved into place once
/// complete. An empty `package.json` is written beside it so Node does not
/// pick up one from a parent directory.
pub fn download_bundle(
    config: &Config,
    release: &GithubRelease,
    downloader: &dyn Downloader,
    platform: &dyn Platform,
) -> Result<(), PatchError> {
    if config.dev_install {
        tracing::info!("development install, skipping download");
        return Ok(());
    }

    let asset = release.asset(BUNDLE_ASSET_NAME).ok_or_else(|| {
        PatchError::new(PatchErrorKind::InvalidData)
            .with_context(format!("release {} has no {BUNDLE_ASSET_NAME}", release.tag_name))
    })?;
    let bundle_dir = config.bundle_dir();

    tracing::info!(url = %asset.browser_download_url, path = ?config.bundle_path, "downloading bundle");

    std::fs::create_dir_all(bundle_dir)
        .map_err(PatchError::from)
        .patch_contextc(|| format!("failed to create {}", bundle_dir.display()))?;

    let package_json = bundle_dir.join("package.json");
    if let Err(error) = std::fs::write(&package_json, b"{}") {
        tracing::warn!(path = ?package_json, %error, "failed to create package.json");
    }

    let mut temp = tempfile::Builder::new()
        .prefix(".vencord-download-")
        .tempfile_in(bundle_dir)?;

    downloader.get(&asset.browser_download_url, temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.persist(&config.bundle_path)
        .map_err(|error| PatchError::from(error.error))
        .patch_contextc(|| format!("failed to move bundle to {}", config.bundle_path.display()))?;

    platform.fix_ownership(bundle_dir)?;

    Ok(())
}
