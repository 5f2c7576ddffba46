//! Find Discord installations and patch them to load Vencord.
//!
//! The patch swaps the client's `app.asar` for a small shim archive that
//! `require`s the downloaded Vencord bundle. The original archive is kept
//! next to it as `_app.asar` and restored on unpatch.
//!
//! ## Example
//!
//! ```no_run
//! # fn main() -> Result<(), vencord_patcher::error::PatchError> {
//! let context = vencord_patcher::Context::from_env()?;
//!
//! for installation in context.discover() {
//!     println!("{installation}");
//! }
//!
//! let mut installation = context.select(&vencord_patcher::install::Selector::Auto)?;
//! let mut release = context.spawn_release_check().wait()?;
//!
//! context.install(&mut installation, &mut release)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety of patching
//!
//! Every rename and write of a transaction is recorded. If a step fails,
//! the completed steps are reverted in reverse order so the installation is
//! left either fully patched or as it was.
//!
//! Directories are only ever deleted when they contain nothing but files
//! this crate writes itself.
//!
//! Transactions do no locking. Two processes patching the same
//! installation at once may corrupt it.
//!
//! ### Running elevated
//!
//! On Linux, running through `sudo` or `doas` is supported. The invoking
//! user's home directory is searched, and files created while elevated are
//! given back to that user. Running as root without either is refused.
use std::{path::Path, sync::Arc};

use alternate::AlternateRuntime;
use config::Config;
use error::{AddPatchContext, PatchError};
use install::{Channel, Installation, Selector};
use os::OsFamily;
use patch::Patcher;
use platform::{HostEnv, Platform};
use release::{Downloader, HttpDownloader, PendingRelease, ReleaseContext, ReleaseFeed};
use self_update::SelfUpdater;

pub mod alternate;
pub mod asar;
pub mod classify;
pub mod config;
pub mod error;
pub mod fs;
pub mod install;
pub mod os;
pub mod patch;
pub mod platform;
pub mod release;
pub mod self_update;
#[cfg(feature = "ui")]
mod tui;

#[cfg(feature = "ui")]
pub use tui::run_interactive;

/// Everything a front-end needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Context {
    env: HostEnv,
    config: Config,
    platform: Arc<dyn Platform>,
    downloader: Arc<dyn Downloader>,
    patcher: Patcher,
    alternate: AlternateRuntime,
}

impl Context {
    /// Detects the host and reads the configuration from the environment.
    ///
    /// On Linux, fails when running as superuser without an identifiable
    /// invoking user.
    pub fn from_env() -> Result<Self, PatchError> {
        let family = OsFamily::current()?;
        let env = HostEnv::from_env(family)?;
        let config = Config::from_env(family, &env.home)?;
        let platform = Arc::from(platform::for_family(family, &env));

        tracing::info!(%family, ?config, "initialized");

        Ok(Self::new(env, config, platform, Arc::new(HttpDownloader::new())))
    }

    /// Creates a context from explicit parts.
    pub fn new(
        env: HostEnv,
        config: Config,
        platform: Arc<dyn Platform>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let patcher = Patcher::new(platform.clone(), config.bundle_path.clone());
        let alternate = AlternateRuntime::new(platform.clone(), downloader.clone());

        Self {
            env,
            config,
            platform,
            downloader,
            patcher,
            alternate,
        }
    }

    /// OS family of the host.
    pub fn family(&self) -> OsFamily {
        self.platform.family()
    }

    /// Host details.
    pub fn host_env(&self) -> &HostEnv {
        &self.env
    }

    /// Resolved configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Platform implementation of the host.
    pub fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    /// Patch engine.
    pub fn patcher(&self) -> &Patcher {
        &self.patcher
    }

    /// OpenAsar manager.
    pub fn alternate_runtime(&self) -> &AlternateRuntime {
        &self.alternate
    }

    /// Enumerates installations in the well-known locations.
    pub fn discover(&self) -> Vec<Installation> {
        let installations = self.platform.discover();
        tracing::info!(count = installations.len(), "discovered installations");
        installations
    }

    /// Builds an installation record for a path.
    pub fn classify(&self, path: &Path, channel: Option<Channel>) -> Option<Installation> {
        self.platform.classify(path, channel)
    }

    /// Picks an installation with the front-end's selection rules.
    pub fn select(&self, selector: &Selector) -> Result<Installation, PatchError> {
        match selector {
            Selector::Location(path) => self.classify(path, None).ok_or_else(|| {
                PatchError::new(error::PatchErrorKind::NotFound).with_context(format!(
                    "{} is not a valid Discord installation",
                    path.display()
                ))
            }),
            selector => selector.select(self.discover()),
        }
    }

    /// Gives files created while elevated back to the real user.
    pub fn fix_ownership(&self, path: &Path) -> Result<(), PatchError> {
        self.platform.fix_ownership(path)
    }

    /// Starts fetching the latest Vencord release in the background.
    pub fn spawn_release_check(&self) -> PendingRelease {
        ReleaseContext::spawn(&self.config, ReleaseFeed::vencord(), self.downloader.clone())
    }

    /// Returns a self-updater for the host.
    pub fn self_updater(&self) -> SelfUpdater {
        SelfUpdater::new(self.family(), self.downloader.clone())
    }

    /// Downloads the bundle if outdated and patches the installation.
    pub fn install(
        &self,
        installation: &mut Installation,
        release: &mut ReleaseContext,
    ) -> Result<(), PatchError> {
        release
            .ensure_latest(&self.config, &*self.downloader, &*self.platform)
            .patch_context("failed to download Vencord")?;

        self.patcher.patch(installation)
    }

    /// Downloads the bundle again and patches the installation.
    pub fn repair(
        &self,
        installation: &mut Installation,
        release: &mut ReleaseContext,
    ) -> Result<(), PatchError> {
        if let Some(latest) = &release.latest {
            release::download_bundle(&self.config, latest, &*self.downloader, &*self.platform)
                .patch_context("failed to download Vencord")?;
            release.installed_hash = Some(latest.latest_hash().to_string());
        }

        self.patcher.patch(installation)
    }

    /// Removes the patch.
    pub fn uninstall(&self, installation: &mut Installation) -> Result<(), PatchError> {
        self.patcher.unpatch(installation)
    }
}
