use std::path::{Path, PathBuf};

use crate::{
    install::{Channel, Installation},
    os::OsFamily,
};

use super::{HostEnv, Platform};

/// macOS hosts.
#[derive(Debug, Clone)]
pub struct MacPlatform {
    search_roots: Vec<PathBuf>,
}

impl MacPlatform {
    /// Creates a platform scanning `/Applications` and `~/Applications`.
    pub fn new(env: &HostEnv) -> Self {
        Self {
            search_roots: vec![
                PathBuf::from("/Applications"),
                env.home.join("Applications"),
            ],
        }
    }

    /// Replaces the scanned application directories.
    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }
}

impl Platform for MacPlatform {
    fn family(&self) -> OsFamily {
        OsFamily::MacOs
    }

    fn discover(&self) -> Vec<Installation> {
        let mut installations = Vec::new();

        for root in &self.search_roots {
            for channel in Channel::ALL {
                let path = root.join(channel.macos_bundle_name());

                if let Some(installation) = self.classify(&path, Some(channel)) {
                    tracing::info!(?path, "found installation");
                    installations.push(installation);
                }
            }
        }

        installations
    }

    fn classify(&self, path: &Path, channel: Option<Channel>) -> Option<Installation> {
        let resources = path.join("Contents").join("Resources");

        if !resources.is_dir() {
            tracing::trace!(?path, "no Contents/Resources");
            return None;
        }

        let channel = channel.unwrap_or_else(|| {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            Channel::infer(name.trim_end_matches(".app"))
        });

        Installation::new(OsFamily::MacOs, path.to_path_buf(), channel, vec![resources])
    }
}
