// Notes on Linux layouts:
//
// Tarball/deb/rpm: <root>/<Name>/resources/app.asar
// System electron (Arch discord_arch_electron): <root>/<name>/app.asar with
// app.asar.unpacked beside it and no resources directory.
// Flatpak: <root>/com.discordapp.Discord/current/active/files/discord/...
// where the last segment is the lowercased name with the channel split off
// by a hyphen.

use std::{
    ffi::{OsStr, OsString},
    path::{Component, Path, PathBuf},
    process::Command,
};

use crate::{
    classify::{APP_ASAR, BACKUP_ASAR},
    error::{AddPatchContext, PatchError, PatchErrorKind},
    install::{flatpak_runtime_name, Channel, ConfinedApp, Installation},
    os::{OsFamily, RealUser},
};

use super::{HostEnv, Platform};

/// Directory names of known installations.
pub const LINUX_DIR_NAMES: [&str; 15] = [
    "Discord",
    "DiscordPTB",
    "DiscordCanary",
    "DiscordDevelopment",
    "discord",
    "discordptb",
    "discordcanary",
    "discorddevelopment",
    "discord-ptb",
    "discord-canary",
    "discord-development",
    "com.discordapp.Discord",
    "com.discordapp.DiscordPTB",
    "com.discordapp.DiscordCanary",
    "com.discordapp.DiscordDevelopment",
];

const FLATPAK_ACTIVE_FILES: [&str; 3] = ["current", "active", "files"];

/// Linux and other Unix-like hosts.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    search_roots: Vec<PathBuf>,
    real_user: Option<RealUser>,
    superuser: bool,
}

impl LinuxPlatform {
    /// Creates a platform scanning the default locations.
    pub fn new(env: &HostEnv) -> Self {
        Self {
            search_roots: Self::default_search_roots(&env.home),
            real_user: env.real_user.clone(),
            superuser: env.superuser,
        }
    }

    /// Returns the locations scanned for installation directories.
    pub fn default_search_roots(home: &Path) -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/share"),
            PathBuf::from("/usr/local/share"),
            PathBuf::from("/usr/lib64"),
            PathBuf::from("/opt"),
            home.join(".local/share"),
            home.join(".dvm"),
            PathBuf::from("/var/lib/flatpak/app"),
            home.join(".local/share/flatpak/app"),
        ]
    }

    /// Replaces the scanned locations.
    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    fn grant_user(&self, app: &ConfinedApp) -> Option<&str> {
        if self.superuser && !app.system_wide {
            self.real_user.as_ref().map(|user| user.name.as_str())
        } else {
            None
        }
    }
}

impl Platform for LinuxPlatform {
    fn family(&self) -> OsFamily {
        OsFamily::Linux
    }

    fn discover(&self) -> Vec<Installation> {
        let mut installations = Vec::new();

        for root in &self.search_roots {
            for (name, path) in super::read_subdirs(root) {
                if !LINUX_DIR_NAMES.contains(&name.as_str()) {
                    continue;
                }

                if let Some(installation) = self.classify(&path, None) {
                    tracing::info!(path = ?installation.root_path(), "found installation");
                    installations.push(installation);
                }
            }
        }

        installations
    }

    fn classify(&self, path: &Path, channel: Option<Channel>) -> Option<Installation> {
        let name = path.file_name()?.to_string_lossy().into_owned();

        let path = if is_flatpak_path(path) && flatpak_app_id(path).is_none() {
            path.join(FLATPAK_ACTIVE_FILES.iter().collect::<PathBuf>())
                .join(flatpak_runtime_name(&name))
        } else {
            path.to_path_buf()
        };

        let resources = path.join("resources");
        let channel = channel.unwrap_or_else(|| Channel::infer(&name));

        let installation = if resources.is_dir() {
            Installation::new(OsFamily::Linux, path.clone(), channel, vec![resources])?
        } else if path.join(APP_ASAR).exists() || path.join(BACKUP_ASAR).exists() {
            Installation::new(OsFamily::Linux, path.clone(), channel, vec![path.clone()])?
                .with_shared_runtime(true)
        } else {
            tracing::warn!(?path, "not a valid installation");
            return None;
        };

        match flatpak_app_id(&path) {
            Some(app_id) => {
                let system_wide = path.starts_with("/var");
                Some(installation.with_confinement(ConfinedApp {
                    app_id,
                    system_wide,
                }))
            }
            None => Some(installation),
        }
    }

    fn after_patch(&self, installation: &Installation, bundle_dir: &Path) -> Result<(), PatchError> {
        let Some(app) = installation.confinement() else {
            return Ok(());
        };

        let mut command = flatpak_override_command(app, bundle_dir, self.grant_user(app));

        tracing::info!(?command, "granting flatpak access to bundle directory");

        let output = command
            .output()
            .map_err(PatchError::from)
            .patch_contextc(|| format!("failed to run flatpak override for {}", app.app_id))?;

        if output.status.success() {
            Ok(())
        } else {
            tracing::error!(
                status = ?output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "flatpak override failed"
            );
            Err(PatchError::new(PatchErrorKind::Other).with_context(format!(
                "failed to grant {} access to {}: flatpak exited with {}",
                app.app_id,
                bundle_dir.display(),
                output.status
            )))
        }
    }

    fn fix_ownership(&self, path: &Path) -> Result<(), PatchError> {
        let Some(user) = &self.real_user else {
            return Ok(());
        };

        #[cfg(unix)]
        crate::os::unix::chown_tree(path, user.uid, user.gid)?;
        #[cfg(not(unix))]
        tracing::debug!(?path, user = %user.name, "ownership not supported on this host");

        Ok(())
    }
}

fn is_flatpak_path(path: &Path) -> bool {
    path.components()
        .any(|component| component == Component::Normal(OsStr::new("flatpak")))
}

/// Extracts the flatpak app ID from a resolved flatpak install path.
///
/// The ID is the path segment right before `current/active/files`.
pub fn flatpak_app_id(path: &Path) -> Option<String> {
    let segments = path
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>();

    let index = segments
        .windows(FLATPAK_ACTIVE_FILES.len())
        .position(|window| window.iter().map(|segment| &**segment).eq(FLATPAK_ACTIVE_FILES))?;

    index
        .checked_sub(1)
        .map(|index| segments[index].to_string())
}

/// Builds the command granting a flatpak app access to a directory.
///
/// With `run_as`, the command runs through `sudo -u` as that user.
pub fn flatpak_override_command(app: &ConfinedApp, dir: &Path, run_as: Option<&str>) -> Command {
    let mut args = Vec::<OsString>::new();

    if !app.system_wide {
        args.push("--user".into());
    }
    args.push("override".into());
    args.push(app.app_id.clone().into());

    let mut filesystem = OsString::from("--filesystem=");
    filesystem.push(dir);
    args.push(filesystem);

    match run_as {
        Some(user) => {
            let mut command = Command::new("sudo");
            command.arg("-u").arg(user).arg("flatpak").args(args);
            command
        }
        None => {
            let mut command = Command::new("flatpak");
            command.args(args);
            command
        }
    }
}
