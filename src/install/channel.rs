use std::{fmt::Display, str::FromStr};

use crate::error::{PatchError, PatchErrorKind};

/// Release track of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    /// The primary release.
    #[default]
    Stable,
    /// Public test build (beta).
    Ptb,
    /// Canary build.
    Canary,
    /// Internal development build.
    Development,
}

impl Channel {
    /// All channels in the order discovery checks them.
    pub const ALL: [Channel; 4] = [
        Channel::Stable,
        Channel::Ptb,
        Channel::Canary,
        Channel::Development,
    ];

    // Order matters: suffixes are tried in turn.
    const SUFFIXES: [(&'static str, Channel); 3] = [
        ("canary", Channel::Canary),
        ("development", Channel::Development),
        ("ptb", Channel::Ptb),
    ];

    /// Infers the channel from an install name such as `DiscordCanary` or
    /// `discord-ptb`.
    ///
    /// Defaults to [`Channel::Stable`].
    pub fn infer(name: &str) -> Self {
        Self::split_suffix(name)
            .map(|(_, channel)| channel)
            .unwrap_or_default()
    }

    /// Splits a lowercased name into its base and channel suffix.
    ///
    /// Returns `None` for names without a known suffix.
    pub(crate) fn split_suffix(name: &str) -> Option<(String, Channel)> {
        let name = name.to_lowercase();

        Self::SUFFIXES.iter().find_map(|(suffix, channel)| {
            name.strip_suffix(suffix)
                .map(|base| (base.to_string(), *channel))
        })
    }

    /// Lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Ptb => "ptb",
            Self::Canary => "canary",
            Self::Development => "development",
        }
    }

    /// Directory name under `%LocalAppData%`.
    pub fn windows_dir_name(&self) -> &'static str {
        match self {
            Self::Stable => "Discord",
            Self::Ptb => "DiscordPTB",
            Self::Canary => "DiscordCanary",
            Self::Development => "DiscordDevelopment",
        }
    }

    /// Application bundle name.
    pub fn macos_bundle_name(&self) -> &'static str {
        match self {
            Self::Stable => "Discord.app",
            Self::Ptb => "Discord PTB.app",
            Self::Canary => "Discord Canary.app",
            Self::Development => "Discord Development.app",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" => Ok(Self::Stable),
            "ptb" | "beta" => Ok(Self::Ptb),
            "canary" => Ok(Self::Canary),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(PatchError::new(PatchErrorKind::InvalidData)
                .with_context(format!("unknown channel {s:?}"))),
        }
    }
}

/// Maps a reverse-DNS flatpak ID to the runtime directory name inside the
/// flatpak's `files` tree.
///
/// `com.discordapp.DiscordCanary` becomes `discord-canary`.
pub fn flatpak_runtime_name(app_id: &str) -> String {
    let name = app_id.rsplit('.').next().unwrap_or(app_id);

    match Channel::split_suffix(name) {
        Some((base, channel)) if !base.is_empty() => format!("{base}-{channel}"),
        _ => name.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer() {
        assert_eq!(Channel::infer("Discord"), Channel::Stable);
        assert_eq!(Channel::infer("DiscordPTB"), Channel::Ptb);
        assert_eq!(Channel::infer("discord-canary"), Channel::Canary);
        assert_eq!(Channel::infer("DiscordDevelopment"), Channel::Development);
        assert_eq!(Channel::infer("Discord Canary"), Channel::Canary);
        assert_eq!(Channel::infer("com.vendor.AppCanary"), Channel::Canary);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("PTB".parse::<Channel>().unwrap(), Channel::Ptb);
        assert_eq!("dev".parse::<Channel>().unwrap(), Channel::Development);
        assert!("nightly".parse::<Channel>().is_err());
    }

    #[test]
    fn test_flatpak_runtime_name() {
        assert_eq!(flatpak_runtime_name("com.vendor.AppCanary"), "app-canary");
        assert_eq!(flatpak_runtime_name("com.discordapp.Discord"), "discord");
        assert_eq!(
            flatpak_runtime_name("com.discordapp.DiscordPTB"),
            "discord-ptb"
        );
        assert_eq!(
            flatpak_runtime_name("com.discordapp.DiscordDevelopment"),
            "discord-development"
        );
    }
}
