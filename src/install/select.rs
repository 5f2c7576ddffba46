use std::path::PathBuf;

use crate::error::{PatchError, PatchErrorKind};

use super::{Channel, Installation};

/// Picks one installation from the discovered ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// The only installation found.
    #[default]
    Sole,
    /// The first of stable, canary, ptb found.
    Auto,
    /// The first installation of a channel.
    Channel(Channel),
    /// The installation at a path, classified on its own.
    Location(PathBuf),
}

impl Selector {
    const AUTO_ORDER: [Channel; 3] = [Channel::Stable, Channel::Canary, Channel::Ptb];

    /// Chooses from `installations`.
    ///
    /// [`Selector::Location`] is resolved by the caller through
    /// classification and always fails here.
    pub fn select(&self, installations: Vec<Installation>) -> Result<Installation, PatchError> {
        match self {
            Self::Sole => match installations.len() {
                0 => Err(not_found()),
                1 => installations.into_iter().next().ok_or_else(not_found),
                _ => {
                    let candidates = installations
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");

                    Err(PatchError::new(PatchErrorKind::InvalidData).with_context(format!(
                        "multiple installations found, pick one with --branch or --location: {candidates}"
                    )))
                }
            },
            Self::Auto => {
                let mut installations = installations;

                Self::AUTO_ORDER
                    .iter()
                    .find_map(|channel| {
                        installations
                            .iter()
                            .position(|inst| inst.channel() == *channel)
                    })
                    .map(|index| installations.swap_remove(index))
                    .ok_or_else(not_found)
            }
            Self::Channel(channel) => installations
                .into_iter()
                .find(|inst| inst.channel() == *channel)
                .ok_or_else(|| not_found().with_context(channel.as_str())),
            Self::Location(path) => Err(not_found().with_context(path.display().to_string())),
        }
    }
}

fn not_found() -> PatchError {
    PatchErrorKind::NotFound.into()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::os::OsFamily;

    fn installation(root: &Path, channel: Channel) -> Installation {
        Installation::new(
            OsFamily::Linux,
            root.to_path_buf(),
            channel,
            vec![root.join("resources")],
        )
        .unwrap()
    }

    #[test]
    fn test_sole() {
        let one = vec![installation(Path::new("/opt/discord"), Channel::Stable)];
        assert!(Selector::Sole.select(one).is_ok());

        let error = Selector::Sole.select(Vec::new()).unwrap_err();
        assert!(matches!(error.kind(), PatchErrorKind::NotFound));

        let two = vec![
            installation(Path::new("/opt/discord"), Channel::Stable),
            installation(Path::new("/opt/discord-ptb"), Channel::Ptb),
        ];
        let error = Selector::Sole.select(two).unwrap_err();
        assert!(error.context().contains("/opt/discord-ptb"));
    }

    #[test]
    fn test_auto_prefers_stable_then_canary() {
        let found = vec![
            installation(Path::new("/opt/discord-ptb"), Channel::Ptb),
            installation(Path::new("/opt/discord-canary"), Channel::Canary),
        ];

        let chosen = Selector::Auto.select(found).unwrap();
        assert_eq!(chosen.channel(), Channel::Canary);

        let found = vec![installation(Path::new("/opt/discord-dev"), Channel::Development)];
        assert!(Selector::Auto.select(found).is_err());
    }

    #[test]
    fn test_channel() {
        let found = vec![
            installation(Path::new("/opt/discord"), Channel::Stable),
            installation(Path::new("/opt/discord-ptb"), Channel::Ptb),
        ];

        let chosen = Selector::Channel(Channel::Ptb).select(found).unwrap();
        assert_eq!(chosen.root_path(), Path::new("/opt/discord-ptb"));
    }
}
