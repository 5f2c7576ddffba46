//! Command-line front-end of the Vencord patcher.
use std::{fs::File, time::Duration};

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use vencord_patcher::{
    error::{PatchError, PatchErrorKind},
    install::{Channel, Installation, Selector},
    os::OsFamily,
    release::ReleaseFeed,
    Context,
};

/// Entry point
pub fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.debug)?;

    // Errors are logged here too since the log file is what users attach to
    // bug reports.
    let result = main2(&args);

    if let Err(error) = &result {
        tracing::error!(?error, "main error");
    }

    result
}

fn main2(args: &Args) -> anyhow::Result<()> {
    tracing::info!(?args, version = env!("CARGO_PKG_VERSION"), "starting");

    if let Ok(exe) = std::env::current_exe() {
        vencord_patcher::self_update::delete_old_executable(&exe, Duration::from_millis(200));
    }

    let context = Context::from_env()?;

    let Some(action) = args.action() else {
        return run_interactive(&context);
    };

    let updater = context.self_updater();
    let pending_update = updater.spawn_check(ReleaseFeed::installer());

    if action == Action::UpdateSelf {
        let release = pending_update.wait()?;

        if !updater.is_outdated(&release) {
            println!("The installer is up to date.");
        } else if updater.can_update(&release) {
            updater.update(&release)?;
            println!("Updated the installer to {}.", release.tag_name);
        } else {
            println!(
                "A new installer version is available. Download it from {}",
                updater.download_link()
            );
        }

        return Ok(());
    }

    let mut installation = context.select(&args.selector())?;
    println!("Using {installation}");

    if let Err(error) = run_action(&context, action, &mut installation) {
        print_error(context.family(), &error);
        return Err(error.into());
    }

    match pending_update.wait() {
        Ok(release) if updater.is_outdated(&release) => {
            println!(
                "A new installer version is available. Download it from {}",
                updater.download_link()
            );
        }
        Ok(_) => {}
        Err(error) => tracing::warn!(%error, "failed to check for installer updates"),
    }

    Ok(())
}

fn run_action(
    context: &Context,
    action: Action,
    installation: &mut Installation,
) -> Result<(), PatchError> {
    match action {
        Action::Install => {
            let mut release = context.spawn_release_check().wait()?;
            context.install(installation, &mut release)?;
            println!("Installed Vencord. Restart Discord to load it.");
        }
        Action::Repair => {
            let mut release = context.spawn_release_check().wait()?;
            context.repair(installation, &mut release)?;
            println!("Repaired Vencord. Restart Discord to load it.");
        }
        Action::Uninstall => {
            context.uninstall(installation)?;
            println!("Uninstalled Vencord. Restart Discord to apply.");
        }
        Action::InstallOpenAsar => {
            context.alternate_runtime().activate(installation)?;
            println!("Installed OpenAsar. Restart Discord to load it.");
        }
        Action::UninstallOpenAsar => {
            context.alternate_runtime().deactivate(installation)?;
            println!("Uninstalled OpenAsar. Restart Discord to apply.");
        }
        Action::UpdateSelf => {}
    }

    Ok(())
}

fn print_error(family: OsFamily, error: &PatchError) {
    eprintln!("{}", vencord_patcher::error::format_error(error));

    if error.is_permission_denied() {
        let hint = match family {
            OsFamily::Windows => "Make sure Discord is fully closed, then try again.",
            OsFamily::MacOs => {
                "Grant your terminal Full Disk Access in System Settings, \
                 Privacy & Security, then try again."
            }
            OsFamily::Linux => "Try again with sudo.",
        };
        eprintln!("{hint}");
    }
}

#[cfg(feature = "ui")]
fn run_interactive(context: &Context) -> anyhow::Result<()> {
    match vencord_patcher::run_interactive(context) {
        Err(error) if matches!(error.kind(), PatchErrorKind::InterruptedByUser) => Ok(()),
        result => Ok(result?),
    }
}

#[cfg(not(feature = "ui"))]
fn run_interactive(_context: &Context) -> anyhow::Result<()> {
    Err(PatchError::new(PatchErrorKind::InvalidData)
        .with_context("no action given, see --help")
        .into())
}

/// Initialize logging for debugging
fn init_logging(debug: bool) -> anyhow::Result<()> {
    let log_filename = format!("vencord_patcher_{}.log", whoami::username());
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(tempfile::env::temp_dir().join(log_filename))?;

    let level = if debug {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(level)
        .with_writer(log_file)
        .init();

    Ok(())
}

/// Install Vencord into Discord. Starts the interactive installer when no
/// action is given.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Install Vencord
    #[arg(long, group = "action")]
    install: bool,

    /// Download Vencord again and reinstall it
    #[arg(long, group = "action")]
    repair: bool,

    /// Uninstall Vencord
    #[arg(long, group = "action")]
    uninstall: bool,

    /// Install OpenAsar
    #[arg(long, group = "action")]
    install_openasar: bool,

    /// Uninstall OpenAsar
    #[arg(long, group = "action")]
    uninstall_openasar: bool,

    /// Update the installer itself
    #[arg(long, group = "action")]
    update_self: bool,

    /// Path of the Discord installation to modify
    #[arg(long, conflicts_with = "branch")]
    location: Option<std::path::PathBuf>,

    /// Discord branch to modify
    #[arg(long, value_enum)]
    branch: Option<Branch>,

    /// Log everything
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn action(&self) -> Option<Action> {
        [
            (self.install, Action::Install),
            (self.repair, Action::Repair),
            (self.uninstall, Action::Uninstall),
            (self.install_openasar, Action::InstallOpenAsar),
            (self.uninstall_openasar, Action::UninstallOpenAsar),
            (self.update_self, Action::UpdateSelf),
        ]
        .into_iter()
        .find_map(|(set, action)| set.then_some(action))
    }

    fn selector(&self) -> Selector {
        match (&self.location, self.branch) {
            (Some(path), _) => Selector::Location(path.clone()),
            (None, Some(Branch::Auto)) => Selector::Auto,
            (None, Some(Branch::Stable)) => Selector::Channel(Channel::Stable),
            (None, Some(Branch::Ptb)) => Selector::Channel(Channel::Ptb),
            (None, Some(Branch::Canary)) => Selector::Channel(Channel::Canary),
            (None, Some(Branch::Development)) => Selector::Channel(Channel::Development),
            (None, None) => Selector::Sole,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Install,
    Repair,
    Uninstall,
    InstallOpenAsar,
    UninstallOpenAsar,
    UpdateSelf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Branch {
    Auto,
    Stable,
    Ptb,
    Canary,
    Development,
}
