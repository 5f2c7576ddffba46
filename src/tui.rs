//! Terminal user interface.
//!
//! The interactive flow picks an installation, picks an action and runs it
//! while a progress dialog is shown. Errors are rendered with their source
//! chain.
use std::{
    fmt::Debug,
    sync::{mpsc::Receiver, Arc},
    thread::JoinHandle,
};

use cursive::{
    view::Scrollable,
    views::{
        stack_view::{Fullscreen, Transparent},
        Dialog, LinearLayout, RadioGroup, TextView,
    },
    CbSink, Cursive, CursiveExt,
};
use dialog::GuidedDialogButton;

use crate::{
    error::{PatchError, PatchErrorKind},
    install::Installation,
    os::OsFamily,
    release::ReleaseContext,
    Context,
};

mod bg;
mod dialog;

/// An action offered for the selected installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Install,
    Repair,
    Uninstall,
    InstallOpenAsar,
    UninstallOpenAsar,
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Self::Install => "Install Vencord",
            Self::Repair => "Repair Vencord (download again and reinstall)",
            Self::Uninstall => "Uninstall Vencord",
            Self::InstallOpenAsar => "Install OpenAsar",
            Self::UninstallOpenAsar => "Uninstall OpenAsar",
        }
    }

    fn progress_text(&self) -> &'static str {
        match self {
            Self::Install | Self::Repair => "Installing Vencord...",
            Self::Uninstall => "Uninstalling Vencord...",
            Self::InstallOpenAsar => "Installing OpenAsar...",
            Self::UninstallOpenAsar => "Uninstalling OpenAsar...",
        }
    }

    fn conclusion_text(&self) -> &'static str {
        match self {
            Self::Install | Self::Repair => {
                "Vencord was installed. Restart Discord to load it."
            }
            Self::Uninstall => "Vencord was uninstalled. Restart Discord to apply.",
            Self::InstallOpenAsar => "OpenAsar was installed. Restart Discord to load it.",
            Self::UninstallOpenAsar => "OpenAsar was uninstalled. Restart Discord to apply.",
        }
    }
}

/// Runs the guided session.
///
/// If the user leaves the guide, the error kind
/// [`InterruptedByUser`](crate::error::PatchErrorKind::InterruptedByUser) is
/// returned. Other errors are shown in a dialog before being returned.
pub fn run_interactive(context: &Context) -> Result<(), PatchError> {
    let mut tui = Tui::new(context.family());
    tui.run_background();

    let result = run_session(&tui, context);

    if let Err(error) = &result {
        if !matches!(error.kind(), PatchErrorKind::InterruptedByUser) {
            tracing::error!(%error, "interactive session failed");
            tui.hide_progress_dialog()?;
            tui.show_error(error)?;
        }
    }

    tui.stop()?;

    result
}

fn run_session(tui: &Tui, context: &Context) -> Result<(), PatchError> {
    let pending_release = context.spawn_release_check();

    tui.set_up_background(&ReleaseContext::offline(context.config()))?;

    let installations = context.discover();

    if installations.is_empty() {
        return Err(PatchError::new(PatchErrorKind::NotFound).with_context(
            "no Discord installation found, run with --location to pick one by path",
        ));
    }

    let index = tui.prompt_installation(&installations)?.unwrap_button()?;
    let mut installation = installations
        .into_iter()
        .nth(index)
        .ok_or_else(|| PatchError::from(PatchErrorKind::NotFound))?;

    let openasar_active = context.alternate_runtime().is_active(&mut installation);
    let action = tui
        .prompt_action(&installation, openasar_active)?
        .unwrap_button()?;

    tracing::info!(?action, %installation, "running action");
    tui.show_progress_dialog(action.progress_text())?;

    match action {
        Action::Install => {
            let mut release = pending_release.wait()?;
            context.install(&mut installation, &mut release)?;
        }
        Action::Repair => {
            let mut release = pending_release.wait()?;
            context.repair(&mut installation, &mut release)?;
        }
        Action::Uninstall => context.uninstall(&mut installation)?,
        Action::InstallOpenAsar => context.alternate_runtime().activate(&mut installation)?,
        Action::UninstallOpenAsar => context.alternate_runtime().deactivate(&mut installation)?,
    }

    tui.hide_progress_dialog()?;
    tui.show_conclusion(action.conclusion_text())?;

    Ok(())
}

/// Remedy shown under permission errors.
fn permission_hint(family: OsFamily) -> &'static str {
    match family {
        OsFamily::Windows => "Make sure Discord is fully closed, then try again.",
        OsFamily::MacOs => {
            "Grant the terminal Full Disk Access in System Settings, \
             Privacy & Security, then try again."
        }
        OsFamily::Linux => "Rerun the installer through sudo.",
    }
}

struct Tui {
    family: OsFamily,
    channel: Option<CbSink>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl Tui {
    fn new(family: OsFamily) -> Self {
        Self {
            family,
            channel: None,
            handle: None,
        }
    }

    fn run_background(&mut self) {
        assert!(self.channel.is_none());

        let (sender, receiver) = std::sync::mpsc::sync_channel(1);

        let join_handle = std::thread::spawn(move || {
            let mut cursive = cursive::Cursive::new();

            sender.send(cursive.cb_sink().clone()).unwrap();

            cursive.run_crossterm()
        });

        self.handle = Some(join_handle);

        self.channel = Some(receiver.recv().unwrap());
    }

    fn stop(&mut self) -> Result<(), PatchError> {
        if let Some(channel) = self.channel.take() {
            let _ = channel.send(Box::new(|cursive| cursive.quit()));
        }

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| PatchError::from(PatchErrorKind::Terminal))??;
        }

        Ok(())
    }

    fn show_wait_dialog<T>(&self, dialog: Dialog, dialog_receiver: Receiver<T>) -> Result<T, PatchError>
    where
        T: Send + 'static,
    {
        self.in_cursive(move |cursive| {
            cursive.add_layer(dialog);
        })?;

        dialog_receiver
            .recv()
            .map_err(|_error| PatchErrorKind::Terminal.into())
    }

    fn set_up_background(&self, release: &ReleaseContext) -> Result<(), PatchError> {
        let status = match &release.installed_hash {
            Some(hash) => format!("Vencord {hash}"),
            None if release.dev_mode => "Vencord (development install)".to_string(),
            None => "Vencord not downloaded yet".to_string(),
        };
        let footer = format!("Vencord Installer {}", crate::self_update::CURRENT_TAG);

        let view = bg::Backdrop::new("Vencord Installer", &status, &footer);

        self.in_cursive(|cursive| {
            cursive
                .screen_mut()
                .add_layer(Transparent(Fullscreen(view)));
        })
    }

    fn show_error(&self, error: &PatchError) -> Result<(), PatchError> {
        let mut layout = LinearLayout::vertical()
            .child(TextView::new("An error occurred."))
            .child(TextView::new("\n"))
            .child(TextView::new(crate::error::format_error(error)).scrollable());

        if error.is_permission_denied() {
            layout.add_child(TextView::new("\n"));
            layout.add_child(TextView::new(permission_hint(self.family)));
        }

        let (mut dialog, dialog_receiver) = dialog::info_dialog("Error");
        dialog.set_content(layout);

        self.show_wait_dialog(dialog, dialog_receiver)
    }

    fn prompt_installation(
        &self,
        installations: &[Installation],
    ) -> Result<GuidedDialogButton<usize>, PatchError> {
        let mut layout = LinearLayout::vertical();
        layout.add_child(TextView::new("Select the Discord installation to modify:"));
        layout.add_child(TextView::new("\n"));

        let mut radio_group = RadioGroup::new();

        for (index, installation) in installations.iter().enumerate() {
            layout.add_child(radio_group.button(index, installation.to_string()));
        }

        let (mut dialog, dialog_receiver) = dialog::guided_dialog("Installations", move |_| {
            Arc::unwrap_or_clone(radio_group.selection())
        });
        dialog.set_content(layout.scrollable());

        self.show_wait_dialog(dialog, dialog_receiver)
    }

    fn prompt_action(
        &self,
        installation: &Installation,
        openasar_active: bool,
    ) -> Result<GuidedDialogButton<Action>, PatchError> {
        let mut actions = vec![Action::Install, Action::Repair];

        if installation.is_patched() {
            actions.push(Action::Uninstall);
        }
        actions.push(if openasar_active {
            Action::UninstallOpenAsar
        } else {
            Action::InstallOpenAsar
        });

        let mut layout = LinearLayout::vertical();
        layout.add_child(TextView::new(installation.to_string()));
        layout.add_child(TextView::new("\n"));

        let mut radio_group = RadioGroup::new();

        for action in actions {
            layout.add_child(radio_group.button(action, action.label()));
        }

        let (mut dialog, dialog_receiver) = dialog::guided_dialog("Action", move |_| {
            Arc::unwrap_or_clone(radio_group.selection())
        });
        dialog.set_content(layout.scrollable());

        self.show_wait_dialog(dialog, dialog_receiver)
    }

    fn show_progress_dialog(&self, text: &'static str) -> Result<(), PatchError> {
        let dialog = dialog::progress_dialog("");

        self.in_cursive(move |cursive| {
            cursive.add_layer(dialog);
            dialog::set_progress_dialog_text(cursive, text);
        })
    }

    fn hide_progress_dialog(&self) -> Result<(), PatchError> {
        self.in_cursive(|cursive| {
            dialog::dismiss_progress_dialog(cursive);
        })
    }

    fn show_conclusion(&self, text: &str) -> Result<(), PatchError> {
        let (mut dialog, dialog_receiver) = dialog::info_dialog("Done");
        dialog.set_content(TextView::new(text).scrollable());

        self.show_wait_dialog(dialog, dialog_receiver)
    }

    fn in_cursive<F, T>(&self, func: F) -> Result<T, PatchError>
    where
        F: FnOnce(&mut Cursive) -> T + Send + 'static,
        T: Send + 'static,
    {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| PatchError::new(PatchErrorKind::Terminal).with_context("TUI not running"))?;
        let (sender, receiver) = std::sync::mpsc::sync_channel(1);

        let result = channel.send(Box::new(move |cursive| {
            let _ = sender.send(func(cursive));
        }));

        if result.is_err() {
            Err(PatchErrorKind::Terminal.into())
        } else {
            receiver
                .recv()
                .map_err(|_e| PatchErrorKind::Terminal.into())
        }
    }
}

impl Debug for Tui {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tui").field("family", &self.family).finish()
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        if let Some(channel) = &mut self.channel {
            let _ = channel.send(Box::new(|cursive| cursive.quit()));
        }
    }
}
