use std::sync::mpsc::Receiver;

use cursive::{
    align::HAlign,
    view::Nameable,
    views::{Dialog, DialogFocus, LinearLayout, NamedView, TextView},
    Cursive,
};

use crate::error::{PatchError, PatchErrorKind};

pub enum GuidedDialogButton<T> {
    Exit,
    Next(T),
}

impl<T> GuidedDialogButton<T> {
    pub fn unwrap_button(self) -> Result<T, PatchError> {
        match self {
            GuidedDialogButton::Exit => Err(PatchErrorKind::InterruptedByUser.into()),
            GuidedDialogButton::Next(value) => Ok(value),
        }
    }
}

pub fn guided_dialog<T, F>(
    title: &str,
    value_callback: F,
) -> (Dialog, Receiver<GuidedDialogButton<T>>)
where
    F: Fn(&mut Cursive) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    let (sender, receiver) = std::sync::mpsc::sync_channel(1);
    let sender2 = sender.clone();

    let mut dialog = Dialog::new().title(title).h_align(HAlign::Right);

    dialog.add_button("Exit", move |cursive| {
        cursive.pop_layer();
        let _ = sender.send(GuidedDialogButton::Exit);
    });
    dialog.add_button("Next", move |cursive| {
        cursive.pop_layer();
        let value = value_callback(cursive);
        let _ = sender2.send(GuidedDialogButton::Next(value));
    });

    let _ = dialog.set_focus(DialogFocus::Button(1));

    (dialog, receiver)
}

pub fn info_dialog(title: &str) -> (Dialog, Receiver<()>) {
    let (sender, receiver) = std::sync::mpsc::sync_channel(1);

    let dialog = Dialog::new()
        .title(title)
        .button("OK", move |cursive| {
            cursive.pop_layer();
            let _ = sender.send(());
        })
        .h_align(HAlign::Center);

    (dialog, receiver)
}

const PROGRESS_DIALOG: &str = "progress_dialog";
const PROGRESS_DIALOG_TEXT: &str = "progress_dialog_text";

pub fn progress_dialog(title: &str) -> NamedView<Dialog> {
    let layout = LinearLayout::vertical()
        .child(TextView::empty().with_name(PROGRESS_DIALOG_TEXT))
        .child(TextView::new("Please wait..."));

    Dialog::new()
        .title(title)
        .content(layout)
        .with_name(PROGRESS_DIALOG)
}

pub fn set_progress_dialog_text(cursive: &mut Cursive, value: &str) {
    if let Some(mut text_view) = cursive.find_name::<TextView>(PROGRESS_DIALOG_TEXT) {
        text_view.set_content(value);
    }
}

pub fn dismiss_progress_dialog(cursive: &mut Cursive) {
    if let Some(position) = cursive.screen_mut().find_layer_from_name(PROGRESS_DIALOG) {
        cursive.screen_mut().remove_layer(position);
    }
}
