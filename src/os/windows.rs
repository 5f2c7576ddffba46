//! Process control and install sanity checks for the Windows layout.

// Notes on the Discord Windows layout:
// %LocalAppData%\<Variant>\app-<version>\resources\app.asar
// Squirrel leaves older app-* folders behind after updating.
//
// Notes on "moved" installs:
// https://github.com/Vencord/Installer/issues/9
// A broken installer run can leave a copy under %ProgramData%\<username>\.

use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Stdio},
};

/// Stops every process with the given image name.
///
/// Failures are logged and ignored; the following rename reports a busy
/// file if the client is still running.
pub fn stop_process(name: &str) {
    tracing::info!(name, "stopping process");

    let result = Command::new("powershell")
        .arg("Stop-Process")
        .arg("-Name")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(status) => tracing::debug!(name, ?status, "Stop-Process finished"),
        Err(error) => tracing::debug!(name, %error, "could not run Stop-Process"),
    }
}

/// Returns whether a relocated copy of the variant exists under ProgramData.
pub fn has_moved_install(program_data: &Path, username: &OsStr, dir_name: &str) -> bool {
    let path = program_data.join(username).join(dir_name);
    let exists = path.exists();
    tracing::debug!(?path, exists, "checking for moved install");
    exists
}
