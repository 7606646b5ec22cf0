//! Diagnostic subprocess command construction.
//!
//! One long-lived external tool per platform, stdout/stderr piped back
//! to the session. The tools' argument vectors are fixed; only the
//! Linux device node varies.

use std::process::Stdio;

use tokio::process::Command;

/// Predicate passed to `log stream`, selecting camera extension
/// subsystem lines that mention a client.
pub const CAPTURE_LOG_PREDICATE: &str =
    r#"subsystem contains "com.apple.UVCExtension" and composedMessage contains "client""#;

/// Device watched when the config names none.
pub const DEFAULT_DEVICE: &str = "video0";

/// Seconds between `lsof` repeat cycles.
const LISTING_INTERVAL_SECS: &str = "1";

/// Marker line `lsof -r` prints between repeat cycles.
pub(crate) const REPEAT_MARKER: &str = "=======";

/// Builds the macOS unified-log streaming command.
pub(crate) fn capture_log_command() -> Command {
    let mut cmd = Command::new("log");
    cmd.args(["stream", "--predicate", CAPTURE_LOG_PREDICATE]);
    wire_stdio(&mut cmd);
    cmd
}

/// Builds the Linux open-file listing command for `/dev/<device>`.
pub(crate) fn device_listing_command(device: &str) -> Command {
    let mut cmd = Command::new("lsof");
    cmd.args(["-r", LISTING_INTERVAL_SECS])
        .arg(format!("/dev/{device}"));
    wire_stdio(&mut cmd);
    cmd
}

fn wire_stdio(cmd: &mut Command) {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
}
