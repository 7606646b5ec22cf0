//! Watch session wiring: subprocess spawn, stream pumps, lifecycle.
//!
//! One session owns one diagnostic subprocess. A pump task per output
//! stream feeds the classifier and the error callback; a supervisor task
//! reaps the child and reports its death. All tasks hang off a single
//! cancellation token owned by the session handle.

use std::sync::Arc;

use camwatch_events::{CameraState, DiagnosticEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classify::{classify_capture_log, classify_device_listing};
use crate::error::WatchError;
use crate::launcher::{self, REPEAT_MARKER};
use crate::platform::Platform;
use crate::state::{NotifyPolicy, StateTracker};

/// Callback invoked with each reportable camera state.
pub type OnChangeFn = Box<dyn Fn(CameraState) + Send + Sync + 'static>;

/// Callback invoked with each diagnostic notification.
pub type OnErrorFn = Box<dyn Fn(DiagnosticEvent) + Send + Sync + 'static>;

/// Caller-supplied watch configuration. Immutable once passed to
/// [`watch`].
pub struct WatchConfig {
    /// Device node name under `/dev`, Linux only. Defaults to
    /// [`crate::DEFAULT_DEVICE`] when absent; ignored on macOS.
    pub device: Option<String>,
    /// Receives `On`/`Off`, never `Unknown`. Delivery frequency depends
    /// on the platform's notify policy; callers must not assume
    /// idempotent delivery.
    pub on_change: OnChangeFn,
    /// Receives raw stderr chunks and the terminal exit notification.
    pub on_error: OnErrorFn,
}

/// Handle to one running watch session.
///
/// Dropping the handle leaves the session running; [`WatchSession::stop`]
/// tears it down.
#[derive(Debug)]
pub struct WatchSession {
    state: Arc<Mutex<CameraState>>,
    cancel: CancellationToken,
}

impl WatchSession {
    /// The last accepted camera state.
    pub async fn state(&self) -> CameraState {
        *self.state.lock().await
    }

    /// Returns `true` until the session is stopped or its subprocess
    /// exits.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stops the session and kills the diagnostic subprocess.
    ///
    /// A caller-initiated stop is not a session death: no
    /// [`DiagnosticEvent::Exited`] is delivered.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// How the stdout pump interprets the subprocess's output.
enum Interpreter {
    /// Unified log stream, one event per line.
    CaptureLog,
    /// Open-file listing in repeat mode, one chunk per repeat cycle.
    DeviceListing { device: String },
}

impl Interpreter {
    fn policy(&self) -> NotifyPolicy {
        match self {
            Self::CaptureLog => NotifyPolicy::Always,
            Self::DeviceListing { .. } => NotifyPolicy::OnTransition,
        }
    }
}

/// Starts one watch session for the detected host platform.
///
/// Must be called from within a Tokio runtime. Fails fast on an
/// unsupported platform or when the diagnostic tool cannot be spawned;
/// no callback ever fires in either case.
pub fn watch(config: WatchConfig) -> Result<WatchSession, WatchError> {
    match Platform::detect()? {
        Platform::MacOs => {
            tracing::info!("starting unified log capture watch");
            start_session(
                launcher::capture_log_command(),
                "log",
                Interpreter::CaptureLog,
                config,
            )
        }
        Platform::Linux => {
            let device = config
                .device
                .clone()
                .unwrap_or_else(|| launcher::DEFAULT_DEVICE.to_string());
            tracing::info!(device = %device, "starting device listing watch");
            let command = launcher::device_listing_command(&device);
            start_session(command, "lsof", Interpreter::DeviceListing { device }, config)
        }
    }
}

/// Spawns the subprocess and wires pumps and supervisor around it.
fn start_session(
    mut command: Command,
    tool: &'static str,
    interpreter: Interpreter,
    config: WatchConfig,
) -> Result<WatchSession, WatchError> {
    let mut child = command
        .spawn()
        .map_err(|source| WatchError::Spawn { tool, source })?;

    let stdout = child
        .stdout
        .take()
        .ok_or(WatchError::StreamUnavailable("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(WatchError::StreamUnavailable("stderr"))?;

    let state = Arc::new(Mutex::new(CameraState::Unknown));
    let cancel = CancellationToken::new();
    let on_change = config.on_change;
    let on_error = Arc::new(config.on_error);

    let tracker = StateTracker::new(interpreter.policy());
    let shared = Arc::clone(&state);

    let stdout_task = tokio::spawn(async move {
        let reader = BufReader::new(stdout);
        match interpreter {
            Interpreter::CaptureLog => {
                pump_capture_log(reader, tracker, shared, on_change).await;
            }
            Interpreter::DeviceListing { device } => {
                pump_device_listing(reader, &device, tracker, shared, on_change).await;
            }
        }
    });

    let stderr_on_error = Arc::clone(&on_error);
    let stderr_task = tokio::spawn(async move {
        pump_stderr(BufReader::new(stderr), stderr_on_error).await;
    });

    tokio::spawn(supervise(
        child,
        tool,
        stdout_task,
        stderr_task,
        cancel.clone(),
        on_error,
    ));

    tracing::debug!(tool, "diagnostic process spawned");

    Ok(WatchSession { state, cancel })
}

/// Reaps the subprocess once both pumps drain, or kills it on stop.
async fn supervise(
    mut child: Child,
    tool: &'static str,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    cancel: CancellationToken,
    on_error: Arc<OnErrorFn>,
) {
    let drained = async {
        let _ = stdout_task.await;
        let _ = stderr_task.await;
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            kill_child(&mut child, tool).await;
        }
        _ = drained => {
            // Streams are drained; the child is normally already dead.
            // Still honor a stop that races the final chunks.
            tokio::select! {
                _ = cancel.cancelled() => {
                    kill_child(&mut child, tool).await;
                }
                result = child.wait() => {
                    match result {
                        Ok(status) => {
                            tracing::warn!(tool, %status, "diagnostic process exited");
                            (on_error)(DiagnosticEvent::Exited {
                                code: status.code(),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(tool, error = %e, "failed to reap diagnostic process");
                            (on_error)(DiagnosticEvent::Exited { code: None });
                        }
                    }
                    cancel.cancel();
                }
            }
        }
    }
}

async fn kill_child(child: &mut Child, tool: &'static str) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(tool, error = %e, "failed to kill diagnostic process");
    }
    let _ = child.wait().await;
    tracing::debug!(tool, "watch session stopped");
}

/// Feeds unified-log lines through the classifier, one event per line.
async fn pump_capture_log<R>(
    reader: R,
    mut tracker: StateTracker,
    shared: Arc<Mutex<CameraState>>,
    on_change: OnChangeFn,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                report(
                    tracker.apply(classify_capture_log(&line)),
                    &shared,
                    &on_change,
                )
                .await;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "error reading capture log stream");
                break;
            }
        }
    }
}

/// Assembles open-file listing output into one chunk per repeat cycle
/// and classifies each cycle as a whole.
///
/// Cycle-level classification keeps a cycle's header lines from reading
/// as a close while the device line is still in flight. An empty cycle
/// (device not open) classifies `Off`; a trailing unterminated cycle is
/// flushed at EOF.
async fn pump_device_listing<R>(
    reader: R,
    device: &str,
    mut tracker: StateTracker,
    shared: Arc<Mutex<CameraState>>,
    on_change: OnChangeFn,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut cycle = String::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.starts_with(REPEAT_MARKER) {
                    report(
                        tracker.apply(classify_device_listing(&cycle, device)),
                        &shared,
                        &on_change,
                    )
                    .await;
                    cycle.clear();
                } else {
                    cycle.push_str(&line);
                    cycle.push('\n');
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "error reading device listing stream");
                break;
            }
        }
    }

    if !cycle.is_empty() {
        report(
            tracker.apply(classify_device_listing(&cycle, device)),
            &shared,
            &on_change,
        )
        .await;
    }
}

/// Forwards stderr chunks verbatim, line by line. No classification,
/// no state interaction.
async fn pump_stderr<R>(reader: R, on_error: Arc<OnErrorFn>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                (on_error)(DiagnosticEvent::Stderr { text: line });
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "error reading diagnostic stderr");
                break;
            }
        }
    }
}

/// Publishes a reportable state to the session and the caller.
async fn report(
    reportable: Option<CameraState>,
    shared: &Arc<Mutex<CameraState>>,
    on_change: &OnChangeFn,
) {
    if let Some(next) = reportable {
        *shared.lock().await = next;
        on_change(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn change_recorder() -> (Arc<StdMutex<Vec<CameraState>>>, OnChangeFn) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let on_change: OnChangeFn = Box::new(move |s| seen2.lock().unwrap().push(s));
        (seen, on_change)
    }

    fn error_recorder() -> (Arc<StdMutex<Vec<DiagnosticEvent>>>, OnErrorFn) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let on_error: OnErrorFn = Box::new(move |e| seen2.lock().unwrap().push(e));
        (seen, on_error)
    }

    fn shared_state() -> Arc<Mutex<CameraState>> {
        Arc::new(Mutex::new(CameraState::Unknown))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn capture_log_pump_always_fires() {
        let (seen, on_change) = change_recorder();
        let input = "Filtering the log data using \"subsystem contains ...\"\n\
                     posting AVCaptureSessionDidStartRunningNotification\n\
                     posting AVCaptureSessionDidStartRunningNotification\n";
        let tracker = StateTracker::new(NotifyPolicy::Always);

        pump_capture_log(input.as_bytes(), tracker, shared_state(), on_change).await;

        // Banner fires nothing; the duplicate start event fires twice.
        assert_eq!(
            *seen.lock().unwrap(),
            vec![CameraState::On, CameraState::On]
        );
    }

    #[tokio::test]
    async fn capture_log_pump_updates_shared_state() {
        let (_, on_change) = change_recorder();
        let shared = shared_state();
        let input = "Connect client 1\nposting AVCaptureSessionDidStopRunningNotification\n";
        let tracker = StateTracker::new(NotifyPolicy::Always);

        pump_capture_log(input.as_bytes(), tracker, Arc::clone(&shared), on_change).await;

        assert_eq!(*shared.lock().await, CameraState::Off);
    }

    #[tokio::test]
    async fn device_listing_pump_debounces_cycles() {
        let (seen, on_change) = change_recorder();
        let input = "no match here\n\
                     =======\n\
                     COMMAND  PID USER   FD   TYPE\n\
                     zoom    1234 user  33u  CHR /dev/video0\n\
                     =======\n\
                     no match here\n\
                     =======\n";
        let tracker = StateTracker::new(NotifyPolicy::OnTransition);

        pump_device_listing(input.as_bytes(), "video0", tracker, shared_state(), on_change).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![CameraState::Off, CameraState::On, CameraState::Off]
        );
    }

    #[tokio::test]
    async fn device_listing_pump_header_does_not_mask_device_line() {
        let (seen, on_change) = change_recorder();
        // Device line arrives after the header within the same cycle; the
        // cycle classifies as a whole, so no Off/On flap.
        let input = "COMMAND  PID USER\n\
                     zoom    1234 user  33u  CHR /dev/video0\n\
                     =======\n\
                     COMMAND  PID USER\n\
                     zoom    1234 user  33u  CHR /dev/video0\n\
                     =======\n";
        let tracker = StateTracker::new(NotifyPolicy::OnTransition);

        pump_device_listing(input.as_bytes(), "video0", tracker, shared_state(), on_change).await;

        assert_eq!(*seen.lock().unwrap(), vec![CameraState::On]);
    }

    #[tokio::test]
    async fn device_listing_pump_empty_cycles_fire_once() {
        let (seen, on_change) = change_recorder();
        let input = "=======\n=======\n=======\n";
        let tracker = StateTracker::new(NotifyPolicy::OnTransition);

        pump_device_listing(input.as_bytes(), "video0", tracker, shared_state(), on_change).await;

        assert_eq!(*seen.lock().unwrap(), vec![CameraState::Off]);
    }

    #[tokio::test]
    async fn device_listing_pump_flushes_trailing_cycle() {
        let (seen, on_change) = change_recorder();
        let input = "zoom 1234 user 33u CHR /dev/video0\n";
        let tracker = StateTracker::new(NotifyPolicy::OnTransition);

        pump_device_listing(input.as_bytes(), "video0", tracker, shared_state(), on_change).await;

        assert_eq!(*seen.lock().unwrap(), vec![CameraState::On]);
    }

    #[tokio::test]
    async fn stderr_pump_forwards_verbatim() {
        let (seen, on_error) = error_recorder();

        pump_stderr("permission denied\n".as_bytes(), Arc::new(on_error)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![DiagnosticEvent::Stderr {
                text: "permission denied".into()
            }]
        );
    }

    #[cfg(unix)]
    fn test_command(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn session_end_to_end_device_listing() {
        let (changes, on_change) = change_recorder();
        let (errors, on_error) = error_recorder();

        let script = "printf 'no match here\\n=======\\nzoom 1234 user 33u CHR /dev/video0\\n=======\\nno match here\\n=======\\n'";
        let session = start_session(
            test_command(script),
            "sh",
            Interpreter::DeviceListing {
                device: "video0".into(),
            },
            WatchConfig {
                device: None,
                on_change,
                on_error,
            },
        )
        .unwrap();

        wait_until(|| !session.is_running()).await;

        assert_eq!(
            *changes.lock().unwrap(),
            vec![CameraState::Off, CameraState::On, CameraState::Off]
        );
        assert_eq!(session.state().await, CameraState::Off);
        assert_eq!(
            *errors.lock().unwrap(),
            vec![DiagnosticEvent::Exited { code: Some(0) }]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn session_end_to_end_capture_log() {
        let (changes, on_change) = change_recorder();
        let (errors, on_error) = error_recorder();

        let script = "printf 'Filtering the log data using ...\\nposting AVCaptureSessionDidStartRunningNotification\\nposting AVCaptureSessionDidStartRunningNotification\\n'";
        let session = start_session(
            test_command(script),
            "sh",
            Interpreter::CaptureLog,
            WatchConfig {
                device: None,
                on_change,
                on_error,
            },
        )
        .unwrap();

        wait_until(|| !session.is_running()).await;

        assert_eq!(
            *changes.lock().unwrap(),
            vec![CameraState::On, CameraState::On]
        );
        assert_eq!(
            *errors.lock().unwrap(),
            vec![DiagnosticEvent::Exited { code: Some(0) }]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn session_forwards_stderr_then_exit() {
        let (changes, on_change) = change_recorder();
        let (errors, on_error) = error_recorder();

        let session = start_session(
            test_command("echo 'permission denied' >&2"),
            "sh",
            Interpreter::DeviceListing {
                device: "video0".into(),
            },
            WatchConfig {
                device: None,
                on_change,
                on_error,
            },
        )
        .unwrap();

        wait_until(|| !session.is_running()).await;

        // Stderr is forwarded before the exit notification and never
        // touches tracked state.
        assert_eq!(
            *errors.lock().unwrap(),
            vec![
                DiagnosticEvent::Stderr {
                    text: "permission denied".into()
                },
                DiagnosticEvent::Exited { code: Some(0) },
            ]
        );
        assert!(changes.lock().unwrap().is_empty());
        assert_eq!(session.state().await, CameraState::Unknown);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_kills_session_without_exit_event() {
        let (changes, on_change) = change_recorder();
        let (errors, on_error) = error_recorder();

        let session = start_session(
            test_command("exec sleep 30"),
            "sh",
            Interpreter::DeviceListing {
                device: "video0".into(),
            },
            WatchConfig {
                device: None,
                on_change,
                on_error,
            },
        )
        .unwrap();

        assert!(session.is_running());
        session.stop();
        assert!(!session.is_running());

        // Give the supervisor time to reap the killed child.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(changes.lock().unwrap().is_empty());
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_is_typed() {
        let (_, on_change) = change_recorder();
        let (_, on_error) = error_recorder();

        let mut cmd = Command::new("definitely-not-a-real-tool-7f3a");
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let err = start_session(
            cmd,
            "lsof",
            Interpreter::DeviceListing {
                device: "video0".into(),
            },
            WatchConfig {
                device: None,
                on_change,
                on_error,
            },
        )
        .unwrap_err();

        assert!(matches!(err, WatchError::Spawn { tool: "lsof", .. }));
    }
}
