//! Camera in-use watcher driven by OS diagnostic streams.
//!
//! Reports whether the host camera is actively capturing by observing
//! platform diagnostic tools instead of polling camera hardware: on
//! macOS the unified log (`log stream`) filtered to the camera extension
//! subsystem, on Linux `lsof` in repeat mode against the video device
//! node. Tool output is classified chunk by chunk into on/off decisions
//! and delivered through a change callback; stderr and subprocess death
//! arrive on a separate error callback.

mod classify;
mod error;
mod launcher;
mod platform;
mod session;
mod state;

pub use camwatch_events::{CameraState, Decision, DiagnosticEvent};
pub use classify::{
    CAPTURE_START_MARKER, CAPTURE_STOP_MARKER, LOG_STREAM_BANNER, classify_capture_log,
    classify_device_listing,
};
pub use error::WatchError;
pub use launcher::{CAPTURE_LOG_PREDICATE, DEFAULT_DEVICE};
pub use platform::Platform;
pub use session::{OnChangeFn, OnErrorFn, WatchConfig, WatchSession, watch};
