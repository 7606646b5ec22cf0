//! Pure chunk classifiers for the per-platform diagnostic streams.
//!
//! Both classifiers are stateless functions of the chunk text; prior
//! session state never influences a classification. Debouncing is the
//! state tracker's job, not theirs.

use camwatch_events::Decision;

/// Banner line `log stream` prints once on startup. It is the tool's own
/// diagnostic, not a camera event, and must never read as camera-off.
pub const LOG_STREAM_BANNER: &str = "Filtering the log data using";

/// Unified-log marker for a capture session starting.
pub const CAPTURE_START_MARKER: &str = "AVCaptureSessionDidStartRunningNotification";

/// Unified-log marker for a capture session stopping.
pub const CAPTURE_STOP_MARKER: &str = "AVCaptureSessionDidStopRunningNotification";

/// Fallback substring indicating a client connected to the camera
/// extension, for log lines carrying neither session marker.
const CLIENT_CONNECT_MARKER: &str = "Connect";

/// Classifies one chunk of filtered unified-log output (macOS).
///
/// Marker precedence: startup banner, then the explicit session
/// start/stop notifications, then the connect-substring fallback.
pub fn classify_capture_log(chunk: &str) -> Decision {
    if chunk.contains(LOG_STREAM_BANNER) {
        return Decision::NoDecision;
    }
    if chunk.contains(CAPTURE_START_MARKER) {
        return Decision::On;
    }
    if chunk.contains(CAPTURE_STOP_MARKER) {
        return Decision::Off;
    }
    if chunk.contains(CLIENT_CONNECT_MARKER) {
        Decision::On
    } else {
        Decision::Off
    }
}

/// Classifies one repeat cycle of open-file listing output (Linux).
///
/// Total: a cycle that never mentions the device is itself evidence the
/// device is not open, so there is no `NoDecision` case.
pub fn classify_device_listing(chunk: &str, device: &str) -> Decision {
    if chunk.contains(device) {
        Decision::On
    } else {
        Decision::Off
    }
}
