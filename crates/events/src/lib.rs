//! Shared event types for camera watch sessions.
//!
//! Value types crossing the watcher's API boundary: the tracked camera
//! state, the per-chunk classification outcome, and the diagnostic
//! notifications delivered on a session's error channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tracked camera activity state.
///
/// Every session starts at `Unknown` and never returns to it once a
/// reading has been accepted. Change callbacks only ever deliver `On`
/// or `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraState {
    Unknown,
    On,
    Off,
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "Unknown",
            Self::On => "On",
            Self::Off => "Off",
        })
    }
}

/// Outcome of classifying one chunk of diagnostic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    On,
    Off,
    /// The chunk carries no camera-state information. It must not touch
    /// tracked state or fire callbacks.
    NoDecision,
}

impl Decision {
    /// The state this decision settles on, if it settles at all.
    pub fn state(self) -> Option<CameraState> {
        match self {
            Self::On => Some(CameraState::On),
            Self::Off => Some(CameraState::Off),
            Self::NoDecision => None,
        }
    }
}

/// Notification delivered on a session's error channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DiagnosticEvent {
    /// One raw chunk from the diagnostic process's stderr, verbatim.
    Stderr { text: String },
    /// The diagnostic process exited. The session is dead afterwards;
    /// it is never restarted.
    Exited {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
    },
}
