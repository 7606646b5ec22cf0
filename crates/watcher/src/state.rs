//! Session state tracking and change notification policy.

use camwatch_events::{CameraState, Decision};

/// When an accepted classification fires the change callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// Every accepted decision overwrites the state and fires, even when
    /// the value is unchanged. The unified-log path works this way: the
    /// log stream only emits on real events, so every decision is news.
    Always,
    /// Only an actual transition fires. The open-file listing repeats an
    /// identical reading once per polling interval, so repeats are
    /// debounced.
    OnTransition,
}

/// Tracks one session's camera state and decides what is reportable.
#[derive(Debug)]
pub struct StateTracker {
    policy: NotifyPolicy,
    state: CameraState,
}

impl StateTracker {
    /// Creates a tracker at the initial `Unknown` state.
    pub fn new(policy: NotifyPolicy) -> Self {
        Self {
            policy,
            state: CameraState::Unknown,
        }
    }

    /// The last accepted state.
    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Applies one classification.
    ///
    /// Returns the state to deliver to the change callback, or `None`
    /// when nothing is reportable. `NoDecision` is dropped without
    /// touching the tracked state.
    pub fn apply(&mut self, decision: Decision) -> Option<CameraState> {
        let next = decision.state()?;
        match self.policy {
            NotifyPolicy::Always => {
                self.state = next;
                Some(next)
            }
            NotifyPolicy::OnTransition => {
                if next == self.state {
                    return None;
                }
                self.state = next;
                Some(next)
            }
        }
    }
}
