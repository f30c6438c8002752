//! Session state machine

use std::fmt;

use serde::Serialize;

/// Lifecycle of one host's session
///
/// ```text
/// Idle -> Dialing -> Running -> Succeeded | Failed
///         Dialing -> ConnectionFailed
/// Idle -> Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Dialing,
    Running,
    Succeeded,
    Failed,
    ConnectionFailed,
    /// Never started because an earlier host failed
    Skipped,
}

impl SessionState {
    /// No transition leaves a terminal state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded
                | SessionState::Failed
                | SessionState::ConnectionFailed
                | SessionState::Skipped
        )
    }

    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{ConnectionFailed, Dialing, Failed, Idle, Running, Skipped, Succeeded};

        matches!(
            (self, next),
            (Idle, Dialing)
                | (Idle, Skipped)
                | (Dialing, Running)
                | (Dialing, ConnectionFailed)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Dialing => "dialing",
            SessionState::Running => "running",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
            SessionState::ConnectionFailed => "connection_failed",
            SessionState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}
