//! Per-command, per-host and per-run outcomes

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::state::SessionState;

/// How a single script line ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    /// Ran to completion with this exit code
    Exited { code: u32 },
    /// Exceeded the command timeout
    TimedOut { after: Duration },
    /// Channel or transport failure while running
    Errored { reason: String },
    /// Skipped by the stop-on-failure policy, or the host was never reached
    NotAttempted,
}

impl CommandStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, CommandStatus::Exited { code: 0 })
    }

    #[must_use]
    pub fn was_attempted(&self) -> bool {
        !matches!(self, CommandStatus::NotAttempted)
    }
}

/// One script line as executed on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRecord {
    /// Position in the script
    pub index: usize,
    /// The command as declared (without the environment prelude)
    pub command: String,
    pub status: CommandStatus,
    /// Wall time spent; `None` when not attempted
    pub duration: Option<Duration>,
}

impl CommandRecord {
    #[must_use]
    pub fn not_attempted(index: usize, command: impl Into<String>) -> Self {
        Self {
            index,
            command: command.into(),
            status: CommandStatus::NotAttempted,
            duration: None,
        }
    }
}

/// Classification used by callers to pick exit codes and report wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    CommandExecution,
    CommandTimeout,
    Skipped,
    Aborted,
}

/// The error that ended (or first failed) a host's session
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionError {
    /// Dial, handshake or authentication failed
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// A command exited non-zero
    #[error("command #{index} exited with status {exit_status}")]
    CommandFailed { index: usize, exit_status: u32 },

    /// A command exceeded the command timeout
    #[error("command #{index} timed out after {timeout:?}")]
    CommandTimeout { index: usize, timeout: Duration },

    /// A command could not be run to completion
    #[error("command #{index} failed: {reason}")]
    CommandError { index: usize, reason: String },

    /// Host was never started
    #[error("skipped after an earlier host failed")]
    Skipped,

    /// The session task died before reporting
    #[error("session aborted: {message}")]
    Aborted { message: String },
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Connection { .. } => ErrorKind::Connection,
            SessionError::CommandFailed { .. } | SessionError::CommandError { .. } => {
                ErrorKind::CommandExecution
            }
            SessionError::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            SessionError::Skipped => ErrorKind::Skipped,
            SessionError::Aborted { .. } => ErrorKind::Aborted,
        }
    }

    /// Index of the failed command, for command-level errors
    #[must_use]
    pub fn command_index(&self) -> Option<usize> {
        match self {
            SessionError::CommandFailed { index, .. }
            | SessionError::CommandTimeout { index, .. }
            | SessionError::CommandError { index, .. } => Some(*index),
            _ => None,
        }
    }

    #[must_use]
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            SessionError::CommandFailed { exit_status, .. } => Some(*exit_status),
            _ => None,
        }
    }

    /// Map a finished command to the error it represents, if any
    #[must_use]
    pub fn from_command(record: &CommandRecord) -> Option<Self> {
        match &record.status {
            CommandStatus::Exited { code: 0 } | CommandStatus::NotAttempted => None,
            CommandStatus::Exited { code } => Some(SessionError::CommandFailed {
                index: record.index,
                exit_status: *code,
            }),
            CommandStatus::TimedOut { after } => Some(SessionError::CommandTimeout {
                index: record.index,
                timeout: *after,
            }),
            CommandStatus::Errored { reason } => Some(SessionError::CommandError {
                index: record.index,
                reason: reason.clone(),
            }),
        }
    }
}

/// Outcome of one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionResult {
    /// Host entry as declared
    pub host: String,
    /// Terminal state
    pub state: SessionState,
    /// One record per script line, in order
    pub commands: Vec<CommandRecord>,
    /// `true` only for `Succeeded`
    pub success: bool,
    /// First failure, if any
    pub error: Option<SessionError>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl SessionResult {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        state: SessionState,
        commands: Vec<CommandRecord>,
        error: Option<SessionError>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            state,
            commands,
            success: state == SessionState::Succeeded,
            error,
            started_at,
            elapsed,
        }
    }

    /// Records for commands that were actually sent
    pub fn attempted(&self) -> impl Iterator<Item = &CommandRecord> {
        self.commands.iter().filter(|c| c.status.was_attempted())
    }

    /// Exit codes of completed commands, in order
    #[must_use]
    pub fn exit_statuses(&self) -> Vec<Option<u32>> {
        self.commands
            .iter()
            .map(|c| match c.status {
                CommandStatus::Exited { code } => Some(code),
                _ => None,
            })
            .collect()
    }

    /// The record of the command that failed the session
    #[must_use]
    pub fn failed_command(&self) -> Option<&CommandRecord> {
        self.error
            .as_ref()
            .and_then(SessionError::command_index)
            .and_then(|i| self.commands.get(i))
    }
}

/// Aggregate outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// One entry per host, in declaration order
    pub sessions: Vec<SessionResult>,
    /// Logical AND over all hosts
    pub success: bool,
    pub elapsed: Duration,
}

impl RunResult {
    #[must_use]
    pub fn new(sessions: Vec<SessionResult>, elapsed: Duration) -> Self {
        let success = sessions.iter().all(|s| s.success);
        Self {
            sessions,
            success,
            elapsed,
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &SessionResult> {
        self.sessions.iter().filter(|s| !s.success)
    }

    #[must_use]
    pub fn session(&self, host: &str) -> Option<&SessionResult> {
        self.sessions.iter().find(|s| s.host == host)
    }
}
