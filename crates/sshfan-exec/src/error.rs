//! Error types for sshfan-exec

use thiserror::Error;

/// Errors that can occur while talking to a remote host
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to reach or handshake with the remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// SSH key could not be loaded or parsed
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Opening or driving an exec channel failed
    #[error("channel error: {0}")]
    ChannelError(String),

    /// Remote command was killed by a signal
    #[error("remote command terminated by signal {signal}")]
    Signaled {
        /// Signal name as reported by the server
        signal: String,
    },

    /// Channel closed without reporting how the command ended
    #[error("remote command ended without an exit status")]
    MissingExitStatus,

    /// Session was already closed
    #[error("not connected")]
    NotConnected,

    /// I/O error while tearing down a connection
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecError {
    /// Whether the error happened before a session was usable
    #[must_use]
    pub fn is_dial_failure(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::AuthenticationFailed(_)
                | ExecError::SshKeyError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_failure_classification() {
        assert!(ExecError::ConnectionFailed("refused".into()).is_dial_failure());
        assert!(ExecError::AuthenticationFailed("denied".into()).is_dial_failure());
        assert!(ExecError::SshKeyError("bad key".into()).is_dial_failure());
        assert!(!ExecError::ChannelError("eof".into()).is_dial_failure());
        assert!(!ExecError::MissingExitStatus.is_dial_failure());
    }

    #[test]
    fn test_signal_message() {
        let err = ExecError::Signaled {
            signal: "KILL".into(),
        };
        assert_eq!(err.to_string(), "remote command terminated by signal KILL");
    }
}
