//! Core error types for sshfan-core

use thiserror::Error;

/// Errors that abort a whole run
///
/// Per-host and per-command failures never surface here; they are recorded
/// in the `SessionResult` of the host they belong to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Config is unusable; raised before any network activity
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Jump host could not be reached or rejected the credentials
    #[error("proxy connection failed: {0}")]
    ProxyConnection(String),
}
