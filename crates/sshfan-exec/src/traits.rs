//! Transport traits
//!
//! The orchestration layer only sees these seams: a `Connector` hands out
//! `Dialer`s (direct or through a jump host), a `Dialer` opens a
//! `RemoteSession`, and a session runs commands while streaming output into
//! an `OutputHandler`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::target::ConnectionSpec;

/// Which remote stream a chunk of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives output chunks as they arrive from the remote side
#[async_trait]
pub trait OutputHandler: Send {
    async fn on_output(&mut self, stream: OutputStream, data: &[u8]);
}

/// An authenticated connection to one host
#[async_trait]
pub trait RemoteSession: Send {
    /// Run one command on a fresh channel and return its exit status
    async fn run(&mut self, cmd: &str, output: &mut dyn OutputHandler) -> Result<u32, ExecError>;

    /// Disconnect; calling it twice is a no-op
    async fn close(&mut self) -> Result<(), ExecError>;
}

/// Opens sessions to targets
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &ConnectionSpec) -> Result<Box<dyn RemoteSession>, ExecError>;

    /// Tear down any transport shared by the sessions this dialer opened
    async fn shutdown(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Human-readable route, e.g. `direct` or `via bastion:22`
    fn route(&self) -> String;
}

/// Builds dialers for a run
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dialer that connects straight to each target
    fn direct(&self) -> Arc<dyn Dialer>;

    /// Connect to `proxy` once and return a dialer tunneling through it
    async fn jump(&self, proxy: &ConnectionSpec) -> Result<Arc<dyn Dialer>, ExecError>;
}
