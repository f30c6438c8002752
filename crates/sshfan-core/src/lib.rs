//! sshfan-core: run one shell script across many hosts over SSH
//!
//! The `Coordinator` resolves connection specs, establishes the optional jump
//! host, dispatches a `SessionRunner` per host and aggregates a `RunResult`.
//! All host output goes through the `OutputSink` actor.

pub mod actor;
pub mod config;
pub mod coordinator;
pub mod env;
pub mod error;
pub mod line;
pub mod message;
pub mod resolve;
pub mod result;
pub mod runner;
pub mod state;
pub mod tunnel;

use std::io::Write;
use std::sync::Arc;

pub use actor::{OutputSink, OutputSinkArgs};
pub use config::{
    Credentials, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_USER, DispatchMode,
    ProxyConfig, RunConfig,
};
pub use coordinator::Coordinator;
pub use env::EnvPrelude;
pub use error::CoreError;
pub use message::{EmitLine, Flush, LineKind, OutputLine, SinkStats};
pub use result::{
    CommandRecord, CommandStatus, ErrorKind, RunResult, SessionError, SessionResult,
};
pub use runner::{ScriptPlan, SessionRunner};
pub use state::SessionState;
pub use tunnel::TunnelProvider;

/// Run `config` over real SSH connections, writing host output to `writer`
///
/// # Errors
/// See [`Coordinator::run`]
pub async fn run(config: &RunConfig, writer: Box<dyn Write + Send>) -> Result<RunResult, CoreError> {
    Coordinator::new(Arc::new(sshfan_exec::SshConnector))
        .run(config, writer)
        .await
}
