//! sshfan-exec: Remote execution transport
//!
//! Dialing, authentication and streamed command execution over SSH, plus the
//! jump-host tunnel used to reach targets that sit behind a bastion.

pub mod auth;
pub mod error;
pub mod ssh;
pub mod target;
pub mod traits;
pub mod tunnel;

pub use auth::{AuthMethod, KeyError};
pub use error::ExecError;
pub use ssh::{SshConnector, SshDialer, SshSession};
pub use target::ConnectionSpec;
pub use traits::{Connector, Dialer, OutputHandler, OutputStream, RemoteSession};
pub use tunnel::ProxyTunnel;
