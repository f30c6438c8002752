//! Jump-host tunnel (SSH over a `direct-tcpip` channel)
//!
//! ```text
//! Client --SSH--> [Bastion] --direct-tcpip--> [Target]
//! ```
//!
//! One bastion connection is held for the whole run. Each target gets its own
//! `direct-tcpip` channel on it, and a full SSH handshake runs inside that
//! channel, so concurrent sessions multiplex over the single transport.

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use tracing::{info, instrument};

use crate::error::ExecError;
use crate::ssh::{ClientHandler, SshSession, authenticate, client_config, connect_direct};
use crate::target::ConnectionSpec;
use crate::traits::{Dialer, RemoteSession};

/// An authenticated connection to the bastion, usable as a `Dialer`
pub struct ProxyTunnel {
    endpoint: String,
    handle: Handle<ClientHandler>,
}

impl std::fmt::Debug for ProxyTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTunnel")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ProxyTunnel {
    /// Dial and authenticate against the bastion
    ///
    /// # Errors
    /// Returns the dial or authentication failure for the bastion itself
    #[instrument(skip(proxy), fields(proxy = %proxy.endpoint()))]
    pub async fn connect(proxy: &ConnectionSpec) -> Result<Self, ExecError> {
        let handle = connect_direct(proxy).await?;
        info!(proxy = %proxy.endpoint(), "jump host ready");

        Ok(Self {
            endpoint: proxy.endpoint(),
            handle,
        })
    }
}

#[async_trait]
impl Dialer for ProxyTunnel {
    #[instrument(skip(self, target), fields(proxy = %self.endpoint, host = %target.host))]
    async fn dial(&self, target: &ConnectionSpec) -> Result<Box<dyn RemoteSession>, ExecError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                target.host.clone(),
                u32::from(target.port),
                "127.0.0.1",
                0,
            )
            .await
            .map_err(|e| {
                ExecError::ConnectionFailed(format!(
                    "{} via {}: {e}",
                    target.endpoint(),
                    self.endpoint
                ))
            })?;

        let mut handle = client::connect_stream(client_config(), channel.into_stream(), ClientHandler)
            .await
            .map_err(|e| {
                ExecError::ConnectionFailed(format!(
                    "handshake with {} via {}: {e}",
                    target.endpoint(),
                    self.endpoint
                ))
            })?;

        authenticate(&mut handle, target).await?;
        info!(host = %target.host, proxy = %self.endpoint, "SSH connected through jump host");

        Ok(Box::new(SshSession::new(target.endpoint(), handle)))
    }

    async fn shutdown(&self) -> Result<(), ExecError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;
        info!(proxy = %self.endpoint, "jump host disconnected");
        Ok(())
    }

    fn route(&self) -> String {
        format!("via {}", self.endpoint)
    }
}
