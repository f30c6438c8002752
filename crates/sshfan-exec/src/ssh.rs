//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use russh::{ChannelMsg, Disconnect};
use tracing::{debug, info, instrument};

use crate::auth::AuthMethod;
use crate::error::ExecError;
use crate::target::ConnectionSpec;
use crate::traits::{Connector, Dialer, OutputHandler, OutputStream, RemoteSession};
use crate::tunnel::ProxyTunnel;

/// SSH client handler for russh
#[derive(Debug)]
pub(crate) struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

pub(crate) fn client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Authenticate an established transport with the spec's credentials
pub(crate) async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    spec: &ConnectionSpec,
) -> Result<(), ExecError> {
    debug!(host = %spec.host, method = spec.auth.kind(), "authenticating");

    let auth_res = match &spec.auth {
        AuthMethod::Password(password) => handle
            .authenticate_password(&spec.user, password)
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?,
        key_auth => {
            let key_pair = key_auth
                .load_private_key()
                .map_err(|e| ExecError::SshKeyError(e.to_string()))?
                .ok_or_else(|| ExecError::SshKeyError("no private key available".to_string()))?;

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();
            handle
                .authenticate_publickey(
                    &spec.user,
                    PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                )
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
        }
    };

    if !auth_res.success() {
        return Err(ExecError::AuthenticationFailed(format!(
            "{} rejected {} authentication for user {}",
            spec.endpoint(),
            spec.auth.kind(),
            spec.user
        )));
    }

    Ok(())
}

/// Open a TCP connection to `spec` and authenticate
#[instrument(skip(spec), fields(host = %spec.host, port = spec.port))]
pub(crate) async fn connect_direct(
    spec: &ConnectionSpec,
) -> Result<Handle<ClientHandler>, ExecError> {
    info!(
        host = %spec.host,
        port = spec.port,
        user = %spec.user,
        "connecting to SSH"
    );

    let mut handle = client::connect(client_config(), (spec.host.as_str(), spec.port), ClientHandler)
        .await
        .map_err(|e| ExecError::ConnectionFailed(format!("{}: {e}", spec.endpoint())))?;

    authenticate(&mut handle, spec).await?;

    info!(host = %spec.host, "SSH connected and authenticated");
    Ok(handle)
}

/// One authenticated SSH connection
///
/// Every command gets its own exec channel on the shared transport.
pub struct SshSession {
    endpoint: String,
    handle: Option<Handle<ClientHandler>>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl SshSession {
    pub(crate) fn new(endpoint: String, handle: Handle<ClientHandler>) -> Self {
        Self {
            endpoint,
            handle: Some(handle),
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    #[instrument(skip(self, cmd, output), fields(endpoint = %self.endpoint))]
    async fn run(&mut self, cmd: &str, output: &mut dyn OutputHandler) -> Result<u32, ExecError> {
        let handle = self.handle.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");
        let start = Instant::now();

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::ChannelError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::ChannelError(e.to_string()))?;

        let mut exit_status = None;
        let mut signal = None;

        // exit-status may arrive after EOF, so drain until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    output.on_output(OutputStream::Stdout, &data).await;
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext == 1 {
                        output.on_output(OutputStream::Stderr, &data).await;
                    }
                }
                ChannelMsg::ExitStatus {
                    exit_status: status,
                } => {
                    exit_status = Some(status);
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    signal = Some(format!("{signal_name:?}"));
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        debug!(
            command = %cmd,
            status = ?exit_status,
            duration = ?start.elapsed(),
            "remote command completed"
        );

        match (exit_status, signal) {
            (Some(status), _) => Ok(status),
            (None, Some(signal)) => Err(ExecError::Signaled { signal }),
            (None, None) => Err(ExecError::MissingExitStatus),
        }
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        if let Some(handle) = self.handle.take() {
            handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(endpoint = %self.endpoint, "SSH disconnected");
        }
        Ok(())
    }
}

/// Dials targets over plain TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct SshDialer;

#[async_trait]
impl Dialer for SshDialer {
    async fn dial(&self, target: &ConnectionSpec) -> Result<Box<dyn RemoteSession>, ExecError> {
        let handle = connect_direct(target).await?;
        Ok(Box::new(SshSession::new(target.endpoint(), handle)))
    }

    fn route(&self) -> String {
        "direct".to_string()
    }
}

/// russh-backed `Connector`
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    fn direct(&self) -> Arc<dyn Dialer> {
        Arc::new(SshDialer)
    }

    async fn jump(&self, proxy: &ConnectionSpec) -> Result<Arc<dyn Dialer>, ExecError> {
        let tunnel = ProxyTunnel::connect(proxy).await?;
        Ok(Arc::new(tunnel))
    }
}
