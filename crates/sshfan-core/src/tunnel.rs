//! Shared route to the targets: direct, or through one jump host

use std::sync::Arc;
use std::time::Duration;

use sshfan_exec::{ConnectionSpec, Connector, Dialer};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::error::CoreError;

/// Lazily establishes the single dialer every session of a run shares
pub struct TunnelProvider {
    connector: Arc<dyn Connector>,
    proxy: Option<ConnectionSpec>,
    timeout: Duration,
    dialer: OnceCell<Arc<dyn Dialer>>,
}

impl TunnelProvider {
    /// `proxy = None` makes this a pass-through to direct dialing
    pub fn new(
        connector: Arc<dyn Connector>,
        proxy: Option<ConnectionSpec>,
        timeout: Duration,
    ) -> Self {
        Self {
            connector,
            proxy,
            timeout,
            dialer: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn is_tunneled(&self) -> bool {
        self.proxy.is_some()
    }

    /// The shared dialer, connecting to the proxy on first call
    ///
    /// # Errors
    /// Returns `CoreError::ProxyConnection` if the jump host cannot be reached
    /// within the timeout or rejects the credentials
    pub async fn dialer(&self) -> Result<Arc<dyn Dialer>, CoreError> {
        let dialer = self
            .dialer
            .get_or_try_init(|| async {
                let Some(proxy) = &self.proxy else {
                    return Ok(self.connector.direct());
                };

                info!(proxy = %proxy.endpoint(), timeout = ?self.timeout, "establishing jump host");

                match timeout(self.timeout, self.connector.jump(proxy)).await {
                    Ok(Ok(dialer)) => Ok(dialer),
                    Ok(Err(e)) => {
                        error!(proxy = %proxy.endpoint(), error = %e, "jump host unavailable");
                        Err(CoreError::ProxyConnection(format!("{}: {e}", proxy.endpoint())))
                    }
                    Err(_) => {
                        error!(proxy = %proxy.endpoint(), timeout = ?self.timeout, "jump host timed out");
                        Err(CoreError::ProxyConnection(format!(
                            "{}: timed out after {:?}",
                            proxy.endpoint(),
                            self.timeout
                        )))
                    }
                }
            })
            .await?;

        Ok(Arc::clone(dialer))
    }

    /// Disconnect the jump host if one was established
    pub async fn shutdown(&self) {
        if let Some(dialer) = self.dialer.get()
            && let Err(e) = dialer.shutdown().await
        {
            warn!(route = %dialer.route(), error = %e, "failed to close tunnel");
        }
    }
}
