//! Resolved connection descriptor for one SSH endpoint

use crate::auth::AuthMethod;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Everything needed to dial and authenticate against one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    /// Host address (name or IP, without brackets)
    pub host: String,
    /// Port (default 22)
    pub port: u16,
    /// Username
    pub user: String,
    /// Selected authentication mechanism
    pub auth: AuthMethod,
}

impl ConnectionSpec {
    /// Create a new connection spec on the default port
    pub fn new(host: impl Into<String>, user: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            auth,
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port`, bracketing IPv6 literals
    #[must_use]
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
