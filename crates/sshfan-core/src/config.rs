//! Run configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// User used when none is configured
pub const DEFAULT_USER: &str = "root";
/// Dial + handshake + auth budget per host
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget for a single script line
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How hosts are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One host at a time, in declaration order
    Sequential,
    /// Every host at once, one task each
    #[default]
    Concurrent,
}

impl DispatchMode {
    /// `sync = true` means sequential
    #[must_use]
    pub fn from_sync_flag(sync: bool) -> Self {
        if sync {
            DispatchMode::Sequential
        } else {
            DispatchMode::Concurrent
        }
    }
}

/// Login credentials; blank strings count as absent
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// SSH user
    pub user: String,
    /// Password
    pub password: Option<String>,
    /// Private key contents (PEM or base64 of PEM)
    pub key: Option<String>,
    /// Path to a private key file
    pub key_path: Option<PathBuf>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            password: None,
            key: None,
            key_path: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .finish()
    }
}

/// Jump host settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy address, optionally with `:port`; empty disables tunneling
    pub host: String,
    /// Port when `host` carries none (default 22)
    pub port: Option<u16>,
    /// Proxy login
    pub credentials: Credentials,
    /// Dial timeout; falls back to the run's connect timeout
    pub timeout: Option<Duration>,
}

impl ProxyConfig {
    /// Whether a proxy host is actually set
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

/// Everything one run needs, fully defaulted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Target login, shared by every host
    pub credentials: Credentials,
    /// Targets, in declaration order
    pub hosts: Vec<String>,
    /// Port for hosts without an inline `:port` (default 22)
    pub port: Option<u16>,
    /// Per-host dial budget
    pub connect_timeout: Duration,
    /// Per-command budget
    pub command_timeout: Duration,
    /// Commands, run in order on every host
    pub script: Vec<String>,
    /// Skip the rest of a host's script after its first failure
    pub stop_on_failure: bool,
    /// Process hosts one at a time
    pub sync: bool,
    /// In sequential mode, skip remaining hosts after a host fails
    pub abort_on_host_failure: bool,
    /// Reject configs that supply more than one auth mechanism
    pub strict_auth: bool,
    /// `KEY=VALUE` assignments or bare names read from the local environment
    pub envs: Vec<String>,
    /// Echo each materialized command to the output
    pub debug: bool,
    /// Optional jump host
    pub proxy: Option<ProxyConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            hosts: Vec::new(),
            port: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            script: Vec::new(),
            stop_on_failure: false,
            sync: false,
            abort_on_host_failure: false,
            strict_auth: false,
            envs: Vec::new(),
            debug: false,
            proxy: None,
        }
    }
}

impl RunConfig {
    /// Scheduling derived from the `sync` flag
    #[must_use]
    pub fn dispatch_mode(&self) -> DispatchMode {
        DispatchMode::from_sync_flag(self.sync)
    }

    /// The proxy, only when a host is set
    #[must_use]
    pub fn enabled_proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref().filter(|p| p.is_enabled())
    }

    /// Dial timeout for the proxy hop
    #[must_use]
    pub fn proxy_timeout(&self) -> Duration {
        self.enabled_proxy()
            .and_then(|p| p.timeout)
            .unwrap_or(self.connect_timeout)
    }

    /// Check the structural requirements of a run
    ///
    /// # Errors
    /// Returns `CoreError::Configuration` for an empty host list, an empty
    /// script, a blank host entry or a zero timeout
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.hosts.is_empty() {
            return Err(CoreError::Configuration("no target hosts configured".into()));
        }
        if let Some(pos) = self.hosts.iter().position(|h| h.trim().is_empty()) {
            return Err(CoreError::Configuration(format!(
                "host entry {pos} is empty"
            )));
        }
        if self.script.is_empty() {
            return Err(CoreError::Configuration("script is empty".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(CoreError::Configuration(
                "connection timeout must be greater than zero".into(),
            ));
        }
        if self.command_timeout.is_zero() {
            return Err(CoreError::Configuration(
                "command timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            hosts: vec!["h1".into()],
            script: vec!["echo hi".into()],
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.credentials.user, "root");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(30));
        assert_eq!(cfg.command_timeout, Duration::from_secs(600));
        assert_eq!(cfg.dispatch_mode(), DispatchMode::Concurrent);
    }

    #[test]
    fn test_sync_flag_means_sequential() {
        let cfg = RunConfig {
            sync: true,
            ..config()
        };
        assert_eq!(cfg.dispatch_mode(), DispatchMode::Sequential);
    }

    #[test]
    fn test_validate_rejects_empty_hosts() {
        let cfg = RunConfig {
            hosts: vec![],
            ..config()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_blank_host_entry() {
        let cfg = RunConfig {
            hosts: vec!["h1".into(), "  ".into()],
            ..config()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("host entry 1"));
    }

    #[test]
    fn test_validate_rejects_empty_script() {
        let cfg = RunConfig {
            script: vec![],
            ..config()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let cfg = RunConfig {
            command_timeout: Duration::ZERO,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_blank_proxy_host_disables_tunnel() {
        let cfg = RunConfig {
            proxy: Some(ProxyConfig {
                host: " ".into(),
                ..ProxyConfig::default()
            }),
            ..config()
        };
        assert!(cfg.enabled_proxy().is_none());
    }

    #[test]
    fn test_proxy_timeout_falls_back_to_connect_timeout() {
        let mut cfg = RunConfig {
            connect_timeout: Duration::from_secs(5),
            proxy: Some(ProxyConfig {
                host: "bastion".into(),
                ..ProxyConfig::default()
            }),
            ..config()
        };
        assert_eq!(cfg.proxy_timeout(), Duration::from_secs(5));

        if let Some(proxy) = cfg.proxy.as_mut() {
            proxy.timeout = Some(Duration::from_secs(9));
        }
        assert_eq!(cfg.proxy_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials {
            password: Some("hunter2".into()),
            ..Credentials::default()
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
