//! Configuration loading and merging
//!
//! Sources, highest priority first: command-line flags (and their primary
//! environment variables), fallback environment variables, the TOML file,
//! built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::WrapErr;
use serde::Deserialize;
use sshfan_core::{Credentials, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_USER, ProxyConfig, RunConfig};

use crate::cli::{Cli, fallback, parse_duration};

/// `sshfan.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub hosts: Vec<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
    pub key_path: Option<PathBuf>,
    /// Connection timeout, e.g. `"30s"`
    pub timeout: Option<String>,
    pub command_timeout: Option<String>,
    #[serde(default)]
    pub script: Vec<String>,
    pub script_stop: Option<bool>,
    pub sync: Option<bool>,
    pub abort_on_host_failure: Option<bool>,
    pub strict_auth: Option<bool>,
    #[serde(default)]
    pub envs: Vec<String>,
    pub debug: Option<bool>,
    pub proxy: Option<FileProxyConfig>,
}

/// `[proxy]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileProxyConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
    pub key_path: Option<PathBuf>,
    pub timeout: Option<String>,
}

impl FileConfig {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load from `explicit`, else the first default path that exists
    ///
    /// An explicit path that does not exist is an error; missing default
    /// files are not.
    pub fn discover(explicit: Option<&Path>) -> eyre::Result<Option<Self>> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }

        let paths = [
            Some(PathBuf::from("sshfan.toml")),
            dirs::config_dir().map(|p| p.join("sshfan/sshfan.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config file");
                return Self::load(&path).map(Some);
            }
        }

        tracing::debug!("no config file found");
        Ok(None)
    }
}

/// Environment lookup, injectable for tests
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;

    /// First non-empty value among `names`
    fn first(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|v| !v.trim().is_empty())
    }
}

/// The real process environment
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_duration(env: &dyn EnvSource, names: &[&str]) -> eyre::Result<Option<Duration>> {
    env.first(names)
        .map(|raw| parse_duration(&raw).map_err(|e| eyre::eyre!(e)))
        .transpose()
}

fn env_port(env: &dyn EnvSource, names: &[&str]) -> eyre::Result<Option<u16>> {
    env.first(names)
        .map(|raw| {
            raw.trim()
                .parse::<u16>()
                .wrap_err_with(|| format!("invalid port {raw:?}"))
        })
        .transpose()
}

fn file_duration(raw: Option<&str>, field: &str) -> eyre::Result<Option<Duration>> {
    raw.map(|raw| parse_duration(raw).map_err(|e| eyre::eyre!("{field}: {e}")))
        .transpose()
}

fn env_bool(env: &dyn EnvSource, names: &[&str]) -> bool {
    env.first(names).is_some_and(|v| parse_flag(&v))
}

fn non_empty_or<T>(primary: Vec<T>, secondary: impl FnOnce() -> Vec<T>) -> Vec<T> {
    if primary.is_empty() { secondary() } else { primary }
}

/// Build the run config from every source
///
/// # Errors
/// Returns error for unparsable durations or ports in the environment or file
pub fn merge(cli: &Cli, file: Option<FileConfig>, env: &dyn EnvSource) -> eyre::Result<RunConfig> {
    let file = file.unwrap_or_default();

    let hosts = non_empty_or(cli.hosts.clone(), || {
        env.first(fallback::HOST)
            .map(|v| split_list(&v))
            .unwrap_or_else(|| file.hosts.clone())
    });

    let mut script = non_empty_or(cli.script.clone(), || {
        env.first(fallback::SCRIPT)
            .map(|v| split_list(&v))
            .unwrap_or_else(|| file.script.clone())
    });
    if let Some(extra) = cli.script_string.as_ref().filter(|s| !s.trim().is_empty()) {
        script.push(extra.clone());
    }

    let envs = non_empty_or(cli.envs.clone(), || {
        env.first(fallback::ENVS)
            .map(|v| split_list(&v))
            .unwrap_or_else(|| file.envs.clone())
    });

    let credentials = Credentials {
        user: cli
            .user
            .clone()
            .or_else(|| env.first(fallback::USER))
            .or_else(|| file.user.clone())
            .unwrap_or_else(|| DEFAULT_USER.to_string()),
        password: cli
            .password
            .clone()
            .or_else(|| env.first(fallback::PASSWORD))
            .or_else(|| file.password.clone()),
        key: cli
            .key
            .clone()
            .or_else(|| env.first(fallback::KEY))
            .or_else(|| file.key.clone()),
        key_path: cli
            .key_path
            .clone()
            .or_else(|| env.first(fallback::KEY_PATH).map(PathBuf::from))
            .or_else(|| file.key_path.clone()),
    };

    let port = match cli.port {
        Some(port) => Some(port),
        None => env_port(env, fallback::PORT)?.or(file.port),
    };

    let connect_timeout = match cli.timeout {
        Some(t) => t,
        None => env_duration(env, fallback::TIMEOUT)?
            .or(file_duration(file.timeout.as_deref(), "timeout")?)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
    };

    let command_timeout = match cli.command_timeout {
        Some(t) => t,
        None => env_duration(env, fallback::COMMAND_TIMEOUT)?
            .or(file_duration(file.command_timeout.as_deref(), "command_timeout")?)
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
    };

    let proxy = merge_proxy(cli, file.proxy.unwrap_or_default(), env)?;

    Ok(RunConfig {
        credentials,
        hosts,
        port,
        connect_timeout,
        command_timeout,
        script,
        stop_on_failure: cli.script_stop
            || env_bool(env, fallback::SCRIPT_STOP)
            || file.script_stop.unwrap_or(false),
        sync: cli.sync || env_bool(env, fallback::SYNC) || file.sync.unwrap_or(false),
        abort_on_host_failure: cli.abort_on_host_failure
            || file.abort_on_host_failure.unwrap_or(false),
        strict_auth: cli.strict_auth || file.strict_auth.unwrap_or(false),
        envs,
        debug: cli.debug || env_bool(env, fallback::DEBUG) || file.debug.unwrap_or(false),
        proxy,
    })
}

fn merge_proxy(
    cli: &Cli,
    file: FileProxyConfig,
    env: &dyn EnvSource,
) -> eyre::Result<Option<ProxyConfig>> {
    let Some(host) = cli
        .proxy_host
        .clone()
        .or_else(|| env.first(fallback::PROXY_HOST))
        .or(file.host)
        .filter(|h| !h.trim().is_empty())
    else {
        return Ok(None);
    };

    let port = match cli.proxy_port {
        Some(port) => Some(port),
        None => env_port(env, fallback::PROXY_PORT)?.or(file.port),
    };

    let timeout = match cli.proxy_timeout {
        Some(t) => Some(t),
        None => env_duration(env, fallback::PROXY_TIMEOUT)?
            .or(file_duration(file.timeout.as_deref(), "proxy.timeout")?),
    };

    Ok(Some(ProxyConfig {
        host,
        port,
        credentials: Credentials {
            user: cli
                .proxy_user
                .clone()
                .or_else(|| env.first(fallback::PROXY_USER))
                .or(file.user)
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: cli
                .proxy_password
                .clone()
                .or_else(|| env.first(fallback::PROXY_PASSWORD))
                .or(file.password),
            key: cli
                .proxy_key
                .clone()
                .or_else(|| env.first(fallback::PROXY_KEY))
                .or(file.key),
            key_path: cli
                .proxy_key_path
                .clone()
                .or_else(|| env.first(fallback::PROXY_KEY_PATH).map(PathBuf::from))
                .or(file.key_path),
        },
        timeout,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[derive(Default)]
    struct FakeEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for FakeEnv {
        fn get(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|v| (*v).to_string())
        }
    }

    fn env(pairs: &[(&'static str, &'static str)]) -> FakeEnv {
        FakeEnv(pairs.iter().copied().collect())
    }

    const SAMPLE: &str = r#"
hosts = ["web1", "web2:2222"]
user = "deploy"
key_path = "/home/deploy/.ssh/id_ed25519"
timeout = "10s"
command_timeout = "2m"
script = ["cd /srv/app", "git pull"]
script_stop = true
sync = true
envs = ["RELEASE=42"]

[proxy]
host = "bastion.internal"
port = 2200
user = "jump"
password = "hunter2"
"#;

    #[test]
    fn test_file_config_parses() {
        let file: FileConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(file.hosts, vec!["web1", "web2:2222"]);
        assert_eq!(file.timeout.as_deref(), Some("10s"));
        assert_eq!(file.proxy.as_ref().unwrap().port, Some(2200));
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("hostz = [\"a\"]").is_err());
    }

    #[test]
    fn test_file_values_used_when_cli_silent() {
        let file: FileConfig = toml::from_str(SAMPLE).unwrap();
        let config = merge(&Cli::default(), Some(file), &FakeEnv::default()).unwrap();

        assert_eq!(config.hosts, vec!["web1", "web2:2222"]);
        assert_eq!(config.credentials.user, "deploy");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_secs(120));
        assert!(config.stop_on_failure);
        assert!(config.sync);
        assert_eq!(config.envs, vec!["RELEASE=42"]);

        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.host, "bastion.internal");
        assert_eq!(proxy.port, Some(2200));
        assert_eq!(proxy.credentials.user, "jump");
        assert_eq!(proxy.timeout, None);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: FileConfig = toml::from_str(SAMPLE).unwrap();
        let cli = Cli {
            hosts: vec!["db1".into()],
            user: Some("admin".into()),
            timeout: Some(Duration::from_secs(3)),
            script: vec!["uptime".into()],
            script_string: Some("echo one\necho two".into()),
            ..Cli::default()
        };

        let config = merge(&cli, Some(file), &FakeEnv::default()).unwrap();
        assert_eq!(config.hosts, vec!["db1"]);
        assert_eq!(config.credentials.user, "admin");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.script, vec!["uptime", "echo one\necho two"]);
        // file key_path still applies
        assert!(config.credentials.key_path.is_some());
    }

    #[test]
    fn test_defaults_applied_last() {
        let config = merge(&Cli::default(), None, &FakeEnv::default()).unwrap();
        assert_eq!(config.credentials.user, "root");
        assert_eq!(config.port, None);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert!(config.proxy.is_none());
        assert!(!config.sync);
    }

    #[test]
    fn test_fallback_environment_names() {
        let env = env(&[
            ("SSH_HOST", "a, b"),
            ("INPUT_USERNAME", "ci"),
            ("SSH_PASSWORD", "pw"),
            ("SSH_PORT", "2022"),
            ("SSH_COMMAND_TIMEOUT", "90s"),
            ("INPUT_SYNC", "true"),
            ("INPUT_SCRIPT_STOP", "false"),
            ("PROXY_SSH_HOST", "jump"),
            ("INPUT_PROXY_TIMEOUT", "5s"),
        ]);
        let file: FileConfig = toml::from_str(SAMPLE).unwrap();

        let config = merge(&Cli::default(), Some(file), &env).unwrap();
        assert_eq!(config.hosts, vec!["a", "b"]);
        assert_eq!(config.credentials.user, "ci");
        assert_eq!(config.credentials.password.as_deref(), Some("pw"));
        assert_eq!(config.port, Some(2022));
        assert_eq!(config.command_timeout, Duration::from_secs(90));
        assert!(config.sync);
        // file still turns it on; env "false" only means "not set here"
        assert!(config.stop_on_failure);

        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.host, "jump");
        assert_eq!(proxy.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_script_lists_split_only_from_environment() {
        let env = env(&[
            ("PLUGIN_SCRIPT", "cd /srv, make deploy"),
            ("PLUGIN_ENVS", "A=1,B"),
        ]);

        let from_env = merge(&Cli::default(), None, &env).unwrap();
        assert_eq!(from_env.script, vec!["cd /srv", "make deploy"]);
        assert_eq!(from_env.envs, vec!["A=1", "B"]);

        let cli = Cli {
            script: vec!["echo a,b".into()],
            envs: vec!["LIST=x,y".into()],
            ..Cli::default()
        };
        let from_flags = merge(&cli, None, &env).unwrap();
        assert_eq!(from_flags.script, vec!["echo a,b"]);
        assert_eq!(from_flags.envs, vec!["LIST=x,y"]);
    }

    #[test]
    fn test_bare_variable_names_are_not_read() {
        let env = env(&[
            ("HOST", "workstation"),
            ("USERNAME", "alice"),
            ("PORT", "8080"),
            ("DEBUG", "1"),
        ]);

        let config = merge(&Cli::default(), None, &env).unwrap();
        assert!(config.hosts.is_empty());
        assert_eq!(config.credentials.user, "root");
        assert_eq!(config.port, None);
        assert!(!config.debug);
    }

    #[test]
    fn test_invalid_environment_values_are_errors() {
        let bad_port = env(&[("SSH_PORT", "ssh")]);
        assert!(merge(&Cli::default(), None, &bad_port).is_err());

        let bad_timeout = env(&[("SSH_TIMEOUT", "soon")]);
        assert!(merge(&Cli::default(), None, &bad_timeout).is_err());
    }

    #[test]
    fn test_blank_script_string_ignored() {
        let cli = Cli {
            script: vec!["ls".into()],
            script_string: Some("   ".into()),
            ..Cli::default()
        };
        let config = merge(&cli, None, &FakeEnv::default()).unwrap();
        assert_eq!(config.script, vec!["ls"]);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let loaded = FileConfig::discover(Some(file.path())).unwrap().unwrap();
        assert_eq!(loaded.user.as_deref(), Some("deploy"));

        let missing = file.path().with_extension("missing");
        assert!(FileConfig::discover(Some(&missing)).is_err());
    }
}
