//! Command-line flags
//!
//! Each flag reads its primary `PLUGIN_*` variable through clap. The older
//! `SSH_*` / `INPUT_*` spellings are consulted by `fallback` when neither the
//! flag nor the primary variable is set.
//!
//! `--script` and `--envs` values are taken whole. Only their environment
//! variable forms are comma-separated lists, so those live in `fallback`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Output format for the end-of-run report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Banner on success, per-host summary on failure
    #[default]
    Text,
    /// Full `RunResult` as JSON on stdout; host output moves to stderr
    Json,
}

#[derive(Debug, Default, Parser)]
#[command(name = "sshfan")]
#[command(version, about = "Run a shell script on many hosts over SSH", long_about = None)]
pub struct Cli {
    /// TOML config file
    #[arg(long, env = "SSHFAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Private key contents (PEM, or base64 of PEM)
    #[arg(long = "ssh-key", visible_alias = "key", env = "PLUGIN_SSH_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Private key path
    #[arg(long, short = 'i', env = "PLUGIN_KEY_PATH")]
    pub key_path: Option<PathBuf>,

    /// Connect as user [default: root]
    #[arg(long = "username", short = 'u', visible_alias = "user", env = "PLUGIN_USERNAME")]
    pub user: Option<String>,

    /// User password
    #[arg(long, short = 'P', env = "PLUGIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Target hosts, repeatable or comma-separated; `host:port` overrides --port
    #[arg(long = "host", short = 'H', env = "PLUGIN_HOST", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// SSH port [default: 22]
    #[arg(long, short = 'p', env = "PLUGIN_PORT")]
    pub port: Option<u16>,

    /// Run hosts one after another instead of concurrently
    #[arg(long, env = "PLUGIN_SYNC")]
    pub sync: bool,

    /// With --sync, skip remaining hosts after the first failed one
    #[arg(long, env = "PLUGIN_ABORT_ON_HOST_FAILURE")]
    pub abort_on_host_failure: bool,

    /// Connection timeout [default: 30s]
    #[arg(long, short = 't', env = "PLUGIN_TIMEOUT", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Per-command timeout [default: 10m]
    #[arg(
        long,
        short = 'T',
        alias = "command.timeout",
        env = "PLUGIN_COMMAND_TIMEOUT",
        value_parser = parse_duration
    )]
    pub command_timeout: Option<Duration>,

    /// Command to run, repeatable; each value is one command, commas included
    #[arg(long, short = 's')]
    pub script: Vec<String>,

    /// One more command, appended after --script (may span lines)
    #[arg(long, alias = "script.string", env = "INPUT_SCRIPT")]
    pub script_string: Option<String>,

    /// Stop a host's script at its first failing command
    #[arg(long, alias = "script.stop", env = "PLUGIN_SCRIPT_STOP")]
    pub script_stop: bool,

    /// Reject configs that set more than one of key, key path and password
    #[arg(long, env = "PLUGIN_STRICT_AUTH")]
    pub strict_auth: bool,

    /// Variable to export, repeatable: `NAME=value`, or a bare name read from this environment
    #[arg(long)]
    pub envs: Vec<String>,

    /// Echo commands and log at debug level
    #[arg(long, env = "PLUGIN_DEBUG")]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// End-of-run report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,

    /// Jump host
    #[arg(long, alias = "proxy.host", env = "PLUGIN_PROXY_HOST")]
    pub proxy_host: Option<String>,

    /// Jump host port [default: 22]
    #[arg(long, alias = "proxy.port", env = "PLUGIN_PROXY_PORT")]
    pub proxy_port: Option<u16>,

    /// Jump host user [default: root]
    #[arg(long = "proxy-username", alias = "proxy.username", env = "PLUGIN_PROXY_USERNAME")]
    pub proxy_user: Option<String>,

    /// Jump host password
    #[arg(long, alias = "proxy.password", env = "PLUGIN_PROXY_PASSWORD", hide_env_values = true)]
    pub proxy_password: Option<String>,

    /// Jump host private key contents
    #[arg(
        long = "proxy-ssh-key",
        alias = "proxy.ssh-key",
        env = "PLUGIN_PROXY_SSH_KEY",
        hide_env_values = true
    )]
    pub proxy_key: Option<String>,

    /// Jump host private key path
    #[arg(long, alias = "proxy.key-path", env = "PLUGIN_PROXY_KEY_PATH")]
    pub proxy_key_path: Option<PathBuf>,

    /// Jump host connection timeout [default: --timeout]
    #[arg(
        long,
        alias = "proxy.timeout",
        env = "PLUGIN_PROXY_TIMEOUT",
        value_parser = parse_duration
    )]
    pub proxy_timeout: Option<Duration>,
}

/// Secondary variable names, checked in order after the primary one
pub mod fallback {
    pub const KEY: &[&str] = &["PLUGIN_KEY", "SSH_KEY", "INPUT_KEY"];
    pub const KEY_PATH: &[&str] = &["SSH_KEY_PATH", "INPUT_KEY_PATH"];
    pub const USER: &[&str] = &["PLUGIN_USER", "SSH_USERNAME", "INPUT_USERNAME"];
    pub const PASSWORD: &[&str] = &["SSH_PASSWORD", "INPUT_PASSWORD"];
    pub const HOST: &[&str] = &["SSH_HOST", "INPUT_HOST"];
    pub const PORT: &[&str] = &["SSH_PORT", "INPUT_PORT"];
    pub const SYNC: &[&str] = &["INPUT_SYNC"];
    pub const TIMEOUT: &[&str] = &["SSH_TIMEOUT", "INPUT_TIMEOUT"];
    pub const COMMAND_TIMEOUT: &[&str] = &["SSH_COMMAND_TIMEOUT", "INPUT_COMMAND_TIMEOUT"];
    /// Comma-separated list
    pub const SCRIPT: &[&str] = &["PLUGIN_SCRIPT", "SSH_SCRIPT"];
    pub const SCRIPT_STOP: &[&str] = &["INPUT_SCRIPT_STOP"];
    /// Comma-separated list
    pub const ENVS: &[&str] = &["PLUGIN_ENVS", "INPUT_ENVS"];
    pub const DEBUG: &[&str] = &["INPUT_DEBUG"];
    pub const PROXY_HOST: &[&str] = &["PROXY_SSH_HOST", "INPUT_PROXY_HOST"];
    pub const PROXY_PORT: &[&str] = &["PROXY_SSH_PORT", "INPUT_PROXY_PORT"];
    pub const PROXY_USER: &[&str] = &["PLUGIN_PROXY_USER", "PROXY_SSH_USERNAME", "INPUT_PROXY_USERNAME"];
    pub const PROXY_PASSWORD: &[&str] = &["PROXY_SSH_PASSWORD", "INPUT_PROXY_PASSWORD"];
    pub const PROXY_KEY: &[&str] = &["PLUGIN_PROXY_KEY", "PROXY_SSH_KEY", "INPUT_PROXY_KEY"];
    pub const PROXY_KEY_PATH: &[&str] = &["PROXY_SSH_KEY_PATH", "INPUT_PROXY_KEY_PATH"];
    pub const PROXY_TIMEOUT: &[&str] = &["PROXY_SSH_TIMEOUT", "INPUT_PROXY_TIMEOUT"];
}

/// Parse `500ms`, `30s`, `10m`, `1h`, compounds like `1m30s`, or bare seconds
///
/// # Errors
/// Returns a message naming the offending input
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".into());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration {input:?}"))?;
        if digits == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let overflow = || format!("duration {input:?} is too large");
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(overflow)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(overflow)?),
            unit => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
        };
        total = total.checked_add(part).ok_or_else(overflow)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in [
            "",
            "s",
            "10x",
            "1.5s",
            "-3s",
            "10m5",
            "5124095576030432h",
            "307445734561825861m",
            "18446744073709551615s1s",
            "99999999999999999999s",
        ] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_flags_and_aliases() {
        let cli = Cli::try_parse_from([
            "sshfan",
            "-H",
            "a,b:2222",
            "--host",
            "c",
            "-u",
            "deploy",
            "-s",
            "uptime",
            "--script.stop",
            "--command.timeout",
            "1m",
            "--proxy.host",
            "bastion",
        ])
        .unwrap();

        assert_eq!(cli.hosts, vec!["a", "b:2222", "c"]);
        assert_eq!(cli.user.as_deref(), Some("deploy"));
        assert_eq!(cli.script, vec!["uptime"]);
        assert!(cli.script_stop);
        assert_eq!(cli.command_timeout, Some(Duration::from_secs(60)));
        assert_eq!(cli.proxy_host.as_deref(), Some("bastion"));
        assert_eq!(cli.report, ReportFormat::Text);
    }

    #[test]
    fn test_script_and_env_values_keep_commas() {
        let cli = Cli::try_parse_from([
            "sshfan",
            "-s",
            "awk -F, '{print $2}' data.csv",
            "-s",
            "echo {a,b}",
            "--envs",
            "HOSTS=a,b",
        ])
        .unwrap();

        assert_eq!(cli.script, vec!["awk -F, '{print $2}' data.csv", "echo {a,b}"]);
        assert_eq!(cli.envs, vec!["HOSTS=a,b"]);
    }

    #[test]
    fn test_report_format_flag() {
        let cli = Cli::try_parse_from(["sshfan", "--report", "json"]).unwrap();
        assert_eq!(cli.report, ReportFormat::Json);
        assert!(Cli::try_parse_from(["sshfan", "--report", "yaml"]).is_err());
    }
}
