//! Connection spec resolution
//!
//! Pure functions turning a host entry plus shared credentials into a
//! `ConnectionSpec`. No I/O happens here; key files are only read at dial time.

use sshfan_exec::target::DEFAULT_PORT;
use sshfan_exec::{AuthMethod, ConnectionSpec};

use crate::config::{Credentials, DEFAULT_USER, ProxyConfig, RunConfig};
use crate::error::CoreError;

/// Split `host`, `host:port`, `[v6]` or `[v6]:port`
///
/// A bare IPv6 literal (more than one colon, no brackets) is taken whole.
///
/// # Errors
/// Returns `CoreError::Configuration` for an empty host or an invalid port
pub fn split_host_port(entry: &str) -> Result<(String, Option<u16>), CoreError> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Err(CoreError::Configuration("empty host".into()));
    }

    if let Some(rest) = entry.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            CoreError::Configuration(format!("unterminated IPv6 literal in {entry:?}"))
        })?;
        let port = match tail {
            "" => None,
            tail => {
                let raw = tail.strip_prefix(':').ok_or_else(|| {
                    CoreError::Configuration(format!("unexpected text after address in {entry:?}"))
                })?;
                Some(parse_port(raw, entry)?)
            }
        };
        return non_empty(host, entry).map(|h| (h, port));
    }

    match entry.matches(':').count() {
        0 => Ok((entry.to_string(), None)),
        1 => {
            let (host, raw) = entry.split_once(':').unwrap_or((entry, ""));
            let port = parse_port(raw, entry)?;
            non_empty(host, entry).map(|h| (h, Some(port)))
        }
        _ => Ok((entry.to_string(), None)),
    }
}

fn parse_port(raw: &str, entry: &str) -> Result<u16, CoreError> {
    match raw.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(CoreError::Configuration(format!(
            "invalid port {raw:?} in host {entry:?}"
        ))),
    }
}

fn non_empty(host: &str, entry: &str) -> Result<String, CoreError> {
    if host.is_empty() {
        return Err(CoreError::Configuration(format!("missing address in {entry:?}")));
    }
    Ok(host.to_string())
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Pick the single auth mechanism: key material, then key path, then password
///
/// With `strict`, supplying more than one mechanism is rejected instead.
///
/// # Errors
/// Returns `CoreError::Configuration` if nothing usable is configured, or if
/// `strict` is set and the choice is ambiguous
pub fn resolve_auth(
    credentials: &Credentials,
    strict: bool,
    who: &str,
) -> Result<AuthMethod, CoreError> {
    let key = present(credentials.key.as_deref());
    let key_path = credentials
        .key_path
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty());
    let password = present(credentials.password.as_deref());

    if strict {
        let supplied = [key.is_some(), key_path.is_some(), password.is_some()]
            .into_iter()
            .filter(|s| *s)
            .count();
        if supplied > 1 {
            return Err(CoreError::Configuration(format!(
                "{who}: more than one of key, key path and password is set"
            )));
        }
    }

    if let Some(key) = key {
        Ok(AuthMethod::KeyMaterial(key.to_string()))
    } else if let Some(path) = key_path {
        Ok(AuthMethod::KeyPath(path.clone()))
    } else if let Some(password) = password {
        Ok(AuthMethod::Password(password.to_string()))
    } else {
        Err(CoreError::Configuration(format!(
            "{who}: no key, key path or password configured"
        )))
    }
}

fn user_or_default(credentials: &Credentials) -> String {
    let user = credentials.user.trim();
    if user.is_empty() {
        DEFAULT_USER.to_string()
    } else {
        user.to_string()
    }
}

/// Build the spec for one target host entry
///
/// Port: inline suffix, else `config.port`, else 22.
///
/// # Errors
/// Returns `CoreError::Configuration` for a malformed entry or missing credentials
pub fn resolve_target(entry: &str, config: &RunConfig) -> Result<ConnectionSpec, CoreError> {
    let (host, inline_port) = split_host_port(entry)?;
    let auth = resolve_auth(&config.credentials, config.strict_auth, &host)?;
    let port = inline_port.or(config.port).unwrap_or(DEFAULT_PORT);

    Ok(ConnectionSpec::new(host, user_or_default(&config.credentials), auth).with_port(port))
}

/// Build the spec for the jump host
///
/// # Errors
/// Returns `CoreError::Configuration` for a malformed host or missing credentials
pub fn resolve_proxy(proxy: &ProxyConfig, strict: bool) -> Result<ConnectionSpec, CoreError> {
    let (host, inline_port) = split_host_port(&proxy.host)?;
    let auth = resolve_auth(&proxy.credentials, strict, &format!("proxy {host}"))?;
    let port = inline_port.or(proxy.port).unwrap_or(DEFAULT_PORT);

    Ok(ConnectionSpec::new(host, user_or_default(&proxy.credentials), auth).with_port(port))
}
