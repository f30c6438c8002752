//! Environment propagation
//!
//! Servers commonly refuse protocol-level `env` requests, so assignments are
//! materialized as shell `export` lines prepended to every command.

use tracing::{debug, warn};

use crate::error::CoreError;

/// Export lines applied to every command of every host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvPrelude {
    exports: Vec<String>,
}

impl EnvPrelude {
    /// Build from config entries, reading bare names from this process's environment
    ///
    /// # Errors
    /// Returns `CoreError::Configuration` for an invalid variable name
    pub fn from_entries(entries: &[String]) -> Result<Self, CoreError> {
        Self::from_entries_with(entries, |name| std::env::var(name).ok())
    }

    /// Same as `from_entries` with an injectable lookup
    ///
    /// `KEY=VALUE` is exported as given. A bare `name` is upper-cased and
    /// looked up; unset names are skipped.
    ///
    /// # Errors
    /// Returns `CoreError::Configuration` for an invalid variable name
    pub fn from_entries_with<F>(entries: &[String], lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut exports = Vec::with_capacity(entries.len());

        for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            let (name, value) = match entry.split_once('=') {
                Some((name, value)) => (name.trim().to_string(), value.to_string()),
                None => {
                    let name = entry.to_uppercase();
                    match lookup(&name) {
                        Some(value) => (name, value),
                        None => {
                            warn!(name = %name, "environment variable not set locally, skipping");
                            continue;
                        }
                    }
                }
            };

            if !is_valid_name(&name) {
                return Err(CoreError::Configuration(format!(
                    "invalid environment variable name: {name:?}"
                )));
            }

            debug!(name = %name, "exporting environment variable");
            exports.push(format!("export {name}={}", shell_quote(&value)));
        }

        Ok(Self { exports })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    #[must_use]
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    /// The command as sent to the remote shell
    #[must_use]
    pub fn apply(&self, command: &str) -> String {
        if self.exports.is_empty() {
            return command.to_string();
        }
        let mut script = self.exports.join("\n");
        script.push('\n');
        script.push_str(command);
        script
    }
}

/// Single-quote `value` for POSIX shells
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
