//! SSH credential handling and private key loading

use std::fmt;
use std::path::{Path, PathBuf};

use russh::keys::ssh_key::PrivateKey;
use russh::keys::{decode_secret_key, load_secret_key};
use tracing::{debug, warn};

/// The single authentication mechanism selected for a connection
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Private key contents, either PEM/OpenSSH text or base64 of it
    KeyMaterial(String),
    /// Path to a private key file
    KeyPath(PathBuf),
    /// Password authentication
    Password(String),
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::KeyMaterial(_) => f.write_str("KeyMaterial(<redacted>)"),
            AuthMethod::KeyPath(path) => f.debug_tuple("KeyPath").field(path).finish(),
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

impl AuthMethod {
    /// Short label used in logs and error messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::KeyMaterial(_) => "key",
            AuthMethod::KeyPath(_) => "key-path",
            AuthMethod::Password(_) => "password",
        }
    }

    /// Load the private key for key-based methods
    ///
    /// Returns `Ok(None)` for password authentication.
    ///
    /// # Errors
    /// Returns `KeyError` if the key cannot be read, decoded or parsed
    pub fn load_private_key(&self) -> Result<Option<PrivateKey>, KeyError> {
        match self {
            AuthMethod::KeyMaterial(material) => decode_key_material(material).map(Some),
            AuthMethod::KeyPath(path) => read_key_file(path).map(Some),
            AuthMethod::Password(_) => Ok(None),
        }
    }
}

/// Key loading errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key material is neither PEM nor valid base64")]
    InvalidBase64,

    #[error("failed to parse private key: {0}")]
    Parse(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn decode_key_material(material: &str) -> Result<PrivateKey, KeyError> {
    let trimmed = material.trim();
    if trimmed.starts_with("-----BEGIN") {
        return decode_secret_key(trimmed, None).map_err(|e| KeyError::Parse(e.to_string()));
    }

    // not PEM: expect base64 of the whole key file
    let decoded = base64_decode(trimmed).map_err(|_| KeyError::InvalidBase64)?;
    let pem = String::from_utf8(decoded).map_err(|_| KeyError::InvalidBase64)?;
    debug!("decoded base64-wrapped key material");
    decode_secret_key(pem.trim(), None).map_err(|e| KeyError::Parse(e.to_string()))
}

fn read_key_file(path: &Path) -> Result<PrivateKey, KeyError> {
    if !path.exists() {
        return Err(KeyError::NotFound(path.display().to_string()));
    }
    check_key_permissions(path)?;
    load_secret_key(path, None).map_err(|e| KeyError::Parse(e.to_string()))
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    let compact: String = input.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}

#[cfg(unix)]
fn check_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group/other bits set
    if mode & 0o77 != 0 {
        warn!(
            path = %path.display(),
            mode = %format!("{:o}", mode & 0o777),
            "key file permissions are too open (should be 600)"
        );
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_key_permissions(_path: &Path) -> Result<(), KeyError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use base64::Engine;

    use super::*;

    const TEST_KEY: &str = include_str!("../tests/fixtures/test_ed25519");

    #[test]
    fn test_debug_redacts_secrets() {
        let password = format!("{:?}", AuthMethod::Password("hunter2".into()));
        let material = format!("{:?}", AuthMethod::KeyMaterial(TEST_KEY.into()));

        assert!(!password.contains("hunter2"));
        assert!(!material.contains("OPENSSH"));
        assert!(format!("{:?}", AuthMethod::KeyPath("/k".into())).contains("/k"));
    }

    #[test]
    fn test_password_has_no_private_key() {
        let auth = AuthMethod::Password("secret".into());
        assert!(auth.load_private_key().unwrap().is_none());
        assert_eq!(auth.kind(), "password");
    }

    #[test]
    fn test_decode_openssh_material() {
        let key = AuthMethod::KeyMaterial(TEST_KEY.into())
            .load_private_key()
            .unwrap();
        assert!(key.is_some());
    }

    #[test]
    fn test_decode_base64_wrapped_material() {
        let wrapped = base64::engine::general_purpose::STANDARD.encode(TEST_KEY);
        let key = AuthMethod::KeyMaterial(wrapped).load_private_key().unwrap();
        assert!(key.is_some());
    }

    #[test]
    fn test_garbage_material_rejected() {
        let result = AuthMethod::KeyMaterial("not a key!!".into()).load_private_key();
        assert!(matches!(result, Err(KeyError::InvalidBase64)));
    }

    #[test]
    fn test_missing_key_file() {
        let result = AuthMethod::KeyPath("/nonexistent/sshfan/id_ed25519".into()).load_private_key();
        assert!(matches!(result, Err(KeyError::NotFound(_))));
    }

    #[test]
    fn test_load_key_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_KEY.as_bytes()).unwrap();

        let key = AuthMethod::KeyPath(file.path().to_path_buf())
            .load_private_key()
            .unwrap();
        assert!(key.is_some());
    }
}
