use std::path::Path;

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::RegistryError;

type HmacSha1 = Hmac<Sha1>;

/// Name and proof a sink registers under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkIdentity {
    pub id: String,
    pub credential: String,
}

impl SinkIdentity {
    /// Identity for a key given inline; the id is the key text before
    /// its first `-`.
    pub fn from_key(key: &str, passphrase: &str) -> Self {
        let key = key.trim();
        Self {
            id: registration_id(key),
            credential: compute_credential(key, passphrase.trim()),
        }
    }

    /// Identity for a key stored in a file; the id is the file stem.
    pub fn from_key_file(path: &Path, passphrase: &str) -> Result<Self, RegistryError> {
        let key = std::fs::read_to_string(path)?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                RegistryError::Key(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no file name in {}", path.display()),
                ))
            })?;
        Ok(Self {
            id,
            credential: compute_credential(key.trim(), passphrase.trim()),
        })
    }
}

/// Hex HMAC-SHA1 of `passphrase` keyed by `key`.
pub fn compute_credential(key: &str, passphrase: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(passphrase.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Registration id derived from inline key text.
pub fn registration_id(key: &str) -> String {
    key.split('-').next().unwrap_or_default().to_string()
}
