use serde::{Deserialize, Serialize};

/// Sender-supplied facts about a file.
///
/// Both fields are optional; a sink fills in `checksum` itself when it
/// verifies a file the sender did not checksum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Expected file size in bytes.
    #[serde(default, alias = "filesize", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Expected hex digest of the whole file.
    #[serde(default, alias = "md5sum", skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// How a file reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Push,
    Pull,
}

impl TransferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_accepts_legacy_keys() {
        let json = r#"{"filesize": 768, "md5sum": "abc123"}"#;
        let meta: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.size, Some(768));
        assert_eq!(meta.checksum.as_deref(), Some("abc123"));
    }

    #[test]
    fn metadata_defaults_when_empty() {
        let meta: FileMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(meta, FileMetadata::default());
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn transfer_kind_lowercase() {
        assert_eq!(serde_json::to_string(&TransferKind::Pull).unwrap(), "\"pull\"");
        assert_eq!(TransferKind::Push.to_string(), "push");
    }
}
