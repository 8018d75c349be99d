use std::path::PathBuf;

use framesink_fetch::PullConfig;
use framesink_transfer::{ChecksumAlgorithm, StoragePolicy};
use regex::Regex;

/// Runtime settings of an [`IngestService`](crate::IngestService).
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    pub storage: StoragePolicy,
    pub verify_checksum: bool,
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Only identifiers matching this are stored; others are ignored.
    pub filter: Option<Regex>,
    pub pull: PullConfig,
}

impl IngestConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            storage: StoragePolicy::default(),
            verify_checksum: false,
            checksum_algorithm: ChecksumAlgorithm::default(),
            filter: None,
            pull: PullConfig::default(),
        }
    }

    /// Returns the algorithm to verify with, or `None` when disabled.
    pub fn verification(&self) -> Option<ChecksumAlgorithm> {
        self.verify_checksum.then_some(self.checksum_algorithm)
    }

    pub fn accepts(&self, id: &str) -> bool {
        self.filter.as_ref().is_none_or(|re| re.is_match(id))
    }
}
