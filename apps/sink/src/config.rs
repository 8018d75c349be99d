//! Sink configuration management.
//!
//! Configuration is stored as TOML, by default at
//! `~/.config/framesink/sink.toml`. A missing file is created with the
//! defaults on first start.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use framesink_fetch::PullConfig;
use framesink_ingest::IngestConfig;
use framesink_protocol::constants::{DEFAULT_DIRECTORY_PORT, DEFAULT_SINK_PORT, MAX_FRAME_LENGTH};
use framesink_registry::SinkIdentity;
use framesink_server::{PoolConfig, ServerConfig};
use framesink_transfer::{ChecksumAlgorithm, StoragePolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory delivered files are written under.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StoragePolicy,

    #[serde(default)]
    pub verify_checksum: bool,

    #[serde(default)]
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Regex over file identifiers; others are accepted and ignored.
    #[serde(default)]
    pub filter: Option<String>,

    /// Run for every delivered file. `{filepath}`, `{filetype}`,
    /// `{group}` and `{kind}` are substituted.
    #[serde(default)]
    pub notify_command: Option<String>,

    /// Push sessions idle this long are dropped (0 = never).
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub pull: PullConfig,

    #[serde(default)]
    pub registration: RegistrationSection,
}

/// `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// `[registration]` table.
///
/// Registration runs only when `key` or `key_file` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationSection {
    #[serde(default = "default_directory_host")]
    pub directory_host: String,

    #[serde(default = "default_directory_port")]
    pub directory_port: u16,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default)]
    pub passphrase: Option<String>,

    #[serde(default)]
    pub passphrase_file: Option<PathBuf>,

    /// `host:port` announced to the directory; detected when unset.
    #[serde(default)]
    pub advertise_address: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_idle_timeout() -> u64 {
    3600
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_SINK_PORT
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_directory_host() -> String {
    "localhost".into()
}

fn default_directory_port() -> u16 {
    DEFAULT_DIRECTORY_PORT
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StoragePolicy::default(),
            verify_checksum: false,
            checksum_algorithm: ChecksumAlgorithm::default(),
            filter: None,
            notify_command: None,
            session_idle_timeout_secs: default_idle_timeout(),
            server: ServerSection::default(),
            pull: PullConfig::default(),
            registration: RegistrationSection::default(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for RegistrationSection {
    fn default() -> Self {
        Self {
            directory_host: default_directory_host(),
            directory_port: default_directory_port(),
            interval_secs: default_interval_secs(),
            key: None,
            key_file: None,
            passphrase: None,
            passphrase_file: None,
            advertise_address: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or writes and returns the
    /// defaults if the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn ingest_config(&self) -> anyhow::Result<IngestConfig> {
        let filter = self
            .filter
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(Regex::new)
            .transpose()
            .context("invalid filter expression")?;

        let mut ingest = IngestConfig::new(&self.data_dir);
        ingest.storage = self.storage;
        ingest.verify_checksum = self.verify_checksum;
        ingest.checksum_algorithm = self.checksum_algorithm;
        ingest.filter = filter;
        ingest.pull = self.pull.clone();
        Ok(ingest)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.server.workers,
            poll_interval: Duration::from_millis(self.server.poll_interval_ms),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.server.bind,
            port: self.server.port,
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.session_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.session_idle_timeout_secs))
    }
}

impl RegistrationSection {
    /// Builds the sink identity, or `None` when no key is configured.
    pub fn identity(&self) -> anyhow::Result<Option<SinkIdentity>> {
        if self.key.is_none() && self.key_file.is_none() {
            return Ok(None);
        }

        let passphrase = match (&self.passphrase, &self.passphrase_file) {
            (Some(p), _) => p.clone(),
            (None, Some(file)) => std::fs::read_to_string(file)
                .with_context(|| format!("cannot read passphrase file {}", file.display()))?,
            (None, None) => anyhow::bail!("registration key is set but no passphrase is"),
        };

        let identity = match (&self.key, &self.key_file) {
            (Some(key), _) => SinkIdentity::from_key(key, &passphrase),
            (None, Some(file)) => SinkIdentity::from_key_file(file, &passphrase)
                .with_context(|| format!("cannot load key file {}", file.display()))?,
            (None, None) => return Ok(None),
        };
        Ok(Some(identity))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("framesink")
        .join("sink.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesink_registry::compute_credential;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.storage, StoragePolicy::Flat);
        assert!(!config.verify_checksum);
        assert_eq!(config.session_idle_timeout_secs, 3600);
        assert_eq!(config.server.port, 15003);
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.pull.method, "ftps");
        assert_eq!(config.registration.directory_port, 7075);
        assert_eq!(config.registration.interval_secs, 60);
    }

    #[test]
    fn config_partial_toml() {
        let toml_str = r#"
            data_dir = "/data/incoming"
            storage = "propid"
            verify_checksum = true
            checksum_algorithm = "sha256"

            [server]
            workers = 8

            [pull]
            method = "copy"

            [pull.mount_remap]
            remote_prefix = "/export/obs"
            local_prefix = "/mnt/obs"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data/incoming"));
        assert_eq!(config.storage, StoragePolicy::ByGroup);
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(config.server.workers, 8);
        assert_eq!(config.server.poll_interval_ms, 100);
        assert_eq!(config.pull.method, "copy");
        assert_eq!(config.pull.host, "localhost");
        let remap = config.pull.mount_remap.unwrap();
        assert_eq!(remap.local_prefix, PathBuf::from("/mnt/obs"));
    }

    #[test]
    fn missing_file_writes_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("sink.toml");

        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 15003);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.pull, config.pull);
    }

    #[test]
    fn invalid_toml_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sink.toml");
        std::fs::write(&path, "server = 12").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn ingest_config_compiles_filter() {
        let config = Config {
            filter: Some(r"\.fits$".into()),
            ..Config::default()
        };
        let ingest = config.ingest_config().unwrap();
        assert!(ingest.accepts("img0001.fits"));
        assert!(!ingest.accepts("img0001.log"));

        let bad = Config {
            filter: Some("(".into()),
            ..Config::default()
        };
        assert!(bad.ingest_config().is_err());
    }

    #[test]
    fn zero_idle_timeout_disables_eviction() {
        let config = Config {
            session_idle_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.idle_timeout().is_none());
        assert_eq!(
            Config::default().idle_timeout(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn no_key_means_no_registration() {
        assert!(RegistrationSection::default().identity().unwrap().is_none());
    }

    #[test]
    fn key_without_passphrase_is_error() {
        let section = RegistrationSection {
            key: Some("summit-3f9a".into()),
            ..RegistrationSection::default()
        };
        assert!(section.identity().is_err());
    }

    #[test]
    fn identity_from_key_and_passphrase_file() {
        let tmp = tempfile::tempdir().unwrap();
        let pass = tmp.path().join("pass");
        std::fs::write(&pass, "open sesame\n").unwrap();

        let section = RegistrationSection {
            key: Some("summit-3f9a".into()),
            passphrase_file: Some(pass),
            ..RegistrationSection::default()
        };
        let identity = section.identity().unwrap().unwrap();
        assert_eq!(identity.id, "summit");
        assert_eq!(
            identity.credential,
            compute_credential("summit-3f9a", "open sesame")
        );
    }
}
