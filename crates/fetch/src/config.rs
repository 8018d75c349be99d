use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and how pulls are fetched.
///
/// `method` stays a string so a bad value fails the request that uses
/// it instead of the whole service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_method")]
    pub method: String,
    /// Falls back to `$LOGNAME`, then `anonymous`.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub mount_remap: Option<MountRemap>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub tools: ToolPaths,
}

/// Rewrites a remote path prefix to where the same tree is mounted
/// locally, for `copy` pulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRemap {
    pub remote_prefix: PathBuf,
    pub local_prefix: PathBuf,
}

/// `lftp` network retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_max_secs: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_base_secs: u32,
}

/// Programs run for each method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    #[serde(default = "default_cp")]
    pub cp: PathBuf,
    #[serde(default = "default_scp")]
    pub scp: PathBuf,
    #[serde(default = "default_lftp")]
    pub lftp: PathBuf,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_method() -> String {
    "ftps".into()
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_secs() -> u32 {
    2
}

fn default_cp() -> PathBuf {
    PathBuf::from("cp")
}

fn default_scp() -> PathBuf {
    PathBuf::from("scp")
}

fn default_lftp() -> PathBuf {
    PathBuf::from("lftp")
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            method: default_method(),
            username: None,
            password: None,
            mount_remap: None,
            retry: RetryPolicy::default(),
            tools: ToolPaths::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_max_secs: default_backoff_secs(),
            backoff_base_secs: default_backoff_secs(),
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            cp: default_cp(),
            scp: default_scp(),
            lftp: default_lftp(),
        }
    }
}

/// Returns the login name for pulls.
pub fn resolve_username(configured: Option<&str>) -> String {
    configured
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var("LOGNAME").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "anonymous".into())
}
