//! TOML configuration with environment overrides.
//!
//! Every field has a default, so the service runs without a config file.
//! Environment variables are applied after the file is parsed:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `GCS_BUCKET_NAME` | `storage.bucket` |
//! | `GOOGLE_APPLICATION_CREDENTIALS` | `storage.credentials_path` |
//! | `CURRICULUM_BIND` | `server.bind` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::grade::Grade;

pub const DEFAULT_BUCKET: &str = "thoth-concepts";

pub const BUCKET_ENV: &str = "GCS_BUCKET_NAME";
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const BIND_ENV: &str = "CURRICULUM_BIND";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Key prefix under which grade directories live.
    #[serde(default = "default_root_prefix")]
    pub root_prefix: String,
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            root_prefix: default_root_prefix(),
            endpoint_url: default_endpoint_url(),
            credentials_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}
fn default_root_prefix() -> String {
    "concepts/content".to_string()
}
fn default_endpoint_url() -> String {
    "https://storage.googleapis.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

/// What to serve for a grade that has no bundled fallback file.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnbundledPolicy {
    /// Serve `fallback.default_grade`'s file and log a warning.
    Default,
    /// Answer with not-found.
    Reject,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_fallback_grade")]
    pub default_grade: String,
    #[serde(default = "default_unbundled")]
    pub unbundled: UnbundledPolicy,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            dir: default_fallback_dir(),
            default_grade: default_fallback_grade(),
            unbundled: default_unbundled(),
        }
    }
}

impl FallbackConfig {
    /// The validated default grade. [`load_config`] guarantees this parses.
    pub fn default_grade(&self) -> Option<Grade> {
        Grade::from_code(&self.default_grade)
    }
}

fn default_fallback_dir() -> PathBuf {
    PathBuf::from("data/fallback")
}
fn default_fallback_grade() -> String {
    "P5".to_string()
}
fn default_unbundled() -> UnbundledPolicy {
    UnbundledPolicy::Default
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Load configuration from an optional TOML file, then apply environment
/// overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(bucket) = non_empty(BUCKET_ENV) {
        config.storage.bucket = bucket;
    }
    if let Some(path) = non_empty(CREDENTIALS_ENV) {
        config.storage.credentials_path = Some(PathBuf::from(path));
    }
    if let Some(bind) = non_empty(BIND_ENV) {
        config.server.bind = bind;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.storage.bucket.trim().is_empty() {
        bail!("storage.bucket must not be empty");
    }
    if config.storage.timeout_secs == 0 {
        bail!("storage.timeout_secs must be > 0");
    }
    if config.fallback.default_grade().is_none() {
        bail!(
            "fallback.default_grade '{}' is not a grade code (expected e.g. P5, G10, KG1)",
            config.fallback.default_grade
        );
    }
    Ok(())
}
