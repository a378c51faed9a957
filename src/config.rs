use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::core::orchestrator::DEFAULT_CONCURRENCY_LIMIT;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "pullsync.toml";
pub const ENV_PREFIX: &str = "PULLSYNC_";

/// Longest expiry S3 accepts for a SigV4 presigned URL (7 days).
const MAX_URL_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// A credential that must never show up in logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Object store region
    pub region: String,
    pub bucket: String,
    /// Logical folder to copy; listed as `{prefix}/`
    pub prefix: String,
    pub url_expiry_secs: u64,
    pub dropbox_token: Secret,
    /// Parent path for the per-run folder. Empty means the destination root.
    pub destination_root: String,
    pub concurrency_limit: usize,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    /// Upper bound on any single destination API call
    pub request_timeout_secs: u64,
    pub simulation: bool,
    pub verbose: bool,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            bucket: String::new(),
            prefix: String::new(),
            url_expiry_secs: 3600,
            dropbox_token: Secret::default(),
            destination_root: String::new(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            poll_interval_ms: 2000,
            max_polls: 1800,
            request_timeout_secs: 30,
            simulation: false,
            verbose: false,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Load the layered configuration: defaults, TOML file, `PULLSYNC_*`
    /// environment, then CLI overrides, and validate the result.
    ///
    /// `config_path` must exist when given explicitly; the default
    /// `pullsync.toml` is optional.
    pub fn new<T: Serialize>(
        config_path: Option<&Path>,
        overrides: Option<&T>,
    ) -> Result<Self, ConfigError> {
        let config = Self::load(config_path, overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Same layering as [`AppConfig::new`] without validation.
    pub fn load<T: Serialize>(
        config_path: Option<&Path>,
        overrides: Option<&T>,
    ) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::Invalid(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            Some(path) => path.to_path_buf(),
            None => Path::new(DEFAULT_CONFIG_FILE).to_path_buf(),
        };

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        Ok(figment.extract()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.simulation {
            if self.bucket.is_empty() {
                return Err(invalid("bucket is required"));
            }
            if self.prefix.is_empty() {
                return Err(invalid("prefix is required"));
            }
            if self.dropbox_token.is_empty() {
                return Err(invalid("dropbox_token is required"));
            }
        }
        if !self.prefix.is_empty() && self.prefix.trim_matches('/').is_empty() {
            return Err(invalid("prefix must name a folder, not the bucket root"));
        }
        if self.concurrency_limit == 0 {
            return Err(invalid("concurrency_limit must be at least 1"));
        }
        if self.max_polls == 0 {
            return Err(invalid("max_polls must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs must be at least 1"));
        }
        if self.url_expiry_secs == 0 || self.url_expiry_secs > MAX_URL_EXPIRY_SECS {
            return Err(ConfigError::Invalid(format!(
                "url_expiry_secs must be between 1 and {}, got {}",
                MAX_URL_EXPIRY_SECS, self.url_expiry_secs
            )));
        }
        if !self.destination_root.is_empty() && !self.destination_root.starts_with('/') {
            return Err(invalid("destination_root must start with '/'"));
        }
        Ok(())
    }

    pub fn url_expiry(&self) -> Duration {
        Duration::from_secs(self.url_expiry_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Render the effective configuration as TOML with the token masked.
    pub fn to_redacted_toml(&self) -> Result<String, toml::ser::Error> {
        let mut shown = self.clone();
        if !shown.dropbox_token.is_empty() {
            shown.dropbox_token = Secret::new("***");
        }
        toml::to_string_pretty(&shown)
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
