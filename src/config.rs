//! Configuration management for Zeus.
//!
//! Handles loading configuration from a TOML file, with environment variables
//! filling in whatever the file leaves unset.

use crate::error::{Result, ZeusError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_WORKGROUP: &str = "primary";

/// Main configuration structure for Zeus.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub athena: AthenaConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port. Unset means `PORT`, then 8080.
    pub port: Option<u16>,

    /// Origins allowed to call the API from a browser.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// `host:port` to bind to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

/// Execution service and result storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AthenaConfig {
    pub region: Option<String>,

    /// Bucket the execution service writes results to.
    pub results_bucket: Option<String>,

    /// Key prefix inside the results bucket.
    #[serde(default)]
    pub results_prefix: String,

    pub workgroup: Option<String>,
}

impl AthenaConfig {
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn workgroup(&self) -> &str {
        self.workgroup.as_deref().unwrap_or(DEFAULT_WORKGROUP)
    }

    /// Builds `s3://bucket/prefix/`, the location results are written under.
    pub fn output_location(&self) -> Result<String> {
        let bucket = self
            .results_bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                ZeusError::config(
                    "No results bucket configured. Set athena.results_bucket or ATHENA_RESULTS_BUCKET",
                )
            })?;

        let prefix = self.results_prefix.trim_matches('/');
        let location = if prefix.is_empty() {
            format!("s3://{bucket}/")
        } else {
            format!("s3://{bucket}/{prefix}/")
        };

        let url = Url::parse(&location)
            .map_err(|e| ZeusError::config(format!("Invalid results location '{location}': {e}")))?;
        if url.host_str().is_none() {
            return Err(ZeusError::config(format!(
                "Invalid results bucket '{bucket}'"
            )));
        }

        Ok(location)
    }

    fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.region.is_none() {
            self.region = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION"));
        }
        if self.results_bucket.is_none() {
            self.results_bucket = lookup("ATHENA_RESULTS_BUCKET");
        }
        if self.workgroup.is_none() {
            self.workgroup = lookup("ATHENA_WORKGROUP");
        }
    }
}

/// Run ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    /// SQLite file path. Unset means the platform data directory.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("zeus")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ZeusError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ZeusError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Fills unset values from the process environment.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.server.port.is_none() {
            self.server.port = lookup("PORT").and_then(|p| p.parse().ok());
        }
        self.athena.apply_defaults_from(&lookup);
        if self.ledger.path.is_none() {
            self.ledger.path = lookup("ZEUS_LEDGER_PATH").map(PathBuf::from);
        }
    }
}
