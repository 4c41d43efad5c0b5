//! Configuration for the control plane connection.
//!
//! Stores configuration in JSON format at `~/.nodessh/config.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Pipeline endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://beta.banzaicloud.io/pipeline";

/// Configuration data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Pipeline API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token for the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Organization ID used when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<i32>,

    /// Cluster ID used when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<i32>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            organization: None,
            cluster: None,
        }
    }
}

impl Config {
    /// Returns the configuration with every `Some` value of `overrides` applied.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = endpoint;
        }
        if overrides.token.is_some() {
            self.token = overrides.token;
        }
        if overrides.organization.is_some() {
            self.organization = overrides.organization;
        }
        if overrides.cluster.is_some() {
            self.cluster = overrides.cluster;
        }
        self
    }

    /// Returns the organization ID or an error naming how to set it.
    pub fn require_organization(&self) -> Result<i32> {
        self.organization.ok_or_else(|| {
            Error::Config("no organization selected; use --organization".to_string())
        })
    }

    /// Returns the cluster ID or an error naming how to set it.
    pub fn require_cluster(&self) -> Result<i32> {
        self.cluster
            .ok_or_else(|| Error::Config("no cluster selected; use --cluster".to_string()))
    }
}

/// Values given on the command line or in the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub organization: Option<i32>,
    pub cluster: Option<i32>,
}

/// Configuration store for reading and writing the config file.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.nodessh/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".nodessh").join("config.json"),
        })
    }

    /// Create a config store with a custom path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Returns the config file path.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from disk.
    ///
    /// Returns default config if the file doesn't exist.
    pub async fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write to a temp file then rename
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }

    /// Applies `overrides` to the stored configuration and saves it.
    pub async fn update(&self, overrides: ConfigOverrides) -> Result<Config> {
        let config = self.load().await?.with_overrides(overrides);
        self.save(&config).await?;
        Ok(config)
    }
}
