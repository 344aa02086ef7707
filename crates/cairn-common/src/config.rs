//! Configuration types for Cairn
//!
//! This module defines configuration structures used across components.
//! Values come from an optional TOML file overlaid with `CAIRN__`-prefixed
//! environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Path value selecting the in-memory metadata engine
pub const IN_MEMORY_METADATA: &str = ":memory:";

/// Root configuration for Cairn
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Metadata engine configuration
    pub metadata: MetadataConfig,
    /// Data placement configuration
    pub data: DataConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from an optional file plus the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(
                config::Environment::with_prefix("CAIRN")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,
    /// Host suffixes that serve static website requests
    pub website_endpoints: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            website_endpoints: Vec::new(),
        }
    }
}

/// Metadata engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Database file, or `:memory:` for a non-persistent engine
    pub path: PathBuf,
    /// Whether this instance performs the bootstrap writes
    pub owner: bool,
    /// Separator used inside composite metadata keys
    pub splitter: String,
}

impl MetadataConfig {
    /// Whether the in-memory engine is selected
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_METADATA
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/cairn/metadata.redb"),
            owner: true,
            splitter: "..|..".to_string(),
        }
    }
}

/// One configured data location
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LocationConfig {
    /// Process memory, lost on restart
    Mem,
    /// Files under a local directory
    File {
        /// Root directory for object data
        path: PathBuf,
    },
    /// Remote REST object service
    Sproxyd {
        /// Base URL, e.g. `http://10.0.0.5:81`
        endpoint: String,
        /// Path prefix under the endpoint
        #[serde(default = "default_sproxyd_path")]
        base_path: String,
    },
}

fn default_sproxyd_path() -> String {
    "/proxy/arc".to_string()
}

/// Data placement configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Single backend for the whole deployment; disables per-object placement
    pub legacy_backend: Option<String>,
    /// Location name to backend
    pub locations: BTreeMap<String, LocationConfig>,
    /// Endpoint host to default location
    pub rest_endpoints: BTreeMap<String, String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        let mut locations = BTreeMap::new();
        locations.insert("mem".to_string(), LocationConfig::Mem);
        let mut rest_endpoints = BTreeMap::new();
        rest_endpoints.insert("localhost".to_string(), "mem".to_string());
        rest_endpoints.insert("127.0.0.1".to_string(), "mem".to_string());
        Self {
            legacy_backend: None,
            locations,
            rest_endpoints,
        }
    }
}

/// Which authenticator serves requests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Local SigV4 verification against configured accounts
    #[default]
    Builtin,
    /// Remote authority over HTTP
    Vault,
}

/// Decision applied to authenticated requests by the builtin authenticator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDecision {
    #[default]
    Allow,
    Deny,
}

/// A locally configured account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub access_key: String,
    pub secret_key: String,
    pub canonical_id: String,
    pub display_name: String,
}

/// Authentication configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// SigV4 signing region
    pub region: String,
    pub accounts: Vec<AccountConfig>,
    /// Base URL of the remote authority (vault mode)
    pub vault_endpoint: Option<String>,
    pub default_decision: DefaultDecision,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Builtin,
            region: "us-east-1".to_string(),
            accounts: Vec::new(),
            vault_endpoint: None,
            default_decision: DefaultDecision::Allow,
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}
