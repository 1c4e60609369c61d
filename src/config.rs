//! Process configuration
//!
//! Built-in defaults are overlaid by an optional TOML file and then by
//! command-line flags (which also read `TAGMESH_*` environment variables).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Default tag key marking cluster membership
pub const DEFAULT_CLUSTER_TAG: &str = "MeshCluster";

/// Default instance metadata endpoint
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/instance-id";

/// Top-level configuration passed to every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Tag key whose value names the cluster
    pub cluster_tag_key: String,
    /// Fixed cluster listening port, never auto-incremented
    pub bind_port: u16,
    /// HTTP port serving the membership report
    pub service_port: u16,
    /// Peer handshake timeout
    #[serde(with = "duration_secs")]
    pub connection_timeout: Duration,
    /// Quorum applied when no cluster is discovered
    pub standalone_quorum: usize,
    pub metadata: MetadataConfig,
    pub inventory: InventoryConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            cluster_tag_key: DEFAULT_CLUSTER_TAG.to_string(),
            bind_port: 5701,
            service_port: 8080,
            connection_timeout: Duration::from_secs(30),
            standalone_quorum: 2,
            metadata: MetadataConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

/// Metadata service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub url: String,
    /// Session token endpoint; unset means plain GET only
    pub token_url: Option<String>,
    /// Applied to both connect and read
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_METADATA_URL.to_string(),
            token_url: None,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Inventory source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// DescribeInstances-compatible JSON endpoint
    pub endpoint: Option<String>,
    /// Local JSON file with a DescribeInstances-shaped response
    pub file: Option<PathBuf>,
}

impl MeshConfig {
    /// Load from a TOML file, filling unspecified fields with defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Check ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_tag_key.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster tag key must not be empty".to_string()));
        }
        if self.bind_port == 0 {
            return Err(ConfigError::Invalid("bind port must be non-zero".to_string()));
        }
        if self.service_port == 0 {
            return Err(ConfigError::Invalid("service port must be non-zero".to_string()));
        }
        if self.bind_port == self.service_port {
            return Err(ConfigError::Invalid(format!(
                "bind port and service port are both {}",
                self.bind_port
            )));
        }
        if self.standalone_quorum < 2 {
            return Err(ConfigError::Invalid(format!(
                "standalone quorum must be at least 2, got {}",
                self.standalone_quorum
            )));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
