use clap::Parser;
use std::path::PathBuf;

use crate::config::MeshConfig;
use crate::error::ConfigError;

/// tagmesh - tag-driven cluster bootstrap
/// Discovers peers through cloud instance tags, joins them, and serves the
/// current membership as plain text
#[derive(Parser, Debug, Default)]
#[command(name = "tagmesh")]
#[command(version)]
#[command(about = "Discover cluster peers from cloud tags, join them, and report membership")]
#[command(long_about = "
tagmesh reads the instance identity from the metadata service, looks up the
instance's cluster tag in the cloud inventory, joins every instance carrying
the same tag, and serves the live member list over HTTP.

Without a metadata service, inventory source, or cluster tag it starts a
standalone node on the fixed bind port.

Usage examples:
  tagmesh --inventory-url http://inventory.internal/describe
  tagmesh --config /etc/tagmesh.toml --service-port 9090
")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "TAGMESH_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fixed cluster listening port
    #[arg(long, env = "TAGMESH_BIND_PORT")]
    pub bind_port: Option<u16>,

    /// HTTP port serving the membership report
    #[arg(long, env = "TAGMESH_SERVICE_PORT")]
    pub service_port: Option<u16>,

    /// Tag key whose value names the cluster
    #[arg(long, env = "TAGMESH_CLUSTER_TAG")]
    pub cluster_tag: Option<String>,

    /// DescribeInstances-compatible inventory endpoint
    #[arg(long, env = "TAGMESH_INVENTORY_URL")]
    pub inventory_url: Option<String>,

    /// DescribeInstances-shaped JSON file used as the inventory
    #[arg(long, env = "TAGMESH_INVENTORY_FILE", value_name = "FILE")]
    pub inventory_file: Option<PathBuf>,

    /// Instance identity metadata URL
    #[arg(long, env = "TAGMESH_METADATA_URL")]
    pub metadata_url: Option<String>,

    /// Metadata session token URL
    #[arg(long, env = "TAGMESH_METADATA_TOKEN_URL")]
    pub metadata_token_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Defaults, then the config file, then flags
    pub fn load_config(&self) -> Result<MeshConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => MeshConfig::from_file(path)?,
            None => MeshConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut MeshConfig) {
        if let Some(port) = self.bind_port {
            config.bind_port = port;
        }
        if let Some(port) = self.service_port {
            config.service_port = port;
        }
        if let Some(tag) = &self.cluster_tag {
            config.cluster_tag_key = tag.clone();
        }
        if let Some(url) = &self.inventory_url {
            config.inventory.endpoint = Some(url.clone());
        }
        if let Some(path) = &self.inventory_file {
            config.inventory.file = Some(path.clone());
        }
        if let Some(url) = &self.metadata_url {
            config.metadata.url = url.clone();
        }
        if let Some(url) = &self.metadata_token_url {
            config.metadata.token_url = Some(url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port = 6000\nservice_port = 6001\ncluster_tag_key = \"Fleet\"").unwrap();

        let cli = Cli::try_parse_from([
            "tagmesh",
            "--config",
            file.path().to_str().unwrap(),
            "--service-port",
            "7001",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();

        assert_eq!(config.bind_port, 6000);
        assert_eq!(config.service_port, 7001);
        assert_eq!(config.cluster_tag_key, "Fleet");
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        let cli = Cli::default();
        assert_eq!(cli.load_config().unwrap(), MeshConfig::default());
    }

    #[test]
    fn test_inventory_flags() {
        let cli = Cli::try_parse_from([
            "tagmesh",
            "--inventory-url",
            "http://inventory.internal/describe",
            "--metadata-url",
            "http://127.0.0.1:1/id",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();

        assert_eq!(
            config.inventory.endpoint.as_deref(),
            Some("http://inventory.internal/describe")
        );
        assert_eq!(config.metadata.url, "http://127.0.0.1:1/id");
    }
}
