//! Join configuration for the clustering runtime

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::MeshConfig;
use crate::error::{BootstrapError, BootstrapResult};
use crate::types::{ClusterName, InstanceRecord};

/// Minimum members before the runtime considers the cluster formed
///
/// `max(2, n / 2 + 1)` for `n` peer addresses.
pub fn quorum_size(peer_count: usize) -> usize {
    std::cmp::max(2, peer_count / 2 + 1)
}

/// Complete parameter set handed to the clustering runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfiguration {
    /// `None` in standalone mode
    pub cluster_name: Option<ClusterName>,
    /// Shared group secret, equal to the cluster name
    pub group_credential: Option<String>,
    pub quorum_size: usize,
    /// Fixed listening port; a clash fails the join
    pub bind_port: u16,
    /// Address advertised to peers
    pub public_address: Option<String>,
    /// Explicit TCP peer list, including this node
    pub peer_addresses: Vec<String>,
    pub multicast_enabled: bool,
    pub connection_timeout: Duration,
}

impl JoinConfiguration {
    /// Configuration for a discovered, tagged cluster
    ///
    /// Fails with [`BootstrapError::EmptyMembership`] when no candidates were found.
    pub fn for_cluster(
        cluster: &ClusterName,
        self_instance: &InstanceRecord,
        candidates: &[InstanceRecord],
        config: &MeshConfig,
    ) -> BootstrapResult<Self> {
        if candidates.is_empty() {
            return Err(BootstrapError::EmptyMembership {
                cluster: cluster.to_string(),
            });
        }

        let peer_addresses: Vec<String> = candidates
            .iter()
            .map(|instance| instance.public_address.clone())
            .collect();

        Ok(Self {
            cluster_name: Some(cluster.clone()),
            group_credential: Some(cluster.to_string()),
            quorum_size: quorum_size(peer_addresses.len()),
            bind_port: config.bind_port,
            public_address: Some(self_instance.public_address.clone()),
            peer_addresses,
            multicast_enabled: false,
            connection_timeout: config.connection_timeout,
        })
    }

    /// Fallback when no cloud environment or cluster tag was found
    pub fn standalone(config: &MeshConfig) -> Self {
        Self {
            cluster_name: None,
            group_credential: None,
            quorum_size: config.standalone_quorum,
            bind_port: config.bind_port,
            public_address: None,
            peer_addresses: Vec::new(),
            multicast_enabled: false,
            connection_timeout: config.connection_timeout,
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.cluster_name.is_none()
    }
}
