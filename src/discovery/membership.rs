//! Peer discovery by shared cluster tag

use tracing::info;

use super::inventory::InventoryClient;
use crate::error::BootstrapResult;
use crate::types::{ClusterName, InstanceRecord};

/// Finds every instance carrying a given cluster name
///
/// The result includes the querying node itself when it is tagged.
pub struct MembershipDiscoverer<'a> {
    inventory: &'a InventoryClient,
}

impl<'a> MembershipDiscoverer<'a> {
    pub fn new(inventory: &'a InventoryClient) -> Self {
        Self { inventory }
    }

    pub async fn discover(&self, cluster: &ClusterName) -> BootstrapResult<Vec<InstanceRecord>> {
        let members = self
            .inventory
            .instances_by_cluster_tag(cluster.as_str())
            .await?;
        info!(
            cluster = %cluster,
            tag = self.inventory.cluster_tag_key(),
            count = members.len(),
            "discovered cluster candidates"
        );
        Ok(members)
    }
}
