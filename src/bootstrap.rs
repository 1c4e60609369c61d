//! Startup sequence: identity, self lookup, tag, peers, join

use std::sync::Arc;
use tracing::{info, warn};

use crate::cluster::{ClusterRuntime, JoinConfiguration, StartupBridge};
use crate::config::MeshConfig;
use crate::discovery::{
    HttpInventoryApi, InventoryClient, MembershipDiscoverer, MetadataReader, StaticInventory,
    TagResolver,
};
use crate::error::{BootstrapError, BootstrapResult};
use crate::types::InstanceRecord;

/// What the node decided to join
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPlan {
    /// No cloud environment, inventory, or cluster tag was found
    Standalone(JoinConfiguration),
    /// A tagged cluster was discovered
    Clustered {
        self_instance: InstanceRecord,
        configuration: JoinConfiguration,
    },
}

impl JoinPlan {
    pub fn configuration(&self) -> &JoinConfiguration {
        match self {
            JoinPlan::Standalone(configuration) => configuration,
            JoinPlan::Clustered { configuration, .. } => configuration,
        }
    }

    pub fn into_configuration(self) -> JoinConfiguration {
        match self {
            JoinPlan::Standalone(configuration) => configuration,
            JoinPlan::Clustered { configuration, .. } => configuration,
        }
    }
}

/// Drives discovery and the cluster join
pub struct Bootstrapper {
    config: MeshConfig,
    metadata: MetadataReader,
    inventory: Option<InventoryClient>,
    tags: TagResolver,
}

impl Bootstrapper {
    pub fn new(config: MeshConfig, metadata: MetadataReader, inventory: Option<InventoryClient>) -> Self {
        let tags = TagResolver::new(config.cluster_tag_key.clone());
        Self {
            config,
            metadata,
            inventory,
            tags,
        }
    }

    /// Wire the metadata reader and the configured inventory source
    ///
    /// An inventory endpoint takes precedence over an inventory file.
    pub fn from_config(config: &MeshConfig) -> BootstrapResult<Self> {
        let api: Option<Box<dyn crate::discovery::InventoryApi>> = match (
            &config.inventory.endpoint,
            &config.inventory.file,
        ) {
            (Some(endpoint), _) => Some(Box::new(HttpInventoryApi::new(endpoint.clone())?)),
            (None, Some(path)) => Some(Box::new(StaticInventory::from_file(path)?)),
            (None, None) => None,
        };
        let inventory = api.map(|api| InventoryClient::new(api, config.cluster_tag_key.clone()));
        let metadata = MetadataReader::new(config.metadata.clone());
        Ok(Self::new(config.clone(), metadata, inventory))
    }

    fn standalone(&self) -> JoinPlan {
        JoinPlan::Standalone(JoinConfiguration::standalone(&self.config))
    }

    /// Decide between a discovered cluster and the standalone fallback
    ///
    /// Inventory failures and an empty peer set are fatal.
    pub async fn plan(&self) -> BootstrapResult<JoinPlan> {
        let Some(identity) = self.metadata.read_identity().await else {
            info!("instance metadata unavailable, starting standalone");
            return Ok(self.standalone());
        };
        info!(%identity, "resolved instance identity");

        let Some(inventory) = &self.inventory else {
            warn!("no inventory source configured, starting standalone");
            return Ok(self.standalone());
        };

        let Some(self_instance) = inventory.instance_by_id(identity.as_str()).await? else {
            warn!(%identity, "instance not found in inventory, starting standalone");
            return Ok(self.standalone());
        };

        let Some(cluster) = self.tags.resolve(&self_instance) else {
            info!(
                tag = %self.config.cluster_tag_key,
                "instance carries no cluster tag, starting standalone"
            );
            return Ok(self.standalone());
        };

        let candidates = MembershipDiscoverer::new(inventory).discover(&cluster).await?;
        let configuration =
            JoinConfiguration::for_cluster(&cluster, &self_instance, &candidates, &self.config)?;
        info!(
            cluster = %cluster,
            peers = configuration.peer_addresses.len(),
            quorum = configuration.quorum_size,
            "join configuration built"
        );
        Ok(JoinPlan::Clustered {
            self_instance,
            configuration,
        })
    }

    /// Join through the blocking bridge without stalling the async executor
    pub async fn start<R>(&self, plan: JoinPlan, runtime: Arc<R>) -> BootstrapResult<R::Handle>
    where
        R: ClusterRuntime + 'static,
    {
        let configuration = plan.into_configuration();
        tokio::task::spawn_blocking(move || StartupBridge::join(runtime.as_ref(), configuration))
            .await
            .map_err(|e| BootstrapError::join_failed(format!("join task aborted: {}", e)))?
    }
}
