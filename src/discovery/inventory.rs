//! Cloud inventory queries
//!
//! The inventory answers DescribeInstances-shaped queries: instances come
//! back grouped in reservations, which [`InventoryClient`] flattens.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{BootstrapResult, InventoryError};
use crate::types::InstanceRecord;

/// Instance query shapes supported by the inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceQuery {
    /// Look up explicit instance identifiers
    ById(Vec<String>),
    /// All instances whose tag `key` equals `value`
    ByTag { key: String, value: String },
}

impl InstanceQuery {
    fn matches(&self, instance: &InstanceRecord) -> bool {
        match self {
            InstanceQuery::ById(ids) => ids.iter().any(|id| *id == instance.id),
            InstanceQuery::ByTag { key, value } => instance
                .tags
                .iter()
                .any(|tag| tag.key == *key && tag.value == *value),
        }
    }
}

/// One provider grouping of instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    #[serde(rename = "Instances", default)]
    pub instances: Vec<Option<InstanceRecord>>,
}

impl Reservation {
    pub fn new(instances: Vec<InstanceRecord>) -> Self {
        Self {
            instances: instances.into_iter().map(Some).collect(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DescribeInstancesResponse {
    #[serde(rename = "Reservations", default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Serialize)]
struct Filter<'a> {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Values")]
    values: [&'a str; 1],
}

#[derive(Debug, Default, Serialize)]
struct DescribeInstancesRequest<'a> {
    #[serde(rename = "InstanceIds", skip_serializing_if = "Option::is_none")]
    instance_ids: Option<&'a [String]>,
    #[serde(rename = "Filters", skip_serializing_if = "Option::is_none")]
    filters: Option<Vec<Filter<'a>>>,
}

impl<'a> From<&'a InstanceQuery> for DescribeInstancesRequest<'a> {
    fn from(query: &'a InstanceQuery) -> Self {
        match query {
            InstanceQuery::ById(ids) => Self {
                instance_ids: Some(ids.as_slice()),
                filters: None,
            },
            InstanceQuery::ByTag { key, value } => Self {
                instance_ids: None,
                filters: Some(vec![Filter {
                    name: format!("tag:{}", key),
                    values: [value.as_str()],
                }]),
            },
        }
    }
}

/// Raw inventory transport
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn describe_instances(
        &self,
        query: &InstanceQuery,
    ) -> Result<Vec<Reservation>, InventoryError>;
}

/// Inventory reached over HTTP with JSON bodies
#[derive(Debug, Clone)]
pub struct HttpInventoryApi {
    client: Client,
    endpoint: String,
}

impl HttpInventoryApi {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, InventoryError> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryApi {
    async fn describe_instances(
        &self,
        query: &InstanceQuery,
    ) -> Result<Vec<Reservation>, InventoryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&DescribeInstancesRequest::from(query))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(InventoryError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        let parsed: DescribeInstancesResponse = serde_json::from_slice(&body)?;
        Ok(parsed.reservations)
    }
}

/// Fixed in-memory inventory
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    reservations: Vec<Reservation>,
}

impl StaticInventory {
    pub fn new(instances: Vec<InstanceRecord>) -> Self {
        Self {
            reservations: vec![Reservation::new(instances)],
        }
    }

    pub fn from_reservations(reservations: Vec<Reservation>) -> Self {
        Self { reservations }
    }

    /// Load a DescribeInstances-shaped JSON document
    pub fn from_file(path: &Path) -> Result<Self, InventoryError> {
        let text = std::fs::read_to_string(path)?;
        let parsed: DescribeInstancesResponse = serde_json::from_str(&text)?;
        Ok(Self::from_reservations(parsed.reservations))
    }
}

#[async_trait]
impl InventoryApi for StaticInventory {
    async fn describe_instances(
        &self,
        query: &InstanceQuery,
    ) -> Result<Vec<Reservation>, InventoryError> {
        Ok(self
            .reservations
            .iter()
            .map(|reservation| Reservation {
                instances: reservation
                    .instances
                    .iter()
                    .filter(|slot| slot.as_ref().map_or(false, |i| query.matches(i)))
                    .cloned()
                    .collect(),
            })
            .filter(|reservation| !reservation.instances.is_empty())
            .collect())
    }
}

/// Typed queries over an [`InventoryApi`]
///
/// Failures propagate as errors; an `Ok` empty list means the query succeeded
/// and matched nothing.
pub struct InventoryClient {
    api: Box<dyn InventoryApi>,
    cluster_tag_key: String,
}

impl InventoryClient {
    pub fn new(api: Box<dyn InventoryApi>, cluster_tag_key: impl Into<String>) -> Self {
        Self {
            api,
            cluster_tag_key: cluster_tag_key.into(),
        }
    }

    pub fn cluster_tag_key(&self) -> &str {
        &self.cluster_tag_key
    }

    /// First instance matching `instance_id`
    pub async fn instance_by_id(&self, instance_id: &str) -> BootstrapResult<Option<InstanceRecord>> {
        let query = InstanceQuery::ById(vec![instance_id.to_string()]);
        Ok(self.query(&query).await?.into_iter().next())
    }

    /// Every instance tagged with the cluster tag set to `cluster_name`
    pub async fn instances_by_cluster_tag(
        &self,
        cluster_name: &str,
    ) -> BootstrapResult<Vec<InstanceRecord>> {
        let query = InstanceQuery::ByTag {
            key: self.cluster_tag_key.clone(),
            value: cluster_name.to_string(),
        };
        self.query(&query).await
    }

    async fn query(&self, query: &InstanceQuery) -> BootstrapResult<Vec<InstanceRecord>> {
        let reservations = self.api.describe_instances(query).await?;
        let records: Vec<InstanceRecord> = reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
            .flatten()
            .collect();
        debug!(?query, count = records.len(), "inventory query returned");
        Ok(records)
    }
}
