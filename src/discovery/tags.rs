//! Cluster tag resolution

use crate::types::{ClusterName, InstanceRecord};

/// Extracts the cluster name from an instance's tags
#[derive(Debug, Clone)]
pub struct TagResolver {
    tag_key: String,
}

impl TagResolver {
    pub fn new(tag_key: impl Into<String>) -> Self {
        Self {
            tag_key: tag_key.into(),
        }
    }

    /// Value of the first tag whose key is the cluster tag key
    pub fn resolve(&self, instance: &InstanceRecord) -> Option<ClusterName> {
        instance
            .tags
            .iter()
            .find(|tag| tag.key == self.tag_key)
            .map(|tag| ClusterName::new(tag.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_matching_tag() {
        let resolver = TagResolver::new("MeshCluster");
        let instance = InstanceRecord::new("i-1", "a.example.com")
            .with_tag("Name", "web-1")
            .with_tag("meshcluster", "case-differs");

        assert_eq!(resolver.resolve(&instance), None);
        assert_eq!(resolver.resolve(&InstanceRecord::new("i-2", "")), None);
    }

    #[test]
    fn test_first_match_wins() {
        let resolver = TagResolver::new("MeshCluster");
        let instance = InstanceRecord::new("i-1", "a.example.com")
            .with_tag("Name", "web-1")
            .with_tag("MeshCluster", "alpha")
            .with_tag("MeshCluster", "beta");

        assert_eq!(resolver.resolve(&instance), Some(ClusterName::new("alpha")));
    }
}
