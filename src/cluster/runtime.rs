//! The boundary to the clustering runtime

use uuid::Uuid;

use super::bridge::JoinCallback;
use super::join::JoinConfiguration;
use crate::error::BootstrapResult;
use crate::types::MemberRecord;

/// A clustering runtime that can start a clustered node asynchronously
///
/// Implementations must eventually consume `callback` on some thread of
/// their choosing, completing it with success or failure.
pub trait ClusterRuntime: Send + Sync {
    type Handle: ClusterHandle + 'static;

    fn start_clustered_async(&self, config: JoinConfiguration, callback: JoinCallback<Self::Handle>);
}

/// Live connection to a started runtime
pub trait ClusterHandle: Send + Sync {
    /// Current members, read fresh on every call
    fn members(&self) -> BootstrapResult<Vec<MemberRecord>>;

    /// Unique id of this node's member
    fn local_id(&self) -> Uuid;

    /// Leave the cluster and release the listening port
    fn shutdown(&self);
}
