//! Cluster join and membership reporting
//!
//! Builds the join configuration from discovered peers, hands it to a
//! clustering runtime through a blocking startup bridge, and renders the
//! running cluster's membership.

pub mod join;
pub mod runtime;
pub mod bridge;
pub mod local;
pub mod report;

pub use join::{quorum_size, JoinConfiguration};
pub use runtime::{ClusterHandle, ClusterRuntime};
pub use bridge::{JoinCallback, JoinOutcome, StartupBridge};
pub use local::{LocalCluster, LocalRuntime};
pub use report::{member_order, render, sort_members, MembershipReporter};
