//! # tagmesh
//!
//! Cluster self-discovery for cloud virtual machines.
//!
//! A node reads its identity from the instance metadata service, finds its
//! own record in the cloud inventory, takes the cluster name from a
//! well-known tag, discovers every instance carrying that tag, and joins them
//! through a clustering runtime. The running cluster's membership is
//! reported as deterministic plain text.

#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod config;
pub mod discovery;
pub mod cluster;
pub mod bootstrap;
pub mod server;
/// Command-line interface and argument parsing
pub mod cli;

// Re-export main types
pub use types::{ClusterName, InstanceRecord, MemberRecord, NodeIdentity, Tag};
pub use error::{BootstrapError, BootstrapResult, ConfigError, InventoryError};
pub use config::MeshConfig;
pub use bootstrap::{Bootstrapper, JoinPlan};
pub use cluster::{
    ClusterHandle, ClusterRuntime, JoinConfiguration, LocalRuntime, MembershipReporter,
    StartupBridge,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
