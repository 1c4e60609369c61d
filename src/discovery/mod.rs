//! Self-discovery from the hosting cloud environment
//!
//! Reads the node's identity from the instance metadata service, looks the
//! node up in the cloud inventory, resolves its cluster tag and finds every
//! instance sharing that tag.

pub mod metadata;
pub mod inventory;
pub mod tags;
pub mod membership;

pub use metadata::MetadataReader;
pub use inventory::{
    HttpInventoryApi, InstanceQuery, InventoryApi, InventoryClient, Reservation, StaticInventory,
};
pub use tags::TagResolver;
pub use membership::MembershipDiscoverer;
