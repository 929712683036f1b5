//! In-memory collaborator implementations.
//!
//! Embedders with a real backing store supply their own
//! [`warden_core::SiteInheritance`] / [`warden_core::NodeSource`];
//! these are the defaults used by tests and store-less deployments.

pub mod node_source;
pub mod site_index;

pub use node_source::MemoryNodeSource;
pub use site_index::MemorySiteIndex;
