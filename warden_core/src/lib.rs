//! # Warden Core
//!
//! `warden_core` provides the shared vocabulary of the warden
//! permission system: typed site identifiers, the error hierarchy,
//! entity mutation events, and the collaborator traits the resolution
//! engine consumes.
//!
//! Key concepts:
//!
//! 1. **Site**: a tenant/domain scope; `None` as a [`id::SiteKey`] is
//!    the common scope shared by every site.
//!
//! 2. **Collaborator seams**: the permission-node registry, the site
//!    inheritance index and the wildcard matcher live outside the
//!    engine and are reached through traits.
//!
//! 3. **Notification sink**: every mutating entry point of the engine
//!    fires an [`events::EntityEvent`] after the fact.

pub mod error;
pub mod events;
pub mod id;
pub mod traits;

// Re-export key types for convenience
pub use error::{Error, RankingError, RegistryError, Result};
pub use events::{EntityEvent, NoopSink, NotificationSink, TracingSink};
pub use id::{site, SiteId, SiteKey};
pub use traits::{NodeSource, PermissionMatcher, PermissionNode, SiteInheritance};
