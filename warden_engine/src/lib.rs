//! Hierarchical permission resolution engine.
//!
//! The engine decides, for a user and an optional site scope, which
//! groups, permissions, display attributes and options apply. It
//! combines group inheritance, site inheritance, permission negation
//! with child-node expansion, lazily evicted timed memberships and
//! rank-ladder transitions, all behind a per-user invalidation-driven
//! cache.
//!
//! # Architecture
//!
//! * [`PermissionRegistry`] owns every [`Group`] and [`User`] and
//!   carries the resolution algorithms.
//! * Entities hold only their own declared state; resolution context
//!   (site ancestry, permission nodes, the matcher) is passed in
//!   through the registry's collaborators.
//! * Resolution is a pure function of current registry state, memoized
//!   per user and cleared wholesale on any mutation of that user.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use warden_core::events::NoopSink;
//! use warden_engine::{
//!     MemoryNodeSource, MemorySiteIndex, PermissionRegistry, RegexMatcher, RegistrySettings,
//! };
//!
//! let registry = PermissionRegistry::new(
//!     RegistrySettings::default(),
//!     Arc::new(MemorySiteIndex::new()),
//!     Arc::new(MemoryNodeSource::new()),
//!     Arc::new(RegexMatcher::new()),
//!     Arc::new(NoopSink),
//! );
//!
//! let admins = registry.create_group("admins");
//! admins.set_permissions(None, vec!["admin.*".to_owned()]);
//!
//! let bob = registry.create_user("bob");
//! bob.set_group_names(None, vec!["admins".to_owned()]);
//!
//! assert!(registry.has(&bob, "admin.ban", &None));
//! assert!(!registry.has(&bob, "chat.color", &None));
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod matcher;
pub mod model;
pub mod registry;
pub mod support;

pub use cache::UserCache;
pub use config::RegistrySettings;
pub use matcher::RegexMatcher;
pub use model::{EntityData, Group, GroupState, MembershipExpiry, TimedPermission, User, UserState};
pub use registry::PermissionRegistry;
pub use support::{MemoryNodeSource, MemorySiteIndex};
