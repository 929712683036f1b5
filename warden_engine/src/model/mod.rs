//! Entity model.
//!
//! This module defines the raw state of groups and users; all
//! inheritance, caching and ladder logic lives in
//! [`crate::registry`].

pub mod entity;
pub mod group;
pub mod user;

pub use entity::{EntityData, TimedPermission};
pub use group::{Group, GroupState};
pub use user::{MembershipExpiry, User, UserState};
