//! Collaborator seams consumed by the resolution engine.
//!
//! The engine is a library invoked in-process; the permission-node
//! registry, the site inheritance index and the wildcard matcher are
//! owned by surrounding subsystems and reached through these traits.

use serde::{Deserialize, Serialize};

use crate::id::SiteId;

/// A registered permission node with its weighted child tokens.
///
/// Each child carries a default polarity: `true` means granting the
/// parent implies the child, `false` means granting the parent implies
/// the negation of the child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionNode {
    name: String,
    children: Vec<(String, bool)>,
}

impl PermissionNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Add a child token with its default polarity.
    pub fn with_child(mut self, name: impl Into<String>, polarity: bool) -> Self {
        self.children.push((name.into(), polarity));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered `(child name, default polarity)` pairs.
    pub fn children(&self) -> &[(String, bool)] {
        &self.children
    }
}

/// Lookup seam into the global permission-node registry.
pub trait NodeSource: Send + Sync {
    /// Resolve a permission node by name, without any leading `-`.
    fn lookup(&self, name: &str) -> Option<PermissionNode>;
}

/// Lookup seam into the site inheritance index.
pub trait SiteInheritance: Send + Sync {
    /// Ordered ancestor sites of `site`, nearest first. Empty for a
    /// root site or an unknown site.
    fn ancestors_of(&self, site: &SiteId) -> Vec<SiteId>;
}

/// Wildcard permission-string matcher seam.
pub trait PermissionMatcher: Send + Sync {
    /// Whether `expression` (what an entity holds, e.g. `admin.*`)
    /// covers `permission` (what is being checked).
    fn matches(&self, expression: &str, permission: &str) -> bool;
}
