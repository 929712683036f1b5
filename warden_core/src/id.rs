//! Typed identifiers for sites.
//!
//! Every entity in the engine is keyed by name, but site scopes get a
//! dedicated wrapper so a site name can never be confused with a group
//! or user name in a signature.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a tenant/domain scope ("site").
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(String);

impl SiteId {
    /// Create a site identifier from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the site name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SiteId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Scope key for per-site state: `None` is the common/global scope.
pub type SiteKey = Option<SiteId>;

/// Convenience constructor for a non-common site key.
pub fn site(name: impl Into<String>) -> SiteKey {
    Some(SiteId::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_display() {
        let id = SiteId::new("shop.example.com");
        assert_eq!(id.to_string(), "shop.example.com");
        assert_eq!(id.as_str(), "shop.example.com");
    }

    #[test]
    fn test_site_key_common_scope() {
        let common: SiteKey = None;
        assert!(common.is_none());
        assert_eq!(site("example.com"), Some(SiteId::new("example.com")));
    }
}
