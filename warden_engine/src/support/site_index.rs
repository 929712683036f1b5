//! In-memory site inheritance index.

use dashmap::DashMap;
use warden_core::id::SiteId;
use warden_core::traits::SiteInheritance;

/// An in-memory [`SiteInheritance`] index.
///
/// Stores the direct parent list per site; `ancestors_of` returns the
/// direct parents only, nearest first, matching a backing store that
/// materializes one level per query (deeper levels are walked by the
/// resolution recursion itself).
#[derive(Debug, Default)]
pub struct MemorySiteIndex {
    parents: DashMap<SiteId, Vec<SiteId>>,
}

impl MemorySiteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the ordered parent sites of `site`.
    pub fn set_parents(&self, site: SiteId, parents: Vec<SiteId>) {
        if parents.is_empty() {
            self.parents.remove(&site);
        } else {
            self.parents.insert(site, parents);
        }
    }
}

impl SiteInheritance for MemorySiteIndex {
    fn ancestors_of(&self, site: &SiteId) -> Vec<SiteId> {
        self.parents.get(site).map(|entry| entry.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_site_has_no_ancestors() {
        let index = MemorySiteIndex::new();
        assert!(index.ancestors_of(&"nowhere".into()).is_empty());
    }

    #[test]
    fn test_parent_order_preserved() {
        let index = MemorySiteIndex::new();
        index.set_parents("shop.example.com".into(), vec!["example.com".into(), "example.org".into()]);
        assert_eq!(
            index.ancestors_of(&"shop.example.com".into()),
            vec![SiteId::from("example.com"), SiteId::from("example.org")]
        );
    }
}
