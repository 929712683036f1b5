//! Per-user memoization of resolution outputs.
//!
//! The cache is invalidated wholesale, never per site-key: any
//! mutation to the user (or an explicit registry-level invalidation)
//! clears every map at once. Racing reads during a clear observe
//! either a fully-old or fully-new entry for a given key; the
//! matched-expression memo stores a real `Option` so "computed as
//! absent" is never confused with "not yet computed".

use std::sync::Arc;

use dashmap::DashMap;
use warden_core::id::SiteKey;

use crate::model::Group;

/// Memoized resolution outputs for one user.
#[derive(Debug, Default)]
pub struct UserCache {
    groups: DashMap<SiteKey, Vec<Arc<Group>>>,
    permissions: DashMap<SiteKey, Vec<String>>,
    prefix: DashMap<SiteKey, String>,
    suffix: DashMap<SiteKey, String>,
    options: DashMap<(SiteKey, String), String>,
    matched: DashMap<(SiteKey, String), Option<String>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self, site: &SiteKey) -> Option<Vec<Arc<Group>>> {
        self.groups.get(site).map(|entry| entry.clone())
    }

    pub fn store_groups(&self, site: SiteKey, groups: Vec<Arc<Group>>) {
        self.groups.insert(site, groups);
    }

    pub fn permissions(&self, site: &SiteKey) -> Option<Vec<String>> {
        self.permissions.get(site).map(|entry| entry.clone())
    }

    pub fn store_permissions(&self, site: SiteKey, permissions: Vec<String>) {
        self.permissions.insert(site, permissions);
    }

    pub fn prefix(&self, site: &SiteKey) -> Option<String> {
        self.prefix.get(site).map(|entry| entry.clone())
    }

    pub fn store_prefix(&self, site: SiteKey, prefix: String) {
        self.prefix.insert(site, prefix);
    }

    pub fn suffix(&self, site: &SiteKey) -> Option<String> {
        self.suffix.get(site).map(|entry| entry.clone())
    }

    pub fn store_suffix(&self, site: SiteKey, suffix: String) {
        self.suffix.insert(site, suffix);
    }

    pub fn option(&self, site: &SiteKey, name: &str) -> Option<String> {
        self.options
            .get(&(site.clone(), name.to_owned()))
            .map(|entry| entry.clone())
    }

    pub fn store_option(&self, site: SiteKey, name: String, value: String) {
        self.options.insert((site, name), value);
    }

    /// Outer `None` means "not yet computed"; inner `None` means the
    /// matcher found no covering expression.
    pub fn matched_expression(&self, site: &SiteKey, permission: &str) -> Option<Option<String>> {
        self.matched
            .get(&(site.clone(), permission.to_owned()))
            .map(|entry| entry.clone())
    }

    pub fn store_matched_expression(
        &self,
        site: SiteKey,
        permission: String,
        expression: Option<String>,
    ) {
        self.matched.insert((site, permission), expression);
    }

    /// Drop every memoized value.
    pub fn clear(&self) {
        self.groups.clear();
        self.permissions.clear();
        self.prefix.clear();
        self.suffix.clear();
        self.options.clear();
        self.matched.clear();
    }
}
