//! Shared raw state for permission-holding principals.
//!
//! `EntityData` is plain, serializable data: the non-inherited
//! permission lists, options, prefix/suffix and timed grants of one
//! group or user, partitioned by site key. All inheritance and caching
//! live above this layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use warden_core::id::{SiteId, SiteKey};

/// A permission grant that self-expires.
///
/// `expires_at <= 0` means the grant never expires (it is "transient":
/// it lives until the entity is reloaded).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedPermission {
    pub permission: String,
    pub site: SiteKey,
    pub expires_at: i64,
}

/// Serializes a `SiteKey`-keyed map as a sequence of `(site, value)`
/// pairs. The common scope is the `None` key, which no string-keyed
/// wire format (JSON included) accepts as a map key.
pub(crate) mod site_map {
    use std::collections::HashMap;
    use std::hash::Hash;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<K, V, S>(map: &HashMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize + Eq + Hash,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<HashMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Eq + Hash,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

/// Raw, non-inherited state common to groups and users.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntityData {
    #[serde(with = "site_map")]
    permissions: HashMap<SiteKey, Vec<String>>,
    #[serde(with = "site_map")]
    options: HashMap<SiteKey, HashMap<String, String>>,
    #[serde(with = "site_map")]
    prefix: HashMap<SiteKey, String>,
    #[serde(with = "site_map")]
    suffix: HashMap<SiteKey, String>,
    timed: Vec<TimedPermission>,
}

impl EntityData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Own permission tokens for `site`, in declaration order.
    pub fn permissions(&self, site: &SiteKey) -> Vec<String> {
        self.permissions.get(site).cloned().unwrap_or_default()
    }

    pub fn set_permissions(&mut self, site: SiteKey, permissions: Vec<String>) {
        if permissions.is_empty() {
            self.permissions.remove(&site);
        } else {
            self.permissions.insert(site, permissions);
        }
    }

    /// Put `permission` at the front of the list, dropping any older
    /// copy first so re-adding moves it to the top.
    pub fn add_permission(&mut self, site: SiteKey, permission: &str) {
        let mut list = self.permissions(&site);
        list.retain(|p| p != permission);
        list.insert(0, permission.to_owned());
        self.set_permissions(site, list);
    }

    pub fn remove_permission(&mut self, site: &SiteKey, permission: &str) {
        if let Some(list) = self.permissions.get_mut(site) {
            list.retain(|p| p != permission);
            if list.is_empty() {
                self.permissions.remove(site);
            }
        }
    }

    pub fn option(&self, site: &SiteKey, name: &str) -> Option<String> {
        self.options.get(site).and_then(|map| map.get(name).cloned())
    }

    /// Set an option; `None` removes it.
    pub fn set_option(&mut self, site: SiteKey, name: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.options.entry(site).or_default().insert(name.to_owned(), value);
            }
            None => {
                if let Some(map) = self.options.get_mut(&site) {
                    map.remove(name);
                    if map.is_empty() {
                        self.options.remove(&site);
                    }
                }
            }
        }
    }

    pub fn options_for(&self, site: &SiteKey) -> HashMap<String, String> {
        self.options.get(site).cloned().unwrap_or_default()
    }

    pub fn prefix(&self, site: &SiteKey) -> Option<String> {
        self.prefix.get(site).cloned()
    }

    pub fn set_prefix(&mut self, site: SiteKey, prefix: Option<String>) {
        match prefix {
            Some(prefix) => self.prefix.insert(site, prefix),
            None => self.prefix.remove(&site),
        };
    }

    pub fn suffix(&self, site: &SiteKey) -> Option<String> {
        self.suffix.get(site).cloned()
    }

    pub fn set_suffix(&mut self, site: SiteKey, suffix: Option<String>) {
        match suffix {
            Some(suffix) => self.suffix.insert(site, suffix),
            None => self.suffix.remove(&site),
        };
    }

    /// Live timed permission tokens for `site` as of `now`.
    pub fn timed_permissions(&self, site: &SiteKey, now: i64) -> Vec<String> {
        self.timed
            .iter()
            .filter(|t| &t.site == site && (t.expires_at <= 0 || t.expires_at > now))
            .map(|t| t.permission.clone())
            .collect()
    }

    /// Drop expired timed grants; returns whether anything was evicted.
    pub fn evict_expired_timed(&mut self, now: i64) -> bool {
        let before = self.timed.len();
        self.timed.retain(|t| t.expires_at <= 0 || t.expires_at > now);
        self.timed.len() != before
    }

    pub fn add_timed_permission(&mut self, permission: &str, site: SiteKey, expires_at: i64) {
        self.timed.push(TimedPermission {
            permission: permission.to_owned(),
            site,
            expires_at,
        });
    }

    pub fn remove_timed_permission(&mut self, site: &SiteKey, permission: &str) {
        self.timed.retain(|t| !(&t.site == site && t.permission == permission));
    }

    /// Remaining lifetime in seconds of a timed grant; 0 if the grant
    /// is transient or absent.
    pub fn timed_permission_lifetime(&self, site: &SiteKey, permission: &str, now: i64) -> i64 {
        self.timed
            .iter()
            .find(|t| &t.site == site && t.permission == permission && t.expires_at > 0)
            .map(|t| t.expires_at - now)
            .unwrap_or(0)
    }

    /// Sites where this entity carries any raw state.
    pub fn sites(&self) -> Vec<SiteId> {
        let mut sites: Vec<SiteId> = self
            .permissions
            .keys()
            .chain(self.options.keys())
            .chain(self.prefix.keys())
            .chain(self.suffix.keys())
            .filter_map(|key| key.clone())
            .collect();
        for timed in &self.timed {
            if let Some(site) = &timed.site {
                sites.push(site.clone());
            }
        }
        sites.sort();
        sites.dedup();
        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::id::site;

    #[test]
    fn test_add_permission_prepends() {
        let mut data = EntityData::new();
        data.set_permissions(None, vec!["chat".to_owned()]);
        data.add_permission(None, "fly");
        assert_eq!(data.permissions(&None), vec!["fly", "chat"]);

        // re-adding moves to the front instead of duplicating
        data.add_permission(None, "chat");
        assert_eq!(data.permissions(&None), vec!["chat", "fly"]);
    }

    #[test]
    fn test_option_set_and_remove() {
        let mut data = EntityData::new();
        data.set_option(site("example.com"), "color", Some("red".to_owned()));
        assert_eq!(
            data.option(&site("example.com"), "color"),
            Some("red".to_owned())
        );
        data.set_option(site("example.com"), "color", None);
        assert_eq!(data.option(&site("example.com"), "color"), None);
    }

    #[test]
    fn test_timed_permission_expiry() {
        let mut data = EntityData::new();
        data.add_timed_permission("event.fly", None, 100);
        data.add_timed_permission("event.glow", None, 0);

        assert_eq!(data.timed_permissions(&None, 50), vec!["event.fly", "event.glow"]);
        // at now=100 the bounded grant is gone, the transient one stays
        assert_eq!(data.timed_permissions(&None, 100), vec!["event.glow"]);

        assert!(data.evict_expired_timed(100));
        assert!(!data.evict_expired_timed(100));
        assert_eq!(data.timed_permissions(&None, 50), vec!["event.glow"]);
    }

    #[test]
    fn test_sites_collects_every_axis() {
        let mut data = EntityData::new();
        data.set_permissions(site("a"), vec!["p".to_owned()]);
        data.set_prefix(site("b"), Some("[B]".to_owned()));
        data.add_timed_permission("t", site("c"), 0);
        data.set_permissions(None, vec!["common".to_owned()]);

        let sites = data.sites();
        assert_eq!(sites.len(), 3);
        assert!(sites.contains(&"a".into()));
        assert!(sites.contains(&"b".into()));
        assert!(sites.contains(&"c".into()));
    }
}
