//! Users: permission entities with per-site group memberships.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use warden_core::events::{EntityEvent, NotificationSink};
use warden_core::id::{SiteId, SiteKey};

use super::entity::EntityData;
use crate::cache::UserCache;
use crate::clock;

/// Expiry record for one timed membership. Group names are stored
/// lowercased.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipExpiry {
    pub group: String,
    pub site: SiteKey,
    pub expires_at: i64,
}

/// Persistent state of a user.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserState {
    pub entity: EntityData,
    /// Raw membership group names per site key, in declaration order.
    #[serde(with = "super::entity::site_map")]
    pub memberships: HashMap<SiteKey, Vec<String>>,
    /// Expiry records; a membership without one never expires.
    pub membership_expiry: Vec<MembershipExpiry>,
}

/// A user whose effective permissions are resolved through its groups.
///
/// Every mutation invalidates the whole per-user cache; per-site
/// invalidation is deliberately not offered.
pub struct User {
    name: String,
    state: RwLock<UserState>,
    cache: UserCache,
    rank_lock: Mutex<()>,
    sink: Arc<dyn NotificationSink>,
}

impl User {
    pub fn new(name: impl Into<String>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(UserState::default()),
            cache: UserCache::new(),
            rank_lock: Mutex::new(()),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn cache(&self) -> &UserCache {
        &self.cache
    }

    /// Serializes promote/demote per user.
    pub(crate) fn rank_guard(&self) -> MutexGuard<'_, ()> {
        self.rank_lock.lock()
    }

    /// Raw membership names declared for `site`, unresolved and
    /// unfiltered.
    pub fn raw_group_names(&self, site: &SiteKey) -> Vec<String> {
        self.state.read().memberships.get(site).cloned().unwrap_or_default()
    }

    pub fn set_group_names(&self, site: SiteKey, names: Vec<String>) {
        {
            let mut state = self.state.write();
            if names.is_empty() {
                state.memberships.remove(&site);
            } else {
                state.memberships.insert(site, names);
            }
        }
        self.invalidate();
        self.notify(EntityEvent::MembershipChanged);
    }

    /// Drop one membership name; also forgets its expiry record.
    pub fn remove_group_name(&self, site: &SiteKey, group: &str) {
        let mut names = self.raw_group_names(site);
        let before = names.len();
        names.retain(|n| !n.eq_ignore_ascii_case(group));
        if names.len() == before {
            return;
        }
        {
            let mut state = self.state.write();
            if names.is_empty() {
                state.memberships.remove(site);
            } else {
                state.memberships.insert(site.clone(), names);
            }
            let key = group.to_ascii_lowercase();
            state
                .membership_expiry
                .retain(|record| !(record.group == key && &record.site == site));
        }
        self.invalidate();
        self.notify(EntityEvent::MembershipChanged);
    }

    /// Expiry epoch-seconds for a membership; 0 when it never expires.
    pub fn membership_expiry(&self, group: &str, site: &SiteKey) -> i64 {
        let key = group.to_ascii_lowercase();
        self.state
            .read()
            .membership_expiry
            .iter()
            .find(|record| record.group == key && &record.site == site)
            .map(|record| record.expires_at)
            .unwrap_or(0)
    }

    /// Set or clear (`expires_at <= 0`) a membership expiry.
    pub fn set_membership_expiry(&self, group: &str, site: SiteKey, expires_at: i64) {
        {
            let mut state = self.state.write();
            let key = group.to_ascii_lowercase();
            state
                .membership_expiry
                .retain(|record| !(record.group == key && record.site == site));
            if expires_at > 0 {
                state.membership_expiry.push(MembershipExpiry {
                    group: key,
                    site,
                    expires_at,
                });
            }
        }
        self.invalidate();
        self.notify(EntityEvent::MembershipChanged);
    }

    pub fn own_permissions(&self, site: &SiteKey) -> Vec<String> {
        self.state.read().entity.permissions(site)
    }

    pub fn set_permissions(&self, site: SiteKey, permissions: Vec<String>) {
        self.state.write().entity.set_permissions(site, permissions);
        self.invalidate();
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn add_permission(&self, site: SiteKey, permission: &str) {
        self.state.write().entity.add_permission(site, permission);
        self.invalidate();
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn remove_permission(&self, site: &SiteKey, permission: &str) {
        self.state.write().entity.remove_permission(site, permission);
        self.invalidate();
        self.notify(EntityEvent::PermissionsChanged);
    }

    /// Live timed permissions for `site`, evicting expired grants.
    pub fn timed_permissions(&self, site: &SiteKey) -> Vec<String> {
        let now = clock::epoch_seconds();
        let (live, evicted) = {
            let mut state = self.state.write();
            let evicted = state.entity.evict_expired_timed(now);
            (state.entity.timed_permissions(site, now), evicted)
        };
        if evicted {
            tracing::debug!(user = %self.name, "expired timed permissions evicted");
            self.invalidate();
        }
        live
    }

    pub fn add_timed_permission(&self, permission: &str, site: SiteKey, lifetime: i64) {
        let expires_at = if lifetime > 0 { clock::epoch_seconds() + lifetime } else { 0 };
        self.state.write().entity.add_timed_permission(permission, site, expires_at);
        self.invalidate();
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn remove_timed_permission(&self, site: &SiteKey, permission: &str) {
        self.state.write().entity.remove_timed_permission(site, permission);
        self.invalidate();
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn timed_permission_lifetime(&self, site: &SiteKey, permission: &str) -> i64 {
        self.state
            .read()
            .entity
            .timed_permission_lifetime(site, permission, clock::epoch_seconds())
    }

    pub fn own_option(&self, site: &SiteKey, name: &str) -> Option<String> {
        self.state.read().entity.option(site, name)
    }

    pub fn set_option(&self, site: SiteKey, name: &str, value: Option<String>) {
        self.state.write().entity.set_option(site, name, value);
        self.invalidate();
        self.notify(EntityEvent::OptionsChanged);
    }

    pub fn own_prefix(&self, site: &SiteKey) -> Option<String> {
        self.state.read().entity.prefix(site)
    }

    pub fn set_prefix(&self, site: SiteKey, prefix: Option<String>) {
        self.state.write().entity.set_prefix(site, prefix);
        self.invalidate();
        self.notify(EntityEvent::InfoChanged);
    }

    pub fn own_suffix(&self, site: &SiteKey) -> Option<String> {
        self.state.read().entity.suffix(site)
    }

    pub fn set_suffix(&self, site: SiteKey, suffix: Option<String>) {
        self.state.write().entity.set_suffix(site, suffix);
        self.invalidate();
        self.notify(EntityEvent::InfoChanged);
    }

    /// Sites where this user declares any raw state.
    pub fn sites(&self) -> Vec<SiteId> {
        let state = self.state.read();
        let mut sites = state.entity.sites();
        sites.extend(state.memberships.keys().filter_map(|key| key.clone()));
        sites.sort();
        sites.dedup();
        sites
    }

    /// Snapshot of the persistent state, for a backing store.
    pub fn export(&self) -> UserState {
        self.state.read().clone()
    }

    /// Replace the persistent state, as loaded from a backing store.
    pub fn import(&self, state: UserState) {
        *self.state.write() = state;
        self.invalidate();
    }

    /// Drop every memoized resolution result.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub fn save(&self) {
        self.invalidate();
        self.notify(EntityEvent::Saved);
    }

    pub(crate) fn notify(&self, event: EntityEvent) {
        self.sink.notify(&self.name, event);
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for User {}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::events::NoopSink;
    use warden_core::id::site;

    fn user(name: &str) -> User {
        User::new(name, Arc::new(NoopSink))
    }

    #[test]
    fn test_membership_expiry_roundtrip() {
        let u = user("bob");
        assert_eq!(u.membership_expiry("vip", &None), 0);

        u.set_membership_expiry("vip", None, 12345);
        assert_eq!(u.membership_expiry("vip", &None), 12345);
        // lookups are case-insensitive like the registry itself
        assert_eq!(u.membership_expiry("VIP", &None), 12345);

        u.set_membership_expiry("vip", None, 0);
        assert_eq!(u.membership_expiry("vip", &None), 0);
    }

    #[test]
    fn test_remove_group_name_clears_expiry() {
        let u = user("bob");
        u.set_group_names(None, vec!["vip".to_owned(), "member".to_owned()]);
        u.set_membership_expiry("vip", None, 99);

        u.remove_group_name(&None, "VIP");
        assert_eq!(u.raw_group_names(&None), vec!["member"]);
        assert_eq!(u.membership_expiry("vip", &None), 0);
    }

    #[test]
    fn test_state_json_round_trip() {
        let u = user("bob");
        u.set_group_names(None, vec!["vip".to_owned()]);
        u.set_group_names(site("shop"), vec!["builder".to_owned()]);
        u.set_membership_expiry("vip", None, 12345);
        u.set_permissions(None, vec!["chat".to_owned()]);
        u.set_option(site("shop"), "color", Some("red".to_owned()));
        u.set_prefix(None, Some("[B]".to_owned()));

        let json = serde_json::to_string(&u.export()).unwrap();
        let restored: UserState = serde_json::from_str(&json).unwrap();

        let copy = user("bob");
        copy.import(restored);
        assert_eq!(copy.raw_group_names(&None), vec!["vip"]);
        assert_eq!(copy.raw_group_names(&site("shop")), vec!["builder"]);
        assert_eq!(copy.membership_expiry("vip", &None), 12345);
        assert_eq!(copy.own_permissions(&None), vec!["chat"]);
        assert_eq!(copy.own_option(&site("shop"), "color"), Some("red".to_owned()));
        assert_eq!(copy.own_prefix(&None), Some("[B]".to_owned()));
    }

    #[test]
    fn test_mutation_invalidates_cache() {
        let u = user("bob");
        u.cache().store_permissions(None, vec!["x".to_owned()]);
        u.set_prefix(None, Some("[B]".to_owned()));
        assert_eq!(u.cache().permissions(&None), None);

        u.cache().store_prefix(site("a"), "[A]".to_owned());
        u.add_timed_permission("fly", None, 60);
        assert_eq!(u.cache().prefix(&site("a")), None);
    }
}
