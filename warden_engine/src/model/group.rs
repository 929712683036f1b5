//! Groups: rankable permission entities that other entities inherit
//! from.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use warden_core::events::{EntityEvent, NotificationSink};
use warden_core::id::{SiteId, SiteKey};

use super::entity::EntityData;
use crate::clock;

/// Persistent state of a group.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroupState {
    pub entity: EntityData,
    /// Ladder position; 0 means the group holds no rank. Higher is
    /// more senior.
    pub rank: i64,
    /// Ladder this group participates in; a group is ranked only when
    /// this is set and `rank > 0`.
    pub rank_ladder: Option<String>,
    /// Parent group names per site key.
    #[serde(with = "super::entity::site_map")]
    pub parents: HashMap<SiteKey, Vec<String>>,
}

/// A group of permissions that users (and other groups) inherit.
///
/// Shared as `Arc<Group>` out of the registry; all state sits behind a
/// single lock so readers see a consistent snapshot per access.
pub struct Group {
    name: String,
    state: RwLock<GroupState>,
    sink: Arc<dyn NotificationSink>,
}

impl Group {
    pub fn new(name: impl Into<String>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(GroupState::default()),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> i64 {
        self.state.read().rank
    }

    pub fn set_rank(&self, rank: i64) {
        self.state.write().rank = rank.max(0);
        self.notify(EntityEvent::RankChanged);
    }

    pub fn rank_ladder(&self) -> Option<String> {
        self.state.read().rank_ladder.clone()
    }

    pub fn set_rank_ladder(&self, ladder: Option<String>) {
        self.state.write().rank_ladder = ladder.filter(|l| !l.is_empty());
        self.notify(EntityEvent::RankChanged);
    }

    /// Whether this group participates in a rank ladder.
    pub fn is_ranked(&self) -> bool {
        let state = self.state.read();
        state.rank > 0 && state.rank_ladder.is_some()
    }

    /// Direct parent group names declared for `site`, unresolved.
    pub fn raw_parent_names(&self, site: &SiteKey) -> Vec<String> {
        self.state.read().parents.get(site).cloned().unwrap_or_default()
    }

    pub fn set_parent_names(&self, site: SiteKey, names: Vec<String>) {
        {
            let mut state = self.state.write();
            if names.is_empty() {
                state.parents.remove(&site);
            } else {
                state.parents.insert(site, names);
            }
        }
        self.notify(EntityEvent::InheritanceChanged);
    }

    pub fn own_permissions(&self, site: &SiteKey) -> Vec<String> {
        self.state.read().entity.permissions(site)
    }

    pub fn set_permissions(&self, site: SiteKey, permissions: Vec<String>) {
        self.state.write().entity.set_permissions(site, permissions);
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn add_permission(&self, site: SiteKey, permission: &str) {
        self.state.write().entity.add_permission(site, permission);
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn remove_permission(&self, site: &SiteKey, permission: &str) {
        self.state.write().entity.remove_permission(site, permission);
        self.notify(EntityEvent::PermissionsChanged);
    }

    /// Live timed permissions for `site`, evicting expired grants.
    pub fn timed_permissions(&self, site: &SiteKey) -> Vec<String> {
        let now = clock::epoch_seconds();
        let mut state = self.state.write();
        if state.entity.evict_expired_timed(now) {
            tracing::debug!(group = %self.name, "expired timed permissions evicted");
        }
        state.entity.timed_permissions(site, now)
    }

    pub fn add_timed_permission(&self, permission: &str, site: SiteKey, lifetime: i64) {
        let expires_at = if lifetime > 0 { clock::epoch_seconds() + lifetime } else { 0 };
        self.state.write().entity.add_timed_permission(permission, site, expires_at);
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn remove_timed_permission(&self, site: &SiteKey, permission: &str) {
        self.state.write().entity.remove_timed_permission(site, permission);
        self.notify(EntityEvent::PermissionsChanged);
    }

    pub fn own_option(&self, site: &SiteKey, name: &str) -> Option<String> {
        self.state.read().entity.option(site, name)
    }

    pub fn set_option(&self, site: SiteKey, name: &str, value: Option<String>) {
        self.state.write().entity.set_option(site, name, value);
        self.notify(EntityEvent::OptionsChanged);
    }

    pub fn own_prefix(&self, site: &SiteKey) -> Option<String> {
        self.state.read().entity.prefix(site)
    }

    pub fn set_prefix(&self, site: SiteKey, prefix: Option<String>) {
        self.state.write().entity.set_prefix(site, prefix);
        self.notify(EntityEvent::InfoChanged);
    }

    pub fn own_suffix(&self, site: &SiteKey) -> Option<String> {
        self.state.read().entity.suffix(site)
    }

    pub fn set_suffix(&self, site: SiteKey, suffix: Option<String>) {
        self.state.write().entity.set_suffix(site, suffix);
        self.notify(EntityEvent::InfoChanged);
    }

    /// Sites where this group declares any raw state.
    pub fn sites(&self) -> Vec<SiteId> {
        let state = self.state.read();
        let mut sites = state.entity.sites();
        sites.extend(state.parents.keys().filter_map(|key| key.clone()));
        sites.sort();
        sites.dedup();
        sites
    }

    /// Snapshot of the persistent state, for a backing store.
    pub fn export(&self) -> GroupState {
        self.state.read().clone()
    }

    /// Replace the persistent state, as loaded from a backing store.
    pub fn import(&self, state: GroupState) {
        *self.state.write() = state;
    }

    pub fn save(&self) {
        self.notify(EntityEvent::Saved);
    }

    fn notify(&self, event: EntityEvent) {
        self.sink.notify(&self.name, event);
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Group {}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("rank", &self.rank())
            .finish()
    }
}
