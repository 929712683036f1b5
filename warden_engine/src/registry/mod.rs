//! The permission registry: the explicit, passed-in context object
//! that owns every group and user and drives resolution.
//!
//! All resolution entry points live on [`PermissionRegistry`];
//! entities never reach back into the registry themselves, which keeps
//! ownership acyclic and lets tests run isolated registries side by
//! side.

mod ladder;
mod resolve;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use warden_core::error::RegistryError;
use warden_core::events::{EntityEvent, NotificationSink};
use warden_core::id::SiteKey;
use warden_core::traits::{NodeSource, PermissionMatcher, SiteInheritance};

use crate::config::RegistrySettings;
use crate::model::{Group, User};

/// Registry of groups, users and per-site defaults, plus the
/// collaborator handles resolution needs.
pub struct PermissionRegistry {
    pub(crate) users: DashMap<String, Arc<User>>,
    pub(crate) groups: DashMap<String, Arc<Group>>,
    pub(crate) default_groups: RwLock<HashMap<SiteKey, String>>,
    pub(crate) sites: Arc<dyn SiteInheritance>,
    pub(crate) nodes: Arc<dyn NodeSource>,
    pub(crate) matcher: Arc<dyn PermissionMatcher>,
    pub(crate) sink: Arc<dyn NotificationSink>,
    pub(crate) settings: RegistrySettings,
}

impl PermissionRegistry {
    pub fn new(
        settings: RegistrySettings,
        sites: Arc<dyn SiteInheritance>,
        nodes: Arc<dyn NodeSource>,
        matcher: Arc<dyn PermissionMatcher>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            users: DashMap::new(),
            groups: DashMap::new(),
            default_groups: RwLock::new(HashMap::new()),
            sites,
            nodes,
            matcher,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Get or create the group with this name.
    pub fn create_group(&self, name: &str) -> Arc<Group> {
        self.groups
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(Group::new(name, self.sink.clone())))
            .clone()
    }

    /// Look up a group; blank or unknown names resolve to `None`.
    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        if name.is_empty() {
            return None;
        }
        self.groups.get(&name.to_ascii_lowercase()).map(|entry| entry.clone())
    }

    pub fn require_group(&self, name: &str) -> Result<Arc<Group>, RegistryError> {
        self.group(name).ok_or_else(|| RegistryError::MissingGroup(name.to_owned()))
    }

    pub fn groups(&self) -> Vec<Arc<Group>> {
        self.groups.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Remove a group: detach it from every child group and every
    /// user, drop any default-group binding, then forget it.
    pub fn remove_group(&self, name: &str) {
        let Some(group) = self.group(name) else { return };

        for other in self.groups() {
            if other.name().eq_ignore_ascii_case(group.name()) {
                continue;
            }
            let mut keys: Vec<SiteKey> = other.sites().into_iter().map(Some).collect();
            keys.push(None);
            for key in keys {
                let mut parents = other.raw_parent_names(&key);
                let before = parents.len();
                parents.retain(|p| !p.trim().eq_ignore_ascii_case(group.name()));
                if parents.len() != before {
                    other.set_parent_names(key, parents);
                }
            }
        }

        for user in self.users() {
            let mut keys: Vec<SiteKey> = user.sites().into_iter().map(Some).collect();
            keys.push(None);
            for key in keys {
                user.remove_group_name(&key, group.name());
            }
        }

        self.default_groups
            .write()
            .retain(|_, default| !default.eq_ignore_ascii_case(group.name()));

        self.groups.remove(&group.name().to_ascii_lowercase());
        self.sink.notify(group.name(), EntityEvent::Removed);
    }

    /// Get or create the user with this name.
    pub fn create_user(&self, name: &str) -> Arc<User> {
        self.users
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(User::new(name, self.sink.clone())))
            .clone()
    }

    pub fn user(&self, name: &str) -> Option<Arc<User>> {
        if name.is_empty() {
            return None;
        }
        self.users.get(&name.to_ascii_lowercase()).map(|entry| entry.clone())
    }

    pub fn require_user(&self, name: &str) -> Result<Arc<User>, RegistryError> {
        self.user(name).ok_or_else(|| RegistryError::MissingUser(name.to_owned()))
    }

    pub fn users(&self) -> Vec<Arc<User>> {
        self.users.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn remove_user(&self, name: &str) {
        if let Some((_, user)) = self.users.remove(&name.to_ascii_lowercase()) {
            user.invalidate();
            self.sink.notify(user.name(), EntityEvent::Removed);
        }
    }

    /// Add a membership for `user`. The `user_add_groups_last`
    /// setting decides whether the new name lands at the end or the
    /// front of the list; an existing membership is left in place.
    pub fn add_user_group(&self, user: &User, group: &str, site: SiteKey) {
        let group = group.trim();
        if group.is_empty() {
            return;
        }
        let mut names = user.raw_group_names(&site);
        if names.iter().any(|name| name.eq_ignore_ascii_case(group)) {
            return;
        }
        if self.settings.user_add_groups_last {
            names.push(group.to_owned());
        } else {
            names.insert(0, group.to_owned());
        }
        user.set_group_names(site, names);
    }

    /// Add a membership that expires after `lifetime` seconds;
    /// `lifetime <= 0` grants it permanently.
    pub fn add_user_group_for(&self, user: &User, group: &str, site: SiteKey, lifetime: i64) {
        self.add_user_group(user, group, site.clone());
        let expires_at = if lifetime > 0 {
            crate::clock::epoch_seconds() + lifetime
        } else {
            0
        };
        user.set_membership_expiry(group.trim(), site, expires_at);
    }

    /// Bind the fallback group for a site key; `None` unbinds.
    pub fn set_default_group(&self, site: SiteKey, group: Option<&str>) {
        let mut defaults = self.default_groups.write();
        match group {
            Some(name) => {
                defaults.insert(site, name.to_owned());
            }
            None => {
                defaults.remove(&site);
            }
        }
    }

    /// Fallback group for `site`: the site's own binding, else the
    /// nearest ancestor site's, else the common-scope binding.
    pub fn default_group(&self, site: &SiteKey) -> Option<Arc<Group>> {
        let common = match self.default_groups.read().get(&None) {
            Some(name) => self.group(name),
            None => None,
        };
        self.default_group_at(site, common)
    }

    fn default_group_at(&self, site: &SiteKey, fallback: Option<Arc<Group>>) -> Option<Arc<Group>> {
        if let Some(name) = self.default_groups.read().get(site) {
            if let Some(group) = self.group(name) {
                return Some(group);
            }
            tracing::warn!(default = %name, "default group binding references missing group");
        }

        if let Some(site_id) = site {
            for parent in self.sites.ancestors_of(site_id) {
                if let Some(group) = self.default_group_at(&Some(parent), None) {
                    return Some(group);
                }
            }
        }

        fallback
    }

    /// Snapshot of a ladder as `rank -> group`, ascending by rank.
    ///
    /// Built fresh per call so a concurrent rank mutation is never
    /// observed as a partially updated table.
    pub fn rank_ladder(&self, ladder: &str) -> BTreeMap<i64, Arc<Group>> {
        let mut table = BTreeMap::new();
        for group in self.groups() {
            if !group.is_ranked() {
                continue;
            }
            match group.rank_ladder() {
                Some(name) if name.eq_ignore_ascii_case(ladder) => {
                    table.insert(group.rank(), group);
                }
                _ => {}
            }
        }
        table
    }

    /// Clear every per-user cache.
    pub fn invalidate_user_caches(&self) {
        for user in self.users() {
            user.invalidate();
        }
    }

    /// Clear the caches of direct members of `group`.
    ///
    /// Group mutations do not invalidate member caches on their own
    /// (the staleness window is a documented constraint); callers that
    /// mutate a group and want fresh reads call this.
    pub fn invalidate_member_caches(&self, group: &Group) {
        for user in self.users() {
            if self.is_direct_member(&user, group) {
                user.invalidate();
            }
        }
    }

    fn is_direct_member(&self, user: &User, group: &Group) -> bool {
        let mut keys: Vec<SiteKey> = user.sites().into_iter().map(Some).collect();
        keys.push(None);
        keys.iter().any(|key| {
            user.raw_group_names(key)
                .iter()
                .any(|name| name.trim().eq_ignore_ascii_case(group.name()))
        })
    }
}
