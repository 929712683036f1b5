//! Group, permission, prefix/suffix and option resolution.
//!
//! Resolution is a pure function of current registry state: stampeding
//! recomputation is tolerated, and cycle avoidance (visited sets for
//! group walks, already-present checks for child expansion) is the
//! correctness mechanism, never a recursion-depth limit.

use std::collections::HashSet;
use std::sync::Arc;

use warden_core::id::SiteKey;

use crate::clock;
use crate::model::{Group, User};

use super::PermissionRegistry;

/// Own permissions carrying this marker are visible to the declaring
/// group but never inherited by its children or members.
const NON_INHERITABLE_PREFIX: char = '#';

impl PermissionRegistry {
    /// Effective groups of `user` at `site`: declared memberships
    /// (expired ones lazily evicted), then memberships inherited from
    /// ancestor sites and the common scope, deduplicated by group
    /// identity, rank-sorted, with the configured default group as a
    /// fallback when nothing else applies.
    pub fn resolve_groups(&self, user: &User, site: &SiteKey) -> Vec<Arc<Group>> {
        if let Some(cached) = user.cache().groups(site) {
            return cached;
        }

        let mut groups = Vec::new();
        self.collect_groups(user, site, &mut groups);

        if groups.is_empty() {
            if let Some(fallback) = self.default_group(site) {
                groups.push(fallback);
            }
        }

        if groups.len() > 1 {
            groups.sort_by_key(|group| group.rank());
        }

        user.cache().store_groups(site.clone(), groups.clone());
        groups
    }

    fn collect_groups(&self, user: &User, site: &SiteKey, out: &mut Vec<Arc<Group>>) {
        for raw in user.raw_group_names(site) {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let Some(group) = self.group(name) else {
                tracing::warn!(user = user.name(), group = name, "membership references missing group");
                continue;
            };
            if !self.check_membership(user, &group, site) {
                continue;
            }
            push_unique(out, group);
        }

        if let Some(site_id) = site {
            for parent in self.sites.ancestors_of(site_id) {
                self.collect_groups(user, &Some(parent), out);
            }
            self.collect_groups(user, &None, out);
        }
    }

    /// Whether `user`'s membership in `group` at `site` is still
    /// valid. An expired membership is evicted on the spot: the expiry
    /// record and the membership itself are removed and the user's
    /// cache invalidated.
    pub fn check_membership(&self, user: &User, group: &Group, site: &SiteKey) -> bool {
        let expires_at = user.membership_expiry(group.name(), site);
        if expires_at > 0 && expires_at < clock::epoch_seconds() {
            tracing::debug!(
                user = user.name(),
                group = group.name(),
                "membership expired, evicting"
            );
            user.set_membership_expiry(group.name(), site.clone(), 0);
            user.remove_group_name(site, group.name());
            user.invalidate();
            return false;
        }
        true
    }

    /// Effective permission tokens of `user` at `site`, negations
    /// included, with registry child nodes expanded.
    pub fn resolve_permissions(&self, user: &User, site: &SiteKey) -> Vec<String> {
        if let Some(cached) = user.cache().permissions(site) {
            return cached;
        }

        let mut permissions = Vec::new();
        self.user_permissions_into(user, site, &mut permissions, true, false);

        user.cache().store_permissions(site.clone(), permissions.clone());
        permissions
    }

    fn user_permissions_into(
        &self,
        user: &User,
        site: &SiteKey,
        out: &mut Vec<String>,
        group_inheritance: bool,
        site_inheritance: bool,
    ) {
        out.extend(user.timed_permissions(site));
        out.extend(user.own_permissions(site));

        if let Some(site_id) = site {
            for parent in self.sites.ancestors_of(site_id) {
                self.user_permissions_into(user, &Some(parent), out, false, true);
            }
            // common scope, unless already inside the site-inheritance walk
            if !site_inheritance {
                self.user_permissions_into(user, &None, out, false, true);
            }
        }

        if group_inheritance {
            for group in self.resolve_groups(user, site) {
                let mut visited = HashSet::new();
                self.group_permissions_into(&group, site, out, true, false, &mut visited);
            }
        }

        // child expansion over a snapshot; the list grows as we go
        for token in out.clone() {
            self.expand_children(&token, out, false);
        }
    }

    /// Effective permissions of a group (no child expansion; that
    /// happens only at the user boundary).
    pub fn resolve_group_permissions(&self, group: &Arc<Group>, site: &SiteKey) -> Vec<String> {
        let mut permissions = Vec::new();
        let mut visited = HashSet::new();
        self.group_permissions_into(group, site, &mut permissions, true, false, &mut visited);
        permissions
    }

    fn group_permissions_into(
        &self,
        group: &Arc<Group>,
        site: &SiteKey,
        out: &mut Vec<String>,
        group_inheritance: bool,
        site_inheritance: bool,
        visited: &mut HashSet<String>,
    ) {
        if visited.is_empty() {
            out.extend(group.timed_permissions(site));
            out.extend(group.own_permissions(site));
        } else {
            // reached through inheritance: non-inheritable tokens stay behind
            out.extend(inheritable(group.timed_permissions(site)));
            out.extend(inheritable(group.own_permissions(site)));
        }

        if let Some(site_id) = site {
            for parent in self.sites.ancestors_of(site_id) {
                self.group_permissions_into(group, &Some(parent), out, false, true, visited);
            }
            if !site_inheritance {
                self.group_permissions_into(group, &None, out, false, true, visited);
            }
        }

        let key = group.name().to_ascii_lowercase();
        if group_inheritance && !visited.contains(&key) {
            visited.insert(key);
            for parent in self.parent_groups(group, site) {
                self.group_permissions_into(&parent, site, out, true, false, visited);
            }
        }
    }

    /// Expand the child tokens a permission node implies, flipping
    /// polarity through negations. `invert` carries the negation
    /// context accumulated so far; a `-` prefix on `token` flips it
    /// again, so double negation restores the original polarity.
    fn expand_children(&self, token: &str, out: &mut Vec<String>, invert: bool) {
        let (name, invert) = match token.strip_prefix('-') {
            Some(rest) => (rest, !invert),
            None => (token, invert),
        };

        let Some(node) = self.nodes.lookup(name) else { return };

        for (child, polarity) in node.children() {
            let has = *polarity ^ invert;
            let emitted = if has { child.clone() } else { format!("-{child}") };
            // the already-present check both dedups and terminates
            // expansion under cyclic child graphs
            if !out.contains(&emitted) {
                out.push(emitted.clone());
                self.expand_children(&emitted, out, !has);
            }
        }
    }

    /// Resolved parent groups of `group` at `site`: declared parents
    /// (blank, self and cycle-forming names skipped), ancestor-site
    /// and common-scope parents, deduplicated and rank-sorted.
    pub fn parent_groups(&self, group: &Arc<Group>, site: &SiteKey) -> Vec<Arc<Group>> {
        let mut parents = Vec::new();
        self.collect_parent_groups(group, site, &mut parents);
        parents.sort_by_key(|parent| parent.rank());
        parents
    }

    fn collect_parent_groups(&self, group: &Arc<Group>, site: &SiteKey, out: &mut Vec<Arc<Group>>) {
        for raw in group.raw_parent_names(site) {
            let name = raw.trim();
            if name.is_empty() || name.eq_ignore_ascii_case(group.name()) {
                continue;
            }
            let Some(parent) = self.group(name) else {
                tracing::warn!(group = group.name(), parent = name, "inheritance references missing group");
                continue;
            };
            if self.is_child_of(&parent, group, site, true) {
                tracing::warn!(
                    group = group.name(),
                    parent = parent.name(),
                    "cyclic inheritance truncated"
                );
                continue;
            }
            push_unique(out, parent);
        }

        if let Some(site_id) = site {
            for parent_site in self.sites.ancestors_of(site_id) {
                self.collect_parent_groups(group, &Some(parent_site), out);
            }
            self.collect_parent_groups(group, &None, out);
        }
    }

    /// Whether `group` descends from `ancestor` at `site`.
    /// `check_inheritance = false` restricts to direct parents.
    pub fn is_child_of(
        &self,
        group: &Group,
        ancestor: &Group,
        site: &SiteKey,
        check_inheritance: bool,
    ) -> bool {
        let mut visited = HashSet::new();
        self.is_child_of_guarded(group, ancestor, site, check_inheritance, &mut visited)
    }

    fn is_child_of_guarded(
        &self,
        group: &Group,
        ancestor: &Group,
        site: &SiteKey,
        check_inheritance: bool,
        visited: &mut HashSet<String>,
    ) -> bool {
        if !visited.insert(group.name().to_ascii_lowercase()) {
            return false;
        }

        let mut direct = Vec::new();
        self.direct_parents(group, site, &mut direct);

        for parent in &direct {
            if parent.as_ref() == ancestor {
                return true;
            }
        }
        if check_inheritance {
            for parent in &direct {
                if self.is_child_of_guarded(parent, ancestor, site, true, visited) {
                    return true;
                }
            }
        }
        false
    }

    /// Declared parents without the cycle filter; the caller guards.
    fn direct_parents(&self, group: &Group, site: &SiteKey, out: &mut Vec<Arc<Group>>) {
        for raw in group.raw_parent_names(site) {
            let name = raw.trim();
            if name.is_empty() || name.eq_ignore_ascii_case(group.name()) {
                continue;
            }
            if let Some(parent) = self.group(name) {
                push_unique(out, parent);
            }
        }
        if let Some(site_id) = site {
            for parent_site in self.sites.ancestors_of(site_id) {
                self.direct_parents(group, &Some(parent_site), out);
            }
            self.direct_parents(group, &None, out);
        }
    }

    /// Whether `user` belongs to `group` at `site`, optionally through
    /// group inheritance.
    pub fn in_group(&self, user: &User, group: &Group, site: &SiteKey, check_inheritance: bool) -> bool {
        for member_of in self.resolve_groups(user, site) {
            if member_of.as_ref() == group {
                return true;
            }
            if check_inheritance && self.is_child_of(&member_of, group, site, true) {
                return true;
            }
        }
        false
    }

    /// Effective prefix: the user's own, else an ancestor site's, else
    /// the common scope's, else the first group prefix found.
    pub fn prefix(&self, user: &User, site: &SiteKey) -> String {
        if let Some(cached) = user.cache().prefix(site) {
            return cached;
        }

        let mut local = user.own_prefix(site).filter(|p| !p.is_empty());

        if site.is_some() && local.is_none() {
            if let Some(site_id) = site {
                for parent in self.sites.ancestors_of(site_id) {
                    local = user.own_prefix(&Some(parent)).filter(|p| !p.is_empty());
                    if local.is_some() {
                        break;
                    }
                }
            }
            if local.is_none() {
                local = user.own_prefix(&None).filter(|p| !p.is_empty());
            }
        }

        if local.is_none() {
            for group in self.resolve_groups(user, site) {
                let inherited = self.group_prefix(&group, site, &mut HashSet::new());
                if !inherited.is_empty() {
                    local = Some(inherited);
                    break;
                }
            }
        }

        let prefix = local.unwrap_or_default();
        user.cache().store_prefix(site.clone(), prefix.clone());
        prefix
    }

    /// Effective suffix, resolved like [`Self::prefix`].
    pub fn suffix(&self, user: &User, site: &SiteKey) -> String {
        if let Some(cached) = user.cache().suffix(site) {
            return cached;
        }

        let mut local = user.own_suffix(site).filter(|s| !s.is_empty());

        if site.is_some() && local.is_none() {
            if let Some(site_id) = site {
                for parent in self.sites.ancestors_of(site_id) {
                    local = user.own_suffix(&Some(parent)).filter(|s| !s.is_empty());
                    if local.is_some() {
                        break;
                    }
                }
            }
            if local.is_none() {
                local = user.own_suffix(&None).filter(|s| !s.is_empty());
            }
        }

        if local.is_none() {
            for group in self.resolve_groups(user, site) {
                let inherited = self.group_suffix(&group, site, &mut HashSet::new());
                if !inherited.is_empty() {
                    local = Some(inherited);
                    break;
                }
            }
        }

        let suffix = local.unwrap_or_default();
        user.cache().store_suffix(site.clone(), suffix.clone());
        suffix
    }

    pub fn group_prefix(&self, group: &Arc<Group>, site: &SiteKey, visited: &mut HashSet<String>) -> String {
        let mut local = group.own_prefix(site).filter(|p| !p.is_empty());

        if site.is_some() && local.is_none() {
            if let Some(site_id) = site {
                for parent in self.sites.ancestors_of(site_id) {
                    local = group.own_prefix(&Some(parent)).filter(|p| !p.is_empty());
                    if local.is_some() {
                        break;
                    }
                }
            }
            if local.is_none() {
                local = group.own_prefix(&None).filter(|p| !p.is_empty());
            }
        }

        if local.is_none() && visited.insert(group.name().to_ascii_lowercase()) {
            for parent in self.parent_groups(group, site) {
                let inherited = self.group_prefix(&parent, site, visited);
                if !inherited.is_empty() {
                    local = Some(inherited);
                    break;
                }
            }
        }

        local.unwrap_or_default()
    }

    pub fn group_suffix(&self, group: &Arc<Group>, site: &SiteKey, visited: &mut HashSet<String>) -> String {
        let mut local = group.own_suffix(site).filter(|s| !s.is_empty());

        if site.is_some() && local.is_none() {
            if let Some(site_id) = site {
                for parent in self.sites.ancestors_of(site_id) {
                    local = group.own_suffix(&Some(parent)).filter(|s| !s.is_empty());
                    if local.is_some() {
                        break;
                    }
                }
            }
            if local.is_none() {
                local = group.own_suffix(&None).filter(|s| !s.is_empty());
            }
        }

        if local.is_none() && visited.insert(group.name().to_ascii_lowercase()) {
            for parent in self.parent_groups(group, site) {
                let inherited = self.group_suffix(&parent, site, visited);
                if !inherited.is_empty() {
                    local = Some(inherited);
                    break;
                }
            }
        }

        local.unwrap_or_default()
    }

    /// Effective option value: own, then ancestor sites, then the
    /// common scope, then the user's groups. Found values are cached.
    pub fn option(&self, user: &User, name: &str, site: &SiteKey) -> Option<String> {
        if let Some(cached) = user.cache().option(site, name) {
            return Some(cached);
        }

        let found = self.option_uncached(user, name, site);
        if let Some(value) = &found {
            user.cache().store_option(site.clone(), name.to_owned(), value.clone());
        }
        found
    }

    fn option_uncached(&self, user: &User, name: &str, site: &SiteKey) -> Option<String> {
        if let Some(value) = user.own_option(site, name) {
            return Some(value);
        }

        if let Some(site_id) = site {
            for parent in self.sites.ancestors_of(site_id) {
                if let Some(value) = self.option(user, name, &Some(parent)) {
                    return Some(value);
                }
            }
            if let Some(value) = self.option(user, name, &None) {
                return Some(value);
            }
        }

        for group in self.resolve_groups(user, site) {
            if let Some(value) = self.group_option(&group, name, site, &mut HashSet::new()) {
                return Some(value);
            }
        }

        None
    }

    pub fn group_option(
        &self,
        group: &Arc<Group>,
        name: &str,
        site: &SiteKey,
        visited: &mut HashSet<String>,
    ) -> Option<String> {
        if let Some(value) = group.own_option(site, name) {
            return Some(value);
        }

        if let Some(site_id) = site {
            for parent in self.sites.ancestors_of(site_id) {
                if let Some(value) = self.group_option(group, name, &Some(parent), visited) {
                    return Some(value);
                }
            }
            if let Some(value) = self.group_option(group, name, &None, visited) {
                return Some(value);
            }
        }

        if visited.insert(group.name().to_ascii_lowercase()) {
            for parent in self.parent_groups(group, site) {
                if let Some(value) = self.group_option(&parent, name, site, visited) {
                    return Some(value);
                }
            }
        }

        None
    }

    /// First effective permission expression covering `permission`,
    /// memoized per `(site, permission)` including negative results.
    pub fn matching_expression(&self, user: &User, permission: &str, site: &SiteKey) -> Option<String> {
        if let Some(memo) = user.cache().matched_expression(site, permission) {
            return memo;
        }

        let result = self
            .resolve_permissions(user, site)
            .into_iter()
            .find(|expression| self.matcher.matches(expression, permission));

        user.cache()
            .store_matched_expression(site.clone(), permission.to_owned(), result.clone());
        result
    }

    /// Whether `user` holds `permission` at `site`. The empty
    /// permission is public access; an expression with a leading `-`
    /// denies.
    pub fn has(&self, user: &User, permission: &str, site: &SiteKey) -> bool {
        if permission.is_empty() {
            return true;
        }

        let expression = self.matching_expression(user, permission, site);
        if self.settings.debug {
            tracing::debug!(
                user = user.name(),
                permission,
                expression = expression.as_deref().unwrap_or("<none>"),
                "permission check"
            );
        }

        match expression {
            Some(expression) => !expression.starts_with('-'),
            None => false,
        }
    }
}

fn push_unique(out: &mut Vec<Arc<Group>>, group: Arc<Group>) {
    if !out.iter().any(|g| g.name().eq_ignore_ascii_case(group.name())) {
        out.push(group);
    }
}

fn inheritable(tokens: Vec<String>) -> impl Iterator<Item = String> {
    tokens
        .into_iter()
        .filter(|token| !token.starts_with(NON_INHERITABLE_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{fixture, Fixture};
    use std::collections::HashSet;
    use std::sync::Arc;
    use warden_core::id::site;
    use warden_core::traits::PermissionNode;

    use crate::clock;

    fn names(groups: &[Arc<crate::model::Group>]) -> Vec<&str> {
        groups.iter().map(|g| g.name()).collect()
    }

    #[test]
    fn test_resolve_groups_skips_blank_and_missing() {
        let f = fixture();
        f.registry.create_group("member");
        let bob = f.registry.create_user("bob");
        bob.set_group_names(
            None,
            vec!["".to_owned(), "  ".to_owned(), "ghost".to_owned(), "member".to_owned()],
        );

        assert_eq!(names(&f.registry.resolve_groups(&bob, &None)), vec!["member"]);
    }

    #[test]
    fn test_resolve_groups_deduplicates_across_sites() {
        let f = fixture();
        f.registry.create_group("member");
        f.registry.create_group("vip");
        f.sites
            .set_parents("shop.example.com".into(), vec!["example.com".into()]);

        let bob = f.registry.create_user("bob");
        bob.set_group_names(site("shop.example.com"), vec!["vip".to_owned()]);
        bob.set_group_names(site("example.com"), vec!["VIP".to_owned(), "member".to_owned()]);

        let groups = f.registry.resolve_groups(&bob, &site("shop.example.com"));
        let mut sorted = names(&groups);
        sorted.sort();
        assert_eq!(sorted, vec!["member", "vip"]);
    }

    #[test]
    fn test_resolve_groups_applies_fallback_only_when_empty() {
        let f = fixture();
        f.registry.create_group("default");
        f.registry.create_group("vip");
        f.registry.set_default_group(None, Some("default"));

        let fresh = f.registry.create_user("fresh");
        assert_eq!(names(&f.registry.resolve_groups(&fresh, &None)), vec!["default"]);

        let vip = f.registry.create_user("vip_user");
        vip.set_group_names(None, vec!["vip".to_owned()]);
        assert_eq!(names(&f.registry.resolve_groups(&vip, &None)), vec!["vip"]);
    }

    #[test]
    fn test_resolve_groups_sorted_by_rank() {
        let f = fixture();
        let a = f.registry.create_group("alpha");
        a.set_rank(50);
        let b = f.registry.create_group("beta");
        b.set_rank(10);

        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["alpha".to_owned(), "beta".to_owned()]);

        assert_eq!(names(&f.registry.resolve_groups(&bob, &None)), vec!["beta", "alpha"]);
    }

    #[test]
    fn test_expired_membership_evicted_once() {
        let f = fixture();
        f.registry.create_group("member");
        f.registry.create_group("vip");
        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["vip".to_owned(), "member".to_owned()]);
        bob.set_membership_expiry("vip", None, clock::epoch_seconds() - 1);

        assert_eq!(names(&f.registry.resolve_groups(&bob, &None)), vec!["member"]);
        // backing records were cleared, so a second resolve agrees
        assert_eq!(bob.raw_group_names(&None), vec!["member"]);
        assert_eq!(bob.membership_expiry("vip", &None), 0);
        assert_eq!(names(&f.registry.resolve_groups(&bob, &None)), vec!["member"]);
    }

    #[test]
    fn test_future_membership_survives() {
        let f = fixture();
        f.registry.create_group("vip");
        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["vip".to_owned()]);
        bob.set_membership_expiry("vip", None, clock::epoch_seconds() + 3600);

        assert_eq!(names(&f.registry.resolve_groups(&bob, &None)), vec!["vip"]);
    }

    #[test]
    fn test_permissions_follow_site_inheritance() {
        let f = fixture();
        f.sites
            .set_parents("shop.example.com".into(), vec!["example.com".into()]);
        let bob = f.registry.create_user("bob");
        bob.set_permissions(site("example.com"), vec!["buy".to_owned()]);

        assert!(f
            .registry
            .resolve_permissions(&bob, &site("shop.example.com"))
            .contains(&"buy".to_owned()));
        assert!(!f
            .registry
            .resolve_permissions(&bob, &site("other.example.com"))
            .contains(&"buy".to_owned()));
    }

    #[test]
    fn test_permissions_include_common_scope_once() {
        let f = fixture();
        let bob = f.registry.create_user("bob");
        bob.set_permissions(None, vec!["chat".to_owned()]);
        bob.set_permissions(site("a"), vec!["build".to_owned()]);

        let perms = f.registry.resolve_permissions(&bob, &site("a"));
        assert_eq!(perms, vec!["build", "chat"]);
    }

    #[test]
    fn test_group_permissions_inherited_with_cycle() {
        let f = fixture();
        let a = f.registry.create_group("a");
        a.set_permissions(None, vec!["from.a".to_owned()]);
        a.set_parent_names(None, vec!["b".to_owned()]);
        let b = f.registry.create_group("b");
        b.set_permissions(None, vec!["from.b".to_owned()]);
        b.set_parent_names(None, vec!["a".to_owned()]);

        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["a".to_owned()]);

        // direct 2-cycle terminates with a finite result
        let perms = f.registry.resolve_permissions(&bob, &None);
        assert!(perms.contains(&"from.a".to_owned()));
        let count_a = perms.iter().filter(|p| *p == "from.a").count();
        assert!(count_a <= 2);
    }

    #[test]
    fn test_non_inheritable_permissions_stay_with_group() {
        let f = fixture();
        let parent = f.registry.create_group("parent");
        parent.set_permissions(None, vec!["#secret".to_owned(), "shared".to_owned()]);
        let child = f.registry.create_group("child");
        child.set_parent_names(None, vec!["parent".to_owned()]);

        let own = f.registry.resolve_group_permissions(&parent, &None);
        assert!(own.contains(&"#secret".to_owned()));

        let inherited = f.registry.resolve_group_permissions(&child, &None);
        assert!(inherited.contains(&"shared".to_owned()));
        assert!(!inherited.contains(&"#secret".to_owned()));
    }

    #[test]
    fn test_child_expansion_polarity() {
        let f = fixture();
        f.nodes
            .register(PermissionNode::new("admin").with_child("admin.ban", true));
        let bob = f.registry.create_user("bob");
        bob.set_permissions(None, vec!["admin".to_owned()]);

        let perms = f.registry.resolve_permissions(&bob, &None);
        assert!(perms.contains(&"admin.ban".to_owned()));
    }

    #[test]
    fn test_child_expansion_negation_double_flip() {
        let f = fixture();
        // -P: child C (default true) flips to -C; C's own child D
        // (default true) flips back to D
        f.nodes.register(PermissionNode::new("p").with_child("c", true));
        f.nodes.register(PermissionNode::new("c").with_child("d", true));
        // and a child negated by default comes out positive under -P
        f.nodes
            .register(PermissionNode::new("q").with_child("c2", false));

        let bob = f.registry.create_user("bob");
        bob.set_permissions(None, vec!["-p".to_owned(), "-q".to_owned()]);

        let perms = f.registry.resolve_permissions(&bob, &None);
        assert!(perms.contains(&"-c".to_owned()));
        assert!(perms.contains(&"d".to_owned()));
        assert!(perms.contains(&"c2".to_owned()));
    }

    #[test]
    fn test_child_expansion_positive_keeps_polarity() {
        let f = fixture();
        f.nodes.register(PermissionNode::new("p").with_child("c", true));
        f.nodes.register(PermissionNode::new("c").with_child("d", true));

        let bob = f.registry.create_user("bob");
        bob.set_permissions(None, vec!["p".to_owned()]);

        let perms = f.registry.resolve_permissions(&bob, &None);
        assert!(perms.contains(&"c".to_owned()));
        assert!(perms.contains(&"d".to_owned()));
    }

    #[test]
    fn test_child_expansion_terminates_on_cycle() {
        let f = fixture();
        f.nodes.register(PermissionNode::new("x").with_child("y", true));
        f.nodes.register(PermissionNode::new("y").with_child("x", true));

        let bob = f.registry.create_user("bob");
        bob.set_permissions(None, vec!["x".to_owned()]);

        let perms = f.registry.resolve_permissions(&bob, &None);
        assert!(perms.contains(&"y".to_owned()));
    }

    #[test]
    fn test_idempotent_and_cache_transparent() {
        let f = fixture();
        f.registry.create_group("member");
        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["member".to_owned()]);
        bob.set_permissions(None, vec!["chat".to_owned()]);

        let cold = f.registry.resolve_permissions(&bob, &None);
        let warm = f.registry.resolve_permissions(&bob, &None);
        assert_eq!(cold, warm);

        bob.invalidate();
        let recomputed = f.registry.resolve_permissions(&bob, &None);
        assert_eq!(cold, recomputed);
    }

    #[test]
    fn test_prefix_falls_back_to_group() {
        let f = fixture();
        let member = f.registry.create_group("member");
        member.set_prefix(None, Some("[M]".to_owned()));
        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["member".to_owned()]);

        assert_eq!(f.registry.prefix(&bob, &None), "[M]");

        bob.set_prefix(None, Some("[B]".to_owned()));
        assert_eq!(f.registry.prefix(&bob, &None), "[B]");
    }

    #[test]
    fn test_prefix_site_inheritance() {
        let f = fixture();
        f.sites.set_parents("shop".into(), vec!["hq".into()]);
        let bob = f.registry.create_user("bob");
        bob.set_prefix(site("hq"), Some("[HQ]".to_owned()));

        assert_eq!(f.registry.prefix(&bob, &site("shop")), "[HQ]");
        assert_eq!(f.registry.suffix(&bob, &site("shop")), "");
    }

    #[test]
    fn test_option_resolution_order() {
        let f = fixture();
        let member = f.registry.create_group("member");
        member.set_option(None, "color", Some("green".to_owned()));
        f.sites.set_parents("shop".into(), vec!["hq".into()]);

        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["member".to_owned()]);

        // group value visible until something closer shadows it
        assert_eq!(f.registry.option(&bob, "color", &site("shop")), Some("green".to_owned()));

        bob.set_option(site("hq"), "color", Some("blue".to_owned()));
        assert_eq!(f.registry.option(&bob, "color", &site("shop")), Some("blue".to_owned()));

        bob.set_option(site("shop"), "color", Some("red".to_owned()));
        assert_eq!(f.registry.option(&bob, "color", &site("shop")), Some("red".to_owned()));

        assert_eq!(f.registry.option(&bob, "missing", &site("shop")), None);
    }

    #[test]
    fn test_group_option_cycle_terminates() {
        let f = fixture();
        let a = f.registry.create_group("a");
        a.set_parent_names(None, vec!["b".to_owned()]);
        let b = f.registry.create_group("b");
        b.set_parent_names(None, vec!["a".to_owned()]);

        let mut visited = HashSet::new();
        assert_eq!(f.registry.group_option(&a, "color", &None, &mut visited), None);
    }

    #[test]
    fn test_has_and_matching_expression() {
        let f = fixture();
        let bob = f.registry.create_user("bob");
        bob.set_permissions(None, vec!["-admin.ban".to_owned(), "admin.*".to_owned()]);

        // first match wins: the explicit negation sits before the glob
        assert!(!f.registry.has(&bob, "admin.ban", &None));
        assert!(f.registry.has(&bob, "admin.kick", &None));
        assert!(!f.registry.has(&bob, "chat.color", &None));
        // empty permission is public access
        assert!(f.registry.has(&bob, "", &None));

        assert_eq!(
            f.registry.matching_expression(&bob, "admin.kick", &None),
            Some("admin.*".to_owned())
        );
        // negative result memoized as a real None
        assert_eq!(f.registry.matching_expression(&bob, "chat.color", &None), None);
        assert_eq!(
            bob.cache().matched_expression(&None, "chat.color"),
            Some(None)
        );
    }

    #[test]
    fn test_in_group_through_inheritance() {
        let f = fixture();
        let base = f.registry.create_group("base");
        let vip = f.registry.create_group("vip");
        vip.set_parent_names(None, vec!["base".to_owned()]);

        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["vip".to_owned()]);

        assert!(f.registry.in_group(&bob, &vip, &None, false));
        assert!(f.registry.in_group(&bob, &base, &None, true));
        assert!(!f.registry.in_group(&bob, &base, &None, false));
    }

    #[test]
    fn test_is_child_of_direct_cycle_terminates() {
        let f = fixture();
        let a = f.registry.create_group("a");
        a.set_parent_names(None, vec!["b".to_owned()]);
        let b = f.registry.create_group("b");
        b.set_parent_names(None, vec!["a".to_owned()]);

        assert!(f.registry.is_child_of(&a, &b, &None, true));
        assert!(f.registry.is_child_of(&b, &a, &None, true));
    }

    fn cycle_fixture() -> Fixture {
        let f = fixture();
        let a = f.registry.create_group("a");
        a.set_parent_names(None, vec!["b".to_owned()]);
        let b = f.registry.create_group("b");
        b.set_parent_names(None, vec!["a".to_owned()]);
        f
    }

    #[test]
    fn test_resolve_groups_finite_under_cycle() {
        let f = cycle_fixture();
        let bob = f.registry.create_user("bob");
        bob.set_group_names(None, vec!["a".to_owned(), "b".to_owned()]);

        let groups = f.registry.resolve_groups(&bob, &None);
        assert_eq!(groups.len(), 2);
    }
}
