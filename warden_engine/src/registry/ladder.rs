//! Rank-ladder queries and promote/demote transitions.
//!
//! Ranks are positive, and a higher rank is more senior. A group
//! participates in a ladder only when it names the ladder and carries
//! a positive rank. Promote and demote are serialized per user; the
//! membership swap happens in the user's global group list.

use std::collections::HashMap;
use std::sync::Arc;

use warden_core::error::{RankingError, Result};
use warden_core::events::EntityEvent;

use crate::model::{Group, User};

use super::PermissionRegistry;

impl PermissionRegistry {
    /// Ladders the user holds a rank in, mapped to the group granting
    /// it. When several resolved groups share a ladder, the first one
    /// wins.
    pub fn user_rank_ladders(&self, user: &User) -> HashMap<String, Arc<Group>> {
        let mut ladders = HashMap::new();
        for group in self.resolve_groups(user, &None) {
            if !group.is_ranked() {
                continue;
            }
            if let Some(ladder) = group.rank_ladder() {
                ladders.entry(ladder.to_ascii_lowercase()).or_insert(group);
            }
        }
        ladders
    }

    /// The group granting the user its rank in `ladder`, if any.
    pub fn ladder_group(&self, user: &User, ladder: &str) -> Option<Arc<Group>> {
        let ladder = self.normalize_ladder(ladder);
        self.user_rank_ladders(user).remove(&ladder)
    }

    /// The user's rank in `ladder`, 0 when unranked.
    pub fn rank_in_ladder(&self, user: &User, ladder: &str) -> i64 {
        self.ladder_group(user, ladder).map_or(0, |group| group.rank())
    }

    pub fn is_user_ranked(&self, user: &User, ladder: &str) -> bool {
        self.ladder_group(user, ladder).is_some()
    }

    /// The group holding `rank` in `ladder`. Unlike resolution, this
    /// explicit lookup fails on a missing entry.
    pub fn ladder_rank_group(&self, ladder: &str, rank: i64) -> Result<Arc<Group>> {
        let ladder = self.normalize_ladder(ladder);
        let group = self.rank_ladder(&ladder).remove(&rank).ok_or_else(|| {
            RankingError::MissingLadderGroup {
                ladder: ladder.clone(),
                rank,
            }
        })?;
        Ok(group)
    }

    /// Move `user` one step up `ladder`, to the closest group ranked
    /// above its current one. A ranked promoter bounds the step: the
    /// target must stay strictly below the promoter's own rank.
    pub fn promote(&self, user: &User, promoter: Option<&User>, ladder: &str) -> Result<Arc<Group>> {
        self.shift(user, promoter, ladder, true)
    }

    /// Move `user` one step down `ladder`, the mirror of
    /// [`Self::promote`].
    pub fn demote(&self, user: &User, promoter: Option<&User>, ladder: &str) -> Result<Arc<Group>> {
        self.shift(user, promoter, ladder, false)
    }

    fn shift(
        &self,
        user: &User,
        promoter: Option<&User>,
        ladder: &str,
        up: bool,
    ) -> Result<Arc<Group>> {
        let ladder = self.normalize_ladder(ladder);
        let _guard = user.rank_guard();

        let source = self.ladder_group(user, &ladder).ok_or_else(|| {
            RankingError::NotInLadder {
                user: user.name().to_owned(),
                ladder: ladder.clone(),
            }
        })?;
        let user_rank = source.rank();

        // an absent or unranked promoter is unconstrained
        let promoter_rank = promoter.and_then(|p| self.rank_in_ladder_opt(p, &ladder));
        if let (Some(promoter), Some(promoter_rank)) = (promoter, promoter_rank) {
            if promoter_rank <= user_rank {
                return Err(RankingError::InsufficientRank {
                    user: user.name().to_owned(),
                    promoter: promoter.name().to_owned(),
                    ladder,
                }
                .into());
            }
        }

        let table = self.rank_ladder(&ladder);
        let within_bound = |rank: i64| promoter_rank.map_or(true, |bound| rank < bound);
        let target = if up {
            table
                .iter()
                .find(|(rank, _)| **rank > user_rank && within_bound(**rank))
        } else {
            table
                .iter()
                .rev()
                .find(|(rank, _)| **rank < user_rank && within_bound(**rank))
        };
        let Some((_, target)) = target else {
            return Err(RankingError::NoTargetGroup {
                user: user.name().to_owned(),
                ladder,
                direction: if up { "above" } else { "below" },
            }
            .into());
        };

        self.swap_groups(user, &source, target);
        user.notify(EntityEvent::RankChanged);
        tracing::info!(
            user = user.name(),
            ladder = ladder.as_str(),
            from = source.name(),
            to = target.name(),
            "rank changed"
        );
        Ok(Arc::clone(target))
    }

    fn rank_in_ladder_opt(&self, user: &User, ladder: &str) -> Option<i64> {
        self.ladder_group(user, ladder).map(|group| group.rank())
    }

    fn swap_groups(&self, user: &User, source: &Group, target: &Group) {
        let mut names = user.raw_group_names(&None);
        names.retain(|name| !name.eq_ignore_ascii_case(source.name()));
        if self.settings.user_add_groups_last {
            names.push(target.name().to_owned());
        } else {
            names.insert(0, target.name().to_owned());
        }
        user.set_group_names(None, names);
    }

    fn normalize_ladder(&self, ladder: &str) -> String {
        if ladder.trim().is_empty() {
            self.settings.default_ladder.clone()
        } else {
            ladder.to_ascii_lowercase()
        }
    }
}
