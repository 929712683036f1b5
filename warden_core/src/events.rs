//! Entity mutation events and the notification seam.
//!
//! The engine fires an event after every mutating entry point; delivery
//! semantics (sync/async, ordering, fan-out) belong to the sink.

use serde::{Deserialize, Serialize};

/// What happened to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityEvent {
    /// Entity state was persisted.
    Saved,
    /// Entity was removed from the registry.
    Removed,
    /// Raw or timed permissions changed.
    PermissionsChanged,
    /// Group memberships of a user changed.
    MembershipChanged,
    /// Parent groups of a group changed.
    InheritanceChanged,
    /// Options changed.
    OptionsChanged,
    /// Prefix or suffix changed.
    InfoChanged,
    /// Rank or ladder placement changed.
    RankChanged,
}

/// Observer for entity mutations.
///
/// Implementations must be cheap and non-blocking from the engine's
/// point of view; the engine fires and forgets.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, entity: &str, event: EntityEvent);
}

/// Sink that drops every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _entity: &str, _event: EntityEvent) {}
}

/// Sink that logs notifications through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, entity: &str, event: EntityEvent) {
        tracing::debug!(entity, ?event, "entity event");
    }
}
