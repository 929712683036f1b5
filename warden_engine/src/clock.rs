//! Epoch-seconds clock used for timed grants and memberships.

/// Current Unix time in whole seconds.
pub fn epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
