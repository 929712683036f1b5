//! Registry behavior settings.

use serde::Deserialize;

/// Global behavior flags for a [`crate::registry::PermissionRegistry`].
///
/// These arrive deserialized from whatever configuration surface the
/// embedder owns; the engine itself reads no files.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Whether `add_group` appends the new membership at the end of
    /// the user's list instead of prepending it.
    pub user_add_groups_last: bool,

    /// Ladder used by promote/demote when the caller passes an empty
    /// ladder name.
    pub default_ladder: String,

    /// Emit per-check debug logs.
    pub debug: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            user_add_groups_last: false,
            default_ladder: "default".to_owned(),
            debug: false,
        }
    }
}
