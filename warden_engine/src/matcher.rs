//! Default wildcard permission matcher.
//!
//! Expression syntax: `.` is literal, `*` matches any run of
//! characters, a leading `$` marks the rest as raw regex. Leading `-`
//! (negation) and `#` (non-inheritable) markers are stripped before
//! matching. Matching is case-insensitive. Compiled patterns are
//! cached per expression.

use dashmap::DashMap;
use regex::Regex;
use warden_core::traits::PermissionMatcher;

const RAW_REGEX_MARKER: char = '$';

/// Regex-backed [`PermissionMatcher`] with a compiled-pattern cache.
#[derive(Debug, Default)]
pub struct RegexMatcher {
    patterns: DashMap<String, Option<Regex>>,
}

impl RegexMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate a permission expression into an anchored regex source.
    fn prepare(expression: &str) -> String {
        let expression = expression.strip_prefix('-').unwrap_or(expression);
        let expression = expression.strip_prefix('#').unwrap_or(expression);

        if let Some(raw) = expression.strip_prefix(RAW_REGEX_MARKER) {
            return format!("(?i)^{raw}$");
        }

        let mut source = String::with_capacity(expression.len() + 8);
        source.push_str("(?i)^");
        for ch in expression.chars() {
            match ch {
                '*' => source.push_str("(.*)"),
                ch => source.push_str(&regex::escape(&ch.to_string())),
            }
        }
        source.push('$');
        source
    }

    fn pattern_matches(&self, expression: &str, permission: &str) -> bool {
        if let Some(cached) = self.patterns.get(expression) {
            return cached
                .as_ref()
                .map(|re| re.is_match(permission))
                .unwrap_or(false);
        }

        let compiled = Regex::new(&Self::prepare(expression)).ok();
        if compiled.is_none() {
            tracing::warn!(expression, "unparsable permission expression");
        }
        let matches = compiled
            .as_ref()
            .map(|re| re.is_match(permission))
            .unwrap_or(false);
        self.patterns.insert(expression.to_owned(), compiled);
        matches
    }
}

impl PermissionMatcher for RegexMatcher {
    fn matches(&self, expression: &str, permission: &str) -> bool {
        self.pattern_matches(expression, permission)
    }
}
