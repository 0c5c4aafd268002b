//! Wildcard pattern matching for parent role names
//!
//! Pattern forms:
//! 1. Exact: `"admin"` matches `"admin"`
//! 2. Universal: `"*"` matches any role
//! 3. Prefix: `"admin:*"` matches `"admin:read"`, `"admin:write"`
//! 4. Suffix: `"*:viewer"` matches `"document:viewer"`, `"project:viewer"`

use std::collections::BTreeSet;

/// Checks if a role matches a wildcard pattern
///
/// # Examples
///
/// ```rust
/// use authz_policy_engine::derived_roles::matches_pattern;
///
/// assert!(matches_pattern("admin", "admin"));
/// assert!(matches_pattern("any_role", "*"));
/// assert!(matches_pattern("admin:read", "admin:*"));
/// assert!(!matches_pattern("user:read", "admin:*"));
/// assert!(matches_pattern("document:viewer", "*:viewer"));
/// ```
pub fn matches_pattern(role: &str, pattern: &str) -> bool {
    if role == pattern || pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(":*") {
        return role
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with(':'));
    }

    if let Some(suffix) = pattern.strip_prefix("*:") {
        return role
            .strip_suffix(suffix)
            .map_or(false, |rest| rest.ends_with(':'));
    }

    false
}

/// True if any held role matches any of the patterns
///
/// An empty pattern set places no requirement on roles.
pub fn any_role_matches(roles: &BTreeSet<String>, patterns: &BTreeSet<String>) -> bool {
    if patterns.is_empty() {
        return true;
    }

    patterns.iter().any(|pattern| {
        if is_wildcard(pattern) {
            roles.iter().any(|role| matches_pattern(role, pattern))
        } else {
            roles.contains(pattern)
        }
    })
}

fn is_wildcard(pattern: &str) -> bool {
    pattern == "*" || pattern.ends_with(":*") || pattern.starts_with("*:")
}
