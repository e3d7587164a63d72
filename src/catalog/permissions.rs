//! Scope reasoning over a provider's permissions.
//!
//! All results are sorted and de-duplicated so that the outcome never
//! depends on input order.

use std::collections::{BTreeMap, BTreeSet};

use super::domain::Permission;

/// Lookup-by-identifier view over a set of permissions.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    by_identifier: BTreeMap<String, Permission>,
}

impl PermissionSet {
    pub fn new<'a>(permissions: impl IntoIterator<Item = &'a Permission>) -> Self {
        let by_identifier = permissions
            .into_iter()
            .map(|p| (p.identifier.clone(), p.clone()))
            .collect();
        Self { by_identifier }
    }

    pub fn get(&self, identifier: &str) -> Option<&Permission> {
        self.by_identifier.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.by_identifier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identifier.is_empty()
    }

    /// Union of the OAuth scopes of the named permissions. Unknown
    /// identifiers contribute nothing.
    pub fn required_oauth_scopes<S: AsRef<str>>(&self, identifiers: &[S]) -> Vec<String> {
        identifiers
            .iter()
            .filter_map(|id| self.by_identifier.get(id.as_ref()))
            .flat_map(|p| p.oauth_scopes.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Permissions among `required` whose scopes are not all granted.
    pub fn missing_permissions<S: AsRef<str>, G: AsRef<str>>(
        &self,
        required: &[S],
        granted_scopes: &[G],
    ) -> Vec<String> {
        let granted: BTreeSet<&str> = granted_scopes.iter().map(|s| s.as_ref()).collect();
        required
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| match self.by_identifier.get(*id) {
                Some(permission) => !permission
                    .oauth_scopes
                    .iter()
                    .all(|scope| granted.contains(scope.as_str())),
                None => true,
            })
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Permissions fully covered by `scopes`. Permissions without any scope
    /// are never reported.
    pub fn permissions_for_scopes<G: AsRef<str>>(&self, scopes: &[G]) -> Vec<Permission> {
        let granted: BTreeSet<&str> = scopes.iter().map(|s| s.as_ref()).collect();
        self.by_identifier
            .values()
            .filter(|p| {
                !p.oauth_scopes.is_empty()
                    && p.oauth_scopes
                        .iter()
                        .all(|scope| granted.contains(scope.as_str()))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::domain::fixtures::permission;

    fn sample() -> PermissionSet {
        let perms = [
            permission("read", &["repo:read", "user:read"]),
            permission("write", &["repo:write", "repo:read"]),
            permission("public", &[]),
        ];
        PermissionSet::new(perms.iter())
    }

    #[test]
    fn required_scopes_are_order_independent_and_deduplicated() {
        let set = sample();
        let forward = set.required_oauth_scopes(&["read", "write"]);
        let backward = set.required_oauth_scopes(&["write", "read", "write"]);

        assert_eq!(forward, vec!["repo:read", "repo:write", "user:read"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn required_scopes_are_idempotent() {
        let set = sample();
        let once = set.required_oauth_scopes(&["read"]);
        let twice = set.required_oauth_scopes(&["read", "read"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_permissions_reports_partial_grants() {
        let set = sample();
        let missing = set.missing_permissions(&["read", "write", "unknown"], &["repo:read"]);
        assert_eq!(missing, vec!["read", "unknown", "write"]);

        let none_missing =
            set.missing_permissions(&["read"], &["user:read", "repo:read", "extra"]);
        assert!(none_missing.is_empty());
    }

    #[test]
    fn reverse_lookup_returns_fully_covered_permissions() {
        let set = sample();
        let covered: Vec<String> = set
            .permissions_for_scopes(&["repo:write", "repo:read"])
            .into_iter()
            .map(|p| p.identifier)
            .collect();
        assert_eq!(covered, vec!["write"]);
    }
}
