//! Path-prefix routing.
//!
//! The route table maps static path prefixes to upstream service ids. It is
//! built once at startup and never mutated afterwards, so lookups borrow
//! from a pre-sorted vector with no locking. Resolution is deterministic:
//! among all prefixes matching a request path, the longest one wins,
//! regardless of the order entries appeared in the configuration file.
use std::collections::HashMap;

/// A single prefix → upstream mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: String,
    pub upstream: String,
}

/// Immutable longest-prefix route table.
///
/// Matching is byte-wise and case-sensitive; there is no wildcard or regex
/// support. Entries are sorted by descending prefix length at construction
/// so `resolve` can take the first hit.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Build a route table from configured prefix → upstream pairs.
    pub fn new(routes: &HashMap<String, String>) -> Self {
        let mut entries: Vec<RouteEntry> = routes
            .iter()
            .map(|(prefix, upstream)| RouteEntry {
                prefix: prefix.clone(),
                upstream: upstream.clone(),
            })
            .collect();

        // Longest prefix first; ties broken lexicographically so the order
        // is stable across rebuilds.
        entries.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        Self { entries }
    }

    /// Resolve a request path to the upstream of the longest matching
    /// prefix, or `None` when no prefix matches.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| path.starts_with(&entry.prefix))
            .map(|entry| entry.upstream.as_str())
    }

    /// All configured entries, most specific first.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no routes at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> RouteTable {
        let routes = pairs
            .iter()
            .map(|(p, u)| (p.to_string(), u.to_string()))
            .collect();
        RouteTable::new(&routes)
    }

    #[test]
    fn test_resolve_basic_prefix() {
        let table = table(&[("/api/v1/orders", "order"), ("/api/v1/products", "product")]);

        assert_eq!(table.resolve("/api/v1/orders"), Some("order"));
        assert_eq!(table.resolve("/api/v1/orders/42"), Some("order"));
        assert_eq!(table.resolve("/api/v1/products?page=2"), Some("product"));
        assert_eq!(table.resolve("/api/v2/orders"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table(&[("/api", "a"), ("/api/v1", "b")]);

        assert_eq!(table.resolve("/api/v1/x"), Some("b"));
        assert_eq!(table.resolve("/api/other"), Some("a"));
    }

    #[test]
    fn test_resolution_is_order_independent() {
        // Same routes inserted in both orders must resolve identically.
        let forward = table(&[("/api", "a"), ("/api/v1", "b")]);
        let reverse = table(&[("/api/v1", "b"), ("/api", "a")]);

        for path in ["/api/v1/x", "/api/x", "/api/v1", "/api"] {
            assert_eq!(forward.resolve(path), reverse.resolve(path));
        }
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let table = table(&[("/api/v1/users", "user")]);

        assert_eq!(table.resolve("/api/v1/users/profile"), Some("user"));
        assert_eq!(table.resolve("/API/v1/users"), None);
    }

    #[test]
    fn test_empty_table_never_matches() {
        let table = table(&[]);
        assert!(table.is_empty());
        assert_eq!(table.resolve("/anything"), None);
    }
}
