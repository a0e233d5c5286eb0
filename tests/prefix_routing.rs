// Tests for deterministic longest-prefix route resolution
#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use portico::core::RouteTable;

    fn table(pairs: &[(&str, &str)]) -> RouteTable {
        let routes: HashMap<String, String> = pairs
            .iter()
            .map(|(prefix, upstream)| (prefix.to_string(), upstream.to_string()))
            .collect();
        RouteTable::new(&routes)
    }

    #[test]
    fn test_ecommerce_route_table_resolution() {
        let table = table(&[
            ("/api/v1/auth", "user"),
            ("/api/v1/users", "user"),
            ("/api/v1/products", "product"),
            ("/api/v1/categories", "product"),
            ("/api/v1/inventory", "product"),
            ("/api/v1/orders", "order"),
            ("/api/v1/notifications", "notification"),
            ("/api/v1/preferences", "notification"),
        ]);

        assert_eq!(table.resolve("/api/v1/auth/login"), Some("user"));
        assert_eq!(table.resolve("/api/v1/users/42"), Some("user"));
        assert_eq!(table.resolve("/api/v1/products"), Some("product"));
        assert_eq!(table.resolve("/api/v1/orders/7/items"), Some("order"));
        assert_eq!(
            table.resolve("/api/v1/notifications/unread"),
            Some("notification")
        );
        assert_eq!(table.resolve("/api/v2/products"), None);
        assert_eq!(table.resolve("/health-x"), None);
    }

    #[test]
    fn test_overlapping_prefixes_resolve_to_longest() {
        let table = table(&[("/api", "a"), ("/api/v1", "b")]);

        assert_eq!(table.resolve("/api/v1/x"), Some("b"));
        assert_eq!(table.resolve("/api/v1"), Some("b"));
        assert_eq!(table.resolve("/api/v2/x"), Some("a"));
        assert_eq!(table.resolve("/api"), Some("a"));
    }

    #[test]
    fn test_same_upstream_overlapping_prefixes() {
        // Both prefixes map to the same upstream; either match must resolve
        // identically.
        let table = table(&[
            ("/api/v1/users", "user"),
            ("/api/v1/users/profile", "user"),
        ]);

        assert_eq!(table.resolve("/api/v1/users"), Some("user"));
        assert_eq!(table.resolve("/api/v1/users/profile"), Some("user"));
        assert_eq!(table.resolve("/api/v1/users/profile/email"), Some("user"));
    }

    #[test]
    fn test_insertion_order_does_not_affect_resolution() {
        let forward = table(&[("/api", "a"), ("/api/v1", "b"), ("/api/v1/deep", "c")]);
        let reverse = table(&[("/api/v1/deep", "c"), ("/api/v1", "b"), ("/api", "a")]);

        for path in [
            "/api",
            "/api/v1",
            "/api/v1/deep",
            "/api/v1/deep/er",
            "/api/other",
            "/unrelated",
        ] {
            assert_eq!(
                forward.resolve(path),
                reverse.resolve(path),
                "path {path} resolved differently depending on insertion order"
            );
        }
    }

    #[test]
    fn test_prefix_match_is_byte_wise() {
        let table = table(&[("/api/v1/orders", "order")]);

        // A prefix match, not a path-segment match.
        assert_eq!(table.resolve("/api/v1/orders-archive"), Some("order"));
        assert_eq!(table.resolve("/api/v1/order"), None);
        assert_eq!(table.resolve("/API/V1/ORDERS"), None);
    }
}
