#[cfg(test)]
mod tests {
    use crate::cluster::types::NodeId;
    use crate::store::memory::LocalStore;
    use crate::store::types::{Metadata, PutOutcome, Record};

    fn record(value: &str, timestamp: u64, origin: &str) -> Record {
        Record {
            value_json: value.to_string(),
            metadata: Metadata {
                timestamp,
                version: 1,
                origin: NodeId(origin.to_string()),
            },
        }
    }

    // ============================================================
    // BASIC OPERATIONS
    // ============================================================

    #[test]
    fn test_put_then_get_roundtrip() {
        let store = LocalStore::new();

        let outcome = store.put("user:1", record("\"John\"", 1000, "node-a"));
        assert_eq!(outcome, PutOutcome::Written);

        let stored = store.get("user:1").expect("record should exist");
        assert_eq!(stored.value_json, "\"John\"");
        assert_eq!(stored.metadata.timestamp, 1000);
    }

    #[test]
    fn test_get_missing_key() {
        let store = LocalStore::new();
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_keys_enumerates_stored_keys() {
        let store = LocalStore::new();
        store.put("a", record("1", 1, "n"));
        store.put("b", record("2", 1, "n"));

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.len(), 2);
    }

    // ============================================================
    // LAST-WRITER-WINS
    // ============================================================

    #[test]
    fn test_newer_timestamp_overwrites() {
        let store = LocalStore::new();
        store.put("k", record("\"v1\"", 1000, "node-a"));

        let outcome = store.put("k", record("\"v2\"", 1001, "node-b"));
        assert_eq!(outcome, PutOutcome::Written);
        assert_eq!(store.get("k").unwrap().value_json, "\"v2\"");
    }

    #[test]
    fn test_older_timestamp_is_skipped() {
        let store = LocalStore::new();
        store.put("k", record("\"v2\"", 1001, "node-b"));

        let outcome = store.put("k", record("\"v1\"", 1000, "node-a"));
        assert_eq!(outcome, PutOutcome::SkippedOlder);
        assert_eq!(store.get("k").unwrap().value_json, "\"v2\"");
    }

    #[test]
    fn test_equal_timestamp_keeps_first_stored() {
        let store = LocalStore::new();
        store.put("k", record("\"first\"", 1000, "node-a"));

        let outcome = store.put("k", record("\"second\"", 1000, "node-b"));
        assert_eq!(outcome, PutOutcome::SkippedOlder);
        assert_eq!(store.get("k").unwrap().value_json, "\"first\"");
    }

    #[test]
    fn test_max_timestamp_wins_over_any_sequence() {
        let store = LocalStore::new();
        let stamps = [5u64, 9, 2, 9, 7, 1, 8];

        for (i, ts) in stamps.iter().enumerate() {
            store.put("k", record(&format!("\"v{}\"", i), *ts, "n"));
        }

        // First write carrying the maximum timestamp (9) was index 1.
        let stored = store.get("k").unwrap();
        assert_eq!(stored.metadata.timestamp, 9);
        assert_eq!(stored.value_json, "\"v1\"");
    }

    #[test]
    fn test_keys_are_independent() {
        let store = LocalStore::new();
        store.put("a", record("\"old\"", 1, "n"));
        store.put("b", record("\"new\"", 100, "n"));

        // A stale write to `a` is skipped without touching `b`.
        store.put("a", record("\"stale\"", 0, "n"));
        assert_eq!(store.get("a").unwrap().value_json, "\"old\"");
        assert_eq!(store.get("b").unwrap().value_json, "\"new\"");
    }
}
