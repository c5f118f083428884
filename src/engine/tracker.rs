use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

fn feed(hasher: &mut Sha256, v: &JsonValue) {
    match v {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"{");
            for k in keys {
                hasher.update(serde_json::to_string(k).unwrap_or_default().as_bytes());
                hasher.update(b":");
                if let Some(child) = map.get(k) {
                    feed(hasher, child);
                }
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
        JsonValue::Array(items) => {
            hasher.update(b"[");
            for item in items {
                feed(hasher, item);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}

/// SHA-256 of the document with object keys in sorted order, hex encoded.
pub fn content_hash(v: &JsonValue) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher, v);
    hex::encode(hasher.finalize())
}

/// Baseline fingerprints for the `updated` flag and for detecting a new
/// source document.
#[derive(Clone, Debug, Default)]
pub struct ChangeTracker {
    baseline: Option<String>,
    source: Option<String>,
}

impl ChangeTracker {
    /// Capture `doc` as the new baseline (load, reset, submit).
    pub fn rebase(&mut self, doc: &JsonValue) {
        self.baseline = Some(content_hash(doc));
    }

    pub fn is_updated(&self, doc: &JsonValue) -> bool {
        self.baseline.as_deref() != Some(content_hash(doc).as_str())
    }

    /// Remember the source document. Returns `true` when it differs from the
    /// previously supplied one, i.e. the caller should treat it as a reset.
    pub fn observe_source(&mut self, source: &JsonValue) -> bool {
        let hash = content_hash(source);
        if self.source.as_deref() == Some(hash.as_str()) {
            return false;
        }
        self.source = Some(hash);
        true
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({"a": 1, "b": {"x": [1, 2], "y": null}});
        let b = json!({"b": {"y": null, "x": [1, 2]}, "a": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&json!({"a": 1})));
        assert_ne!(content_hash(&json!([1, 2])), content_hash(&json!([2, 1])));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn string_and_number_do_not_collide() {
        assert_ne!(content_hash(&json!({"q": "5"})), content_hash(&json!({"q": 5})));
    }

    #[test]
    fn edit_then_revert_is_not_an_update() {
        let mut t = ChangeTracker::default();
        let doc = json!({"name": "a"});
        assert!(t.is_updated(&doc));
        t.rebase(&doc);
        assert!(!t.is_updated(&doc));
        assert!(t.is_updated(&json!({"name": "b"})));
        assert!(!t.is_updated(&json!({"name": "a"})));
        assert!(t.baseline().is_some());
    }

    #[test]
    fn same_source_is_not_reobserved() {
        let mut t = ChangeTracker::default();
        assert!(t.observe_source(&json!({"a": 1})));
        assert!(!t.observe_source(&json!({"a": 1})));
        assert!(t.observe_source(&json!({"a": 2})));
    }
}
