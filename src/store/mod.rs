//! Reading key-value secrets and flattening them into one map.

use crate::{Result, VaultLoaderError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub mod vault;

pub use vault::{VaultSettings, VaultStore};

/// Upper-cased secret names mapped to their values.
pub type SecretMap = BTreeMap<String, String>;

/// The raw field map stored at one KV path.
pub type SecretData = HashMap<String, Value>;

/// A key-value secrets engine.
pub trait KvStore {
    /// Use `token` for every following read.
    fn authorize(&mut self, token: &str) -> Result<()>;

    /// Read the latest version of the secret at `path` in the `engine` mount.
    ///
    /// Returns `Ok(None)` when the store answers without a data body.
    fn read(&self, engine: &str, path: &str) -> Result<Option<SecretData>>;
}

/// Read every path in order and merge their fields into one map.
///
/// Keys are upper-cased. When two paths define the same key the later path
/// wins, so paths can be layered from general to specific. The first failing
/// path aborts the whole batch.
pub fn fetch_secrets(store: &impl KvStore, engine: &str, paths: &[String]) -> Result<SecretMap> {
    let mut secrets = SecretMap::new();

    for path in paths {
        let path = path.trim();
        if path.is_empty() {
            continue;
        }

        tracing::debug!(engine, path, "reading secret path");
        let data = store
            .read(engine, path)?
            .ok_or_else(|| VaultLoaderError::NoSecretsFound(path.to_string()))?;

        for (key, value) in &data {
            secrets.insert(key.to_uppercase(), coerce_value(value));
        }
    }

    Ok(secrets)
}

/// Render a stored field as the string placed in the environment.
///
/// Strings are taken verbatim, `null` becomes empty, and anything else uses
/// its compact JSON text (`42`, `true`, `{"a":1}`).
pub fn coerce_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// In-memory store keyed by `engine/path`.
    #[derive(Default)]
    struct MemoryStore {
        entries: HashMap<String, Option<SecretData>>,
        reads: RefCell<Vec<String>>,
    }

    impl MemoryStore {
        fn with(mut self, engine: &str, path: &str, data: Value) -> Self {
            let data = match data {
                Value::Null => None,
                other => Some(serde_json::from_value(other).unwrap()),
            };
            self.entries.insert(format!("{}/{}", engine, path), data);
            self
        }
    }

    impl KvStore for MemoryStore {
        fn authorize(&mut self, _token: &str) -> Result<()> {
            Ok(())
        }

        fn read(&self, engine: &str, path: &str) -> Result<Option<SecretData>> {
            let key = format!("{}/{}", engine, path);
            self.reads.borrow_mut().push(key.clone());
            self.entries
                .get(&key)
                .cloned()
                .ok_or_else(|| VaultLoaderError::SecretRead {
                    path: path.to_string(),
                    message: "Code: 404".to_string(),
                    source: None,
                })
        }
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_keys_are_uppercased() {
        let store = MemoryStore::default().with(
            "kv",
            "app",
            json!({"database_url": "postgres://db", "Api_Key": "k"}),
        );
        let secrets = fetch_secrets(&store, "kv", &paths(&["app"])).unwrap();
        assert_eq!(secrets.get("DATABASE_URL").unwrap(), "postgres://db");
        assert_eq!(secrets.get("API_KEY").unwrap(), "k");
        assert_eq!(secrets.len(), 2);
    }

    #[test]
    fn test_later_path_wins() {
        let store = MemoryStore::default()
            .with("kv", "common", json!({"shared": "common", "only_a": "a"}))
            .with("kv", "prod", json!({"SHARED": "prod", "only_b": "b"}));
        let secrets = fetch_secrets(&store, "kv", &paths(&["common", "prod"])).unwrap();
        assert_eq!(secrets.get("SHARED").unwrap(), "prod");
        assert_eq!(secrets.get("ONLY_A").unwrap(), "a");
        assert_eq!(secrets.get("ONLY_B").unwrap(), "b");

        let secrets = fetch_secrets(&store, "kv", &paths(&["prod", "common"])).unwrap();
        assert_eq!(secrets.get("SHARED").unwrap(), "common");
    }

    #[test]
    fn test_reads_use_engine_and_skip_blank_paths() {
        let store = MemoryStore::default().with("secret", "app", json!({"a": "1"}));
        fetch_secrets(&store, "secret", &paths(&["", " app "])).unwrap();
        assert_eq!(*store.reads.borrow(), vec!["secret/app"]);
    }

    #[test]
    fn test_path_without_data_is_fatal() {
        let store = MemoryStore::default()
            .with("kv", "a", json!({"x": "1"}))
            .with("kv", "empty", Value::Null);
        match fetch_secrets(&store, "kv", &paths(&["a", "empty"])) {
            Err(VaultLoaderError::NoSecretsFound(path)) => assert_eq!(path, "empty"),
            other => panic!("Expected NoSecretsFound, got {:?}", other),
        }
    }

    #[test]
    fn test_read_error_aborts_batch() {
        let store = MemoryStore::default().with("kv", "late", json!({"x": "1"}));
        let err = fetch_secrets(&store, "kv", &paths(&["missing", "late"])).unwrap_err();
        assert!(matches!(err, VaultLoaderError::SecretRead { .. }));
        assert_eq!(*store.reads.borrow(), vec!["kv/missing"]);
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_coerce_value() {
        assert_eq!(coerce_value(&json!("text")), "text");
        assert_eq!(coerce_value(&json!(42)), "42");
        assert_eq!(coerce_value(&json!(1.5)), "1.5");
        assert_eq!(coerce_value(&json!(true)), "true");
        assert_eq!(coerce_value(&Value::Null), "");
        assert_eq!(coerce_value(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(coerce_value(&json!(["x", 2])), r#"["x",2]"#);
    }
}
