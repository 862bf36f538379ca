//! In-memory key-value storage for a single overlay node

use std::collections::HashMap;

/// Storage for overlay entries
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Store a value under a key, replacing any previous value
    pub fn insert(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
    }

    /// Get the value for a key
    pub fn get(&self, key: &str) -> Option<&String> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut store = KeyValueStore::new();
        assert!(store.is_empty());

        store.insert("key-1".to_string(), "value-1".to_string());
        store.insert("key-1".to_string(), "value-2".to_string());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key-1").map(String::as_str), Some("value-2"));
        assert_eq!(store.get("key-2"), None);
    }
}
