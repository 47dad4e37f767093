//! Process-lifetime memo of known-issuer validation outcomes.

use crate::fields::ValidationResult;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Cache key for a certificate: lowercase hex SHA-256 of its PEM text
/// exactly as the caller supplied it.
pub fn cache_key(certificate_pem: &str) -> String {
    hex::encode(Sha256::digest(certificate_pem.as_bytes()))
}

/// Unbounded map from [`cache_key`] to [`ValidationResult`]. Entries are
/// never evicted. Safe to share between threads.
#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: RwLock<HashMap<String, ValidationResult>>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        // A panic while holding the lock cannot leave a half-written entry,
        // so a poisoned lock is still usable.
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    pub fn put(&self, key: String, result: ValidationResult) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, result);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn key_is_sha256_hex_of_text() {
        assert_eq!(
            cache_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(cache_key("abc"), cache_key("abc\n"));
    }

    #[test]
    fn put_then_get() {
        let cache = ValidationCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("k").is_none());

        cache.put("k".into(), ValidationResult::verified("Certificate is valid"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").unwrap().message.as_deref(), Some("Certificate is valid"));
    }

    #[test]
    fn concurrent_writers() {
        let cache = std::sync::Arc::new(ValidationCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache.put(format!("k{}", i), ValidationResult::verified("ok"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
