//! Origin-scoped key/value storage.

use anyhow::{Result, anyhow, bail};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A small synchronous string store, readable at guard-application time.
pub trait KeyValueStore {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or the write exceeds its quota.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory string key/value store per origin.
#[derive(Debug, Default)]
pub struct StorageRegistry {
    /// Map from origin to ordered key/value pairs.
    pub buckets: HashMap<String, BTreeMap<String, String>>,
    /// Optional byte quota per origin (keys plus values).
    quotas: HashMap<String, usize>,
    /// Origins whose storage refuses every access.
    unavailable: HashSet<String>,
}

/// Registry shared between the host and every engine it creates.
pub type SharedStorage = Arc<Mutex<StorageRegistry>>;

impl StorageRegistry {
    #[inline]
    pub fn get_bucket_mut(&mut self, origin: &str) -> &mut BTreeMap<String, String> {
        self.buckets.entry(origin.to_owned()).or_default()
    }

    #[inline]
    pub fn get_bucket(&self, origin: &str) -> Option<&BTreeMap<String, String>> {
        self.buckets.get(origin)
    }

    /// Cap the bytes an origin may hold; `None` removes the cap.
    pub fn set_quota(&mut self, origin: &str, bytes: Option<usize>) {
        match bytes {
            Some(limit) => {
                self.quotas.insert(origin.to_owned(), limit);
            }
            None => {
                self.quotas.remove(origin);
            }
        }
    }

    /// Make every access for `origin` fail (storage disabled by the user agent).
    pub fn set_unavailable(&mut self, origin: &str, unavailable: bool) {
        if unavailable {
            self.unavailable.insert(origin.to_owned());
        } else {
            self.unavailable.remove(origin);
        }
    }

    /// Bytes currently stored for `origin`.
    pub fn used_bytes(&self, origin: &str) -> usize {
        self.get_bucket(origin).map_or(0, |bucket| {
            bucket
                .iter()
                .map(|(key, value)| key.len() + value.len())
                .sum()
        })
    }

    fn check_available(&self, origin: &str) -> Result<()> {
        if self.unavailable.contains(origin) {
            bail!("storage for {origin} is unavailable");
        }
        Ok(())
    }
}

/// A [`KeyValueStore`] view of one origin's bucket.
#[derive(Clone, Debug)]
pub struct OriginStorage {
    registry: SharedStorage,
    origin: String,
}

impl OriginStorage {
    #[inline]
    #[must_use]
    pub const fn new(registry: SharedStorage, origin: String) -> Self {
        Self { registry, origin }
    }

    /// A store backed by a fresh private registry.
    #[must_use]
    pub fn in_memory(origin: &str) -> Self {
        Self::new(SharedStorage::default(), origin.to_owned())
    }

    /// The registry backing this store.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &SharedStorage {
        &self.registry
    }

    fn lock(&self) -> Result<MutexGuard<'_, StorageRegistry>> {
        self.registry
            .lock()
            .map_err(|_| anyhow!("storage mutex poisoned"))
    }
}

impl KeyValueStore for OriginStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let registry = self.lock()?;
        registry.check_available(&self.origin)?;
        Ok(registry
            .get_bucket(&self.origin)
            .and_then(|bucket| bucket.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut registry = self.lock()?;
        registry.check_available(&self.origin)?;
        if let Some(limit) = registry.quotas.get(&self.origin).copied() {
            let previous = registry
                .get_bucket(&self.origin)
                .and_then(|bucket| bucket.get(key))
                .map_or(0, |old| key.len() + old.len());
            let projected = registry.used_bytes(&self.origin) - previous + key.len() + value.len();
            if projected > limit {
                bail!(
                    "quota exceeded for {}: {projected} > {limit} bytes",
                    self.origin
                );
            }
        }
        registry
            .get_bucket_mut(&self.origin)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut registry = self.lock()?;
        registry.check_available(&self.origin)?;
        registry.get_bucket_mut(&self.origin).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_isolated_per_origin() {
        let registry = SharedStorage::default();
        let first = OriginStorage::new(Arc::clone(&registry), "https://a.test".to_owned());
        let second = OriginStorage::new(Arc::clone(&registry), "https://b.test".to_owned());
        first.set("key", "one").unwrap();
        assert_eq!(first.get("key").unwrap().as_deref(), Some("one"));
        assert_eq!(second.get("key").unwrap(), None);
        first.remove("key").unwrap();
        assert_eq!(first.get("key").unwrap(), None);
    }

    #[test]
    fn quota_rejects_oversized_writes_but_allows_overwrites() {
        let store = OriginStorage::in_memory("https://a.test");
        store.registry().lock().unwrap().set_quota("https://a.test", Some(10));
        store.set("k", "12345").unwrap();
        store.set("k", "123456789").unwrap();
        assert!(store.set("other", "x").is_err());
        assert_eq!(store.get("k").unwrap().as_deref(), Some("123456789"));
    }

    #[test]
    fn unavailable_storage_fails_every_access() {
        let store = OriginStorage::in_memory("https://a.test");
        store.registry().lock().unwrap().set_unavailable("https://a.test", true);
        assert!(store.get("k").is_err());
        assert!(store.set("k", "v").is_err());
        assert!(store.remove("k").is_err());
    }
}
