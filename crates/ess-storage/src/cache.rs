use std::collections::HashMap;
use std::sync::Arc;

use ess_types::StorageKey;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::HolderConfig;
use crate::error::{StorageError, StorageResult};
use crate::holder::StorageObjectHolder;
use crate::traits::{PersistenceBackend, StorageObject};

/// Owns the lifetimes of the holders for one object type.
///
/// At most one live holder exists per key. Loading happens under the cache
/// lock; closing does not. A holder being closed stays cached until its
/// final flush is done, so a key is never reloaded from stale state. The
/// cache lock is never held while waiting on a holder's lock.
pub struct HolderCache<T: StorageObject> {
    backend: Arc<dyn PersistenceBackend<T>>,
    config: HolderConfig,
    holders: Mutex<HashMap<StorageKey, Arc<StorageObjectHolder<T>>>>,
}

impl<T: StorageObject> HolderCache<T> {
    pub fn new(backend: Arc<dyn PersistenceBackend<T>>, config: HolderConfig) -> Self {
        Self {
            backend,
            config,
            holders: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend<T>> {
        &self.backend
    }

    /// Return the open holder for `key`, loading it on first request.
    ///
    /// A cached holder that was closed through another handle is replaced
    /// by a fresh load. A holder still in the middle of closing is returned
    /// as is; its guards then fail with `HolderClosed` and a later call
    /// reloads the key.
    pub fn get_or_open(&self, key: &StorageKey) -> StorageResult<Arc<StorageObjectHolder<T>>> {
        let mut holders = self.holders.lock();
        if let Some(holder) = holders.get(key) {
            if !holder.is_closed() {
                return Ok(Arc::clone(holder));
            }
            debug!(%key, "replacing closed holder");
        }
        let holder = Arc::new(StorageObjectHolder::open(
            key.clone(),
            Arc::clone(&self.backend),
            self.config.clone(),
        )?);
        holders.insert(key.clone(), Arc::clone(&holder));
        debug!(%key, cached = holders.len(), "holder opened");
        Ok(holder)
    }

    /// The cached holder for `key`, without loading. May be closed.
    pub fn get(&self, key: &StorageKey) -> Option<Arc<StorageObjectHolder<T>>> {
        self.holders.lock().get(key).cloned()
    }

    /// Close the holder for `key` and drop it from the cache. Returns
    /// `false` if the key was not cached.
    ///
    /// On `LockTimeout` the holder stays open and cached. Any other close
    /// error still removes it; the flush error is returned.
    pub fn evict(&self, key: &StorageKey) -> StorageResult<bool> {
        let Some(holder) = self.get(key) else {
            return Ok(false);
        };
        let result = holder.close();
        if let Err(e @ StorageError::LockTimeout { .. }) = result {
            return Err(e);
        }
        self.remove_if_current(key, &holder);
        debug!(%key, "holder evicted");
        result.map(|()| true)
    }

    /// Flush every dirty holder. Returns how many were saved.
    ///
    /// Every holder is attempted; the first error is returned afterwards.
    pub fn flush_all(&self) -> StorageResult<usize> {
        let mut flushed = 0;
        let mut first_err = None;
        for holder in self.snapshot() {
            match holder.flush() {
                Ok(true) => flushed += 1,
                Ok(false) => {}
                Err(e) if e.is_closed() => {}
                Err(e) => {
                    warn!(key = %holder.key(), error = %e, "flush failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    /// Close every holder and drop it from the cache.
    ///
    /// Holders that time out waiting for their lock stay cached and open.
    /// Every holder is attempted; the first error is returned afterwards.
    pub fn close_all(&self) -> StorageResult<()> {
        let mut closed = 0;
        let mut first_err = None;
        for holder in self.snapshot() {
            let key = holder.key().clone();
            match holder.close() {
                Err(e @ StorageError::LockTimeout { .. }) => {
                    warn!(%key, error = %e, "holder still in use, left open");
                    first_err.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    warn!(%key, error = %e, "close failed during shutdown");
                    first_err.get_or_insert(e);
                }
                Ok(()) => {}
            }
            self.remove_if_current(&key, &holder);
            closed += 1;
        }
        info!(closed, remaining = self.len(), "holder cache closed");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of open holders.
    pub fn len(&self) -> usize {
        self.holders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.lock().is_empty()
    }

    /// Sorted keys of the open holders.
    pub fn keys(&self) -> Vec<StorageKey> {
        let mut keys: Vec<StorageKey> = self.holders.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Count open objects matching `pred`, taking a read lock on each in
    /// turn. Holders closed concurrently are skipped.
    pub fn count_where(&self, pred: impl Fn(&T) -> bool) -> StorageResult<usize> {
        let mut count = 0;
        for holder in self.snapshot() {
            match holder.read() {
                Ok(guard) => {
                    if pred(&guard) {
                        count += 1;
                    }
                }
                Err(e) if e.is_closed() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }

    /// Drop `holder` from the map unless `key` was already reopened.
    fn remove_if_current(&self, key: &StorageKey, holder: &Arc<StorageObjectHolder<T>>) {
        let mut holders = self.holders.lock();
        if holders.get(key).is_some_and(|h| Arc::ptr_eq(h, holder)) {
            holders.remove(key);
        }
    }

    /// Clone the holder handles so per-holder locks are taken without the
    /// cache lock.
    fn snapshot(&self) -> Vec<Arc<StorageObjectHolder<T>>> {
        self.holders.lock().values().cloned().collect()
    }
}

impl<T: StorageObject> std::fmt::Debug for HolderCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HolderCache")
            .field("open", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingPolicy;
    use crate::memory::InMemoryBackend;
    use serde::{Deserialize, Serialize};
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Account {
        balance: i64,
        afk: bool,
    }

    impl StorageObject for Account {
        fn create(_key: &StorageKey) -> Option<Self> {
            Some(Account::default())
        }
    }

    fn key(s: &str) -> StorageKey {
        s.parse().unwrap()
    }

    fn cache_with(backend: &Arc<InMemoryBackend<Account>>) -> HolderCache<Account> {
        HolderCache::new(backend.clone(), HolderConfig::default())
    }

    fn seeded() -> Arc<InMemoryBackend<Account>> {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert(key("player:alice"), Account { balance: 10, afk: false });
        backend.insert(key("player:bob"), Account { balance: 20, afk: true });
        backend
    }

    #[test]
    fn get_or_open_loads_once() {
        let backend = seeded();
        let cache = cache_with(&backend);

        let a1 = cache.get_or_open(&key("player:alice")).unwrap();
        let a2 = cache.get_or_open(&key("player:alice")).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(backend.load_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_opens_share_one_holder() {
        let backend = seeded();
        let cache = Arc::new(cache_with(&backend));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_or_open(&key("player:bob")).unwrap())
            })
            .collect();
        let holders: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for h in &holders[1..] {
            assert!(Arc::ptr_eq(&holders[0], h));
        }
        assert_eq!(backend.load_count(), 1);
    }

    #[test]
    fn failed_open_is_not_cached() {
        let backend = Arc::new(InMemoryBackend::<Account>::new());
        let config = HolderConfig::default().with_missing_policy(MissingPolicy::Fail);
        let cache = HolderCache::<Account>::new(backend, config);

        let err = cache.get_or_open(&key("player:ghost")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_flushes_and_closes() {
        let backend = seeded();
        let cache = cache_with(&backend);
        let k = key("player:alice");

        let holder = cache.get_or_open(&k).unwrap();
        holder.with_write(|a| a.balance += 5).unwrap();

        assert!(cache.evict(&k).unwrap());
        assert!(holder.is_closed());
        assert!(cache.get(&k).is_none());
        assert_eq!(backend.save_count(), 1);
        assert_eq!(backend.get(&k).unwrap().data.balance, 15);

        // Evicting an absent key is not an error.
        assert!(!cache.evict(&k).unwrap());
    }

    #[test]
    fn reopen_after_evict_sees_flushed_state() {
        let backend = seeded();
        let cache = cache_with(&backend);
        let k = key("player:alice");

        cache.get_or_open(&k).unwrap().with_write(|a| a.afk = true).unwrap();
        cache.evict(&k).unwrap();

        let reopened = cache.get_or_open(&k).unwrap();
        assert!(reopened.with_read(|a| a.afk).unwrap());
        assert_eq!(backend.load_count(), 2);
    }

    #[test]
    fn evict_times_out_while_in_use() {
        let backend = seeded();
        let config = HolderConfig::default().with_lock_timeout(Some(Duration::from_millis(30)));
        let cache = HolderCache::<Account>::new(backend, config);
        let k = key("player:alice");

        let holder = cache.get_or_open(&k).unwrap();
        let guard = holder.read().unwrap();
        let err = cache.evict(&k).unwrap_err();
        assert!(matches!(err, StorageError::LockTimeout { .. }));
        // Still cached and usable.
        assert!(cache.get(&k).is_some());
        drop(guard);
        assert!(cache.evict(&k).unwrap());
    }

    #[test]
    fn flush_all_saves_only_dirty() {
        let backend = seeded();
        let cache = cache_with(&backend);
        cache
            .get_or_open(&key("player:alice"))
            .unwrap()
            .with_write(|a| a.balance = 0)
            .unwrap();
        cache.get_or_open(&key("player:bob")).unwrap();

        assert_eq!(cache.flush_all().unwrap(), 1);
        assert_eq!(backend.save_count(), 1);
        assert_eq!(cache.flush_all().unwrap(), 0);
    }

    #[test]
    fn close_all_empties_cache() {
        let backend = seeded();
        let cache = cache_with(&backend);
        let alice = cache.get_or_open(&key("player:alice")).unwrap();
        alice.with_write(|a| a.balance = 1).unwrap();
        cache.get_or_open(&key("player:carol")).unwrap();

        cache.close_all().unwrap();
        assert!(cache.is_empty());
        assert!(alice.is_closed());
        // alice (dirty) and carol (created) were both persisted.
        assert_eq!(backend.save_count(), 2);
        assert!(backend.get(&key("player:carol")).is_some());
    }

    #[test]
    fn close_all_keeps_holders_still_in_use() {
        let backend = seeded();
        let config = HolderConfig::default().with_lock_timeout(Some(Duration::from_millis(30)));
        let cache = HolderCache::<Account>::new(backend.clone(), config);
        let k = key("player:alice");

        let holder = cache.get_or_open(&k).unwrap();
        holder.with_write(|a| a.balance = 5).unwrap();
        let guard = holder.read().unwrap();

        let err = cache.close_all().unwrap_err();
        assert!(matches!(err, StorageError::LockTimeout { .. }));
        assert_eq!(cache.len(), 1);
        assert!(!holder.is_closed());
        // Still the one live holder for the key, with its unsaved change.
        let again = cache.get_or_open(&k).unwrap();
        assert!(Arc::ptr_eq(&holder, &again));
        assert_eq!(guard.balance, 5);
        assert_eq!(backend.load_count(), 1);

        drop(guard);
        cache.close_all().unwrap();
        assert!(cache.is_empty());
        assert_eq!(backend.get(&k).unwrap().data.balance, 5);
    }

    #[test]
    fn evict_waiting_on_a_guard_does_not_block_other_keys() {
        let backend = seeded();
        let config = HolderConfig::default().with_lock_timeout(Some(Duration::from_millis(800)));
        let cache = Arc::new(HolderCache::<Account>::new(backend, config));
        let alice = cache.get_or_open(&key("player:alice")).unwrap();
        let guard = alice.read().unwrap();

        let evicting = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.evict(&key("player:alice")))
        };
        thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        cache.get_or_open(&key("player:bob")).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(start.elapsed() < Duration::from_millis(300));

        drop(guard);
        assert!(evicting.join().unwrap().unwrap());
        assert!(alice.is_closed());
        assert_eq!(cache.keys(), vec![key("player:bob")]);
    }

    #[test]
    fn get_or_open_replaces_holder_closed_elsewhere() {
        let backend = seeded();
        let cache = cache_with(&backend);
        let k = key("player:alice");

        let first = cache.get_or_open(&k).unwrap();
        first.with_write(|a| a.afk = true).unwrap();
        first.close().unwrap();

        let second = cache.get_or_open(&k).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());
        assert!(second.with_read(|a| a.afk).unwrap());
        assert_eq!(backend.load_count(), 2);
        assert_eq!(cache.len(), 1);

        cache.evict(&k).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn telemetry_accessors() {
        let backend = seeded();
        let cache = cache_with(&backend);
        cache.get_or_open(&key("player:bob")).unwrap();
        cache.get_or_open(&key("player:alice")).unwrap();

        assert_eq!(cache.keys(), vec![key("player:alice"), key("player:bob")]);
        assert_eq!(cache.count_where(|a| a.afk).unwrap(), 1);
        assert_eq!(cache.count_where(|a| a.balance > 0).unwrap(), 2);
    }

    #[test]
    fn count_where_skips_closed_holders() {
        let backend = seeded();
        let cache = cache_with(&backend);
        let bob = cache.get_or_open(&key("player:bob")).unwrap();
        cache.get_or_open(&key("player:alice")).unwrap();
        // Closed behind the cache's back; still in the map.
        bob.close().unwrap();
        assert_eq!(cache.count_where(|_| true).unwrap(), 1);
    }

    #[test]
    fn debug_format() {
        let cache = cache_with(&seeded());
        let debug = format!("{cache:?}");
        assert!(debug.contains("HolderCache"));
        assert!(debug.contains("open: 0"));
    }
}
