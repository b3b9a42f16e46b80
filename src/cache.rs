//! Memoization of read queries keyed by function name and arguments.
//!
//! [`TtlCache`] keeps each result until its time-to-live passes or until
//! [`QueryCache::invalidate_all`] is called after a successful write.
//! [`NoopCache`] never stores anything.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use log::debug;

use crate::error::Result;

pub type CachedValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub function: &'static str,
    pub args: Vec<Option<String>>,
}

impl CacheKey {
    pub fn new(function: &'static str, args: &[Option<&str>]) -> Self {
        Self {
            function,
            args: args.iter().map(|arg| arg.map(str::to_string)).collect(),
        }
    }
}

pub trait QueryCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CachedValue>;
    fn put(&self, key: CacheKey, value: CachedValue);
    fn invalidate_all(&self);
}

#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, (Instant, CachedValue)>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, (Instant, CachedValue)>> {
        // A panic while holding the lock leaves only stale cache entries behind.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueryCache for TtlCache {
    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((expires_at, value)) if Instant::now() < *expires_at => Some(Arc::clone(value)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: CacheKey, value: CachedValue) {
        let expires_at = Instant::now() + self.ttl;
        self.lock().insert(key, (expires_at, value));
    }

    fn invalidate_all(&self) {
        let mut entries = self.lock();
        debug!("Invalidating {} cached quer(ies)", entries.len());
        entries.clear();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl QueryCache for NoopCache {
    fn get(&self, _key: &CacheKey) -> Option<CachedValue> {
        None
    }

    fn put(&self, _key: CacheKey, _value: CachedValue) {}

    fn invalidate_all(&self) {}
}

/// Returns the cached value for `key`, or computes, stores and returns it.
/// Failed computations are not cached.
pub fn memoize<T>(
    cache: &dyn QueryCache,
    key: CacheKey,
    compute: impl FnOnce() -> Result<T>,
) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    if let Some(hit) = cache.get(&key).and_then(|value| value.downcast::<T>().ok()) {
        debug!("Cache hit for {}", key.function);
        return Ok(T::clone(&hit));
    }
    let value = compute()?;
    cache.put(key, Arc::new(value.clone()));
    Ok(value)
}
