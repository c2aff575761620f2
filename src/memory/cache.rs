//! TTL caches backing the resolver and batch layers
//!
//! Three independent families share one structure: module bases (5 s),
//! resolved chain addresses (1 s), and read values (dynamic, derived from the
//! poll interval). Expired entries are dropped by a sweep that is throttled
//! to once per second; `get` only ever checks age, it never removes, so the
//! hot read path stays allocation- and scan-free.

use crate::core::types::{Address, RequestId, Sample};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub const MODULE_CACHE_TTL: Duration = Duration::from_millis(5000);
pub const ADDRESS_CACHE_TTL: Duration = Duration::from_millis(1000);
pub const VALUE_CACHE_MIN_TTL: Duration = Duration::from_millis(5);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Value-cache TTL for a given poll interval: fast polls pin the minimum,
/// slower polls keep values for 80% of the interval so every tick still
/// lands on fresh data.
pub fn value_cache_ttl(poll_interval: Duration) -> Duration {
    if poll_interval <= Duration::from_millis(20) {
        VALUE_CACHE_MIN_TTL
    } else {
        let ttl = Duration::from_millis(poll_interval.as_millis() as u64 * 8 / 10);
        ttl.max(VALUE_CACHE_MIN_TTL)
    }
}

struct CacheEntry<V> {
    data: V,
    stored_at: Instant,
}

/// Append/expire map with a fixed TTL and throttled sweeping.
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    ttl: Duration,
    last_sweep: Instant,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: HashMap::new(),
            ttl,
            // Backdated so the first sweep is not throttled away.
            last_sweep: Instant::now() - SWEEP_INTERVAL,
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries
            .get(key)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| e.data.clone())
    }

    pub fn put(&mut self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                data: value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops expired entries, at most once per [`SWEEP_INTERVAL`].
    pub fn sweep(&mut self) {
        if self.last_sweep.elapsed() < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Instant::now();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
    }

    /// Changes the TTL for existing and future entries.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Raw entry count, expired entries included until the next sweep.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Final chain addresses keyed by request id; only consulted for fast-mode
/// pointer-chain requests.
pub type ResolvedAddressCache = TtlCache<RequestId, Address>;

/// Read results keyed by the canonical spec serialization.
pub type ValueCache = TtlCache<String, Sample>;

/// Module base addresses keyed case-insensitively by `(process, module)`.
pub struct ModuleBaseCache {
    inner: TtlCache<(String, String), Address>,
}

impl Default for ModuleBaseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBaseCache {
    pub fn new() -> Self {
        ModuleBaseCache {
            inner: TtlCache::new(MODULE_CACHE_TTL),
        }
    }

    fn key(process: &str, module: &str) -> (String, String) {
        (process.to_lowercase(), module.to_lowercase())
    }

    pub fn get(&self, process: &str, module: &str) -> Option<Address> {
        self.inner.get(&Self::key(process, module))
    }

    pub fn put(&mut self, process: &str, module: &str, base: Address) {
        self.inner.put(Self::key(process, module), base);
    }

    pub fn sweep(&mut self) {
        self.inner.sweep();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
