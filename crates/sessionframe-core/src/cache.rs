//! Bounded, sharded cache of live security contexts.
//!
//! Contexts are indexed by (context id, key generation). All generations of
//! one context id live in the same shard, so `get_all` and `remove_all` take
//! a single lock. Reads take a shard read lock; writes lock one shard
//! exclusively and never more than one shard at a time.
//!
//! Capacity is enforced with an atomic slot counter: an insert first reserves
//! a slot, then writes. When the cache is full the configured
//! [`EvictionPolicy`] either evicts the context that expires first or
//! rejects the insert.
//!
//! Every entry carries a cache expiry, initially the context's
//! `token_valid_to`. [`ContextCache::update_key_validity`] can pull it in,
//! which is how a superseded key generation is retired at rollover.
//!
//! Expiry is lazy: `get` treats an entry past its cache expiry as absent and
//! drops it. [`ContextCache::sweep_expired`] purges everything expired and is
//! driven periodically by the server's sweeper task.

use std::{
    collections::HashMap,
    hash::{BuildHasher, RandomState},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::RwLock;

use crate::{
    context::{CacheError, ContextId, KeyGeneration, SecurityContext},
    time::Timestamp,
};

/// Default maximum number of cached contexts.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: usize = 16;

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Eviction attempts before an insert gives up under heavy contention.
const MAX_EVICTION_ATTEMPTS: usize = 16;

/// What to do when an insert finds the cache full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict the context with the earliest cache expiry
    EvictOldestExpiring,
    /// Fail with [`CacheError::CacheFull`]
    Reject,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached contexts
    pub capacity: usize,
    /// Behaviour at capacity
    pub eviction: EvictionPolicy,
    /// Number of independently locked shards
    pub shard_count: usize,
    /// Interval for the background sweeper
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            eviction: EvictionPolicy::EvictOldestExpiring,
            shard_count: DEFAULT_SHARD_COUNT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A cached context and the instant the cache stops serving it.
#[derive(Clone)]
struct CacheEntry {
    context: SecurityContext,
    expires_at: Timestamp,
}

impl CacheEntry {
    fn new(context: SecurityContext) -> Self {
        let expires_at = context.token_valid_to();
        Self { context, expires_at }
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

type Generations = HashMap<Option<KeyGeneration>, CacheEntry>;
type Shard = RwLock<HashMap<ContextId, Generations>>;

/// Thread-safe context cache. Share it behind an `Arc`.
pub struct ContextCache {
    shards: Box<[Shard]>,
    hasher: RandomState,
    len: AtomicUsize,
    config: CacheConfig,
}

impl std::fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ContextCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        let shards = (0..shard_count).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, hasher: RandomState::new(), len: AtomicUsize::new(0), config }
    }

    /// Configuration this cache was created with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of cached entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a context.
    ///
    /// An entry with the same (context id, key generation) is replaced in
    /// place and does not count against capacity.
    ///
    /// # Errors
    ///
    /// - `CacheFull` if at capacity and the policy is
    ///   [`EvictionPolicy::Reject`], or if no entry could be evicted
    pub fn add(&self, context: SecurityContext) -> Result<(), CacheError> {
        let Some(context) = self.replace_existing(context) else {
            return Ok(());
        };

        let mut attempts = 0;
        while !self.try_reserve() {
            if self.config.eviction == EvictionPolicy::Reject
                || attempts == MAX_EVICTION_ATTEMPTS
                || !self.evict_one()
            {
                tracing::debug!(
                    context_id = %context.context_id(),
                    capacity = self.config.capacity,
                    "context cache full"
                );
                return Err(CacheError::CacheFull { capacity: self.config.capacity });
            }
            attempts += 1;
        }

        self.insert_reserved(context);
        Ok(())
    }

    /// Insert a context without evicting. Returns `false` if the cache is
    /// full.
    pub fn try_add(&self, context: SecurityContext) -> bool {
        let Some(context) = self.replace_existing(context) else {
            return true;
        };
        if !self.try_reserve() {
            return false;
        }
        self.insert_reserved(context);
        true
    }

    /// Look up one generation of a context.
    ///
    /// Returns `None` if absent or if `now` is past its cache expiry; an
    /// expired entry is dropped on the way out.
    pub fn get(
        &self,
        context_id: &ContextId,
        key_generation: Option<&KeyGeneration>,
        now: Timestamp,
    ) -> Option<SecurityContext> {
        let generation = key_generation.cloned();
        let shard = self.shard(context_id);

        let found = {
            let guard = shard.read();
            guard.get(context_id).and_then(|generations| generations.get(&generation)).cloned()
        }?;

        if found.is_expired(now) {
            self.remove_if_expired(context_id, &generation, now);
            return None;
        }
        Some(found.context)
    }

    /// All live generations of a context.
    pub fn get_all(&self, context_id: &ContextId, now: Timestamp) -> Vec<SecurityContext> {
        let guard = self.shard(context_id).read();
        guard
            .get(context_id)
            .map(|generations| {
                generations
                    .values()
                    .filter(|entry| !entry.is_expired(now))
                    .map(|entry| entry.context.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove one generation. Returns the removed context.
    pub fn remove(
        &self,
        context_id: &ContextId,
        key_generation: Option<&KeyGeneration>,
    ) -> Option<SecurityContext> {
        let generation = key_generation.cloned();
        let mut guard = self.shard(context_id).write();
        let generations = guard.get_mut(context_id)?;
        let removed = generations.remove(&generation)?;
        if generations.is_empty() {
            guard.remove(context_id);
        }
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(removed.context)
    }

    /// Remove every generation of a context. Returns how many were removed.
    pub fn remove_all(&self, context_id: &ContextId) -> usize {
        let removed = self.shard(context_id).write().remove(context_id).map_or(0, |g| g.len());
        if removed > 0 {
            self.len.fetch_sub(removed, Ordering::AcqRel);
        }
        removed
    }

    /// Move the caching horizon of a cached context.
    ///
    /// Stores `context` with `key_valid_to` set to `expiry` and stops
    /// serving it after `expiry`. Both are clamped to the token window, so
    /// the horizon can move anywhere up to `token_valid_to` but never past
    /// it. Key material is untouched. Returns `false` if no entry with the
    /// same key is cached.
    pub fn update_key_validity(&self, context: &SecurityContext, expiry: Timestamp) -> bool {
        let key = context.cache_key();
        let mut guard = self.shard(&key.context_id).write();
        let Some(slot) =
            guard.get_mut(&key.context_id).and_then(|g| g.get_mut(&key.key_generation))
        else {
            return false;
        };
        let updated = context.with_key_expiry(expiry);
        let expires_at = expiry.min(updated.token_valid_to());
        tracing::debug!(
            context_id = %key.context_id,
            key_generation = ?key.key_generation.as_ref().map(KeyGeneration::as_str),
            expires_at = %expires_at,
            "moved context caching horizon"
        );
        *slot = CacheEntry { context: updated, expires_at };
        true
    }

    /// Purge every entry past its cache expiry. Returns how many were
    /// removed.
    pub fn sweep_expired(&self, now: Timestamp) -> usize {
        let mut removed = 0;
        for shard in &*self.shards {
            let mut guard = shard.write();
            guard.retain(|_, generations| {
                let before = generations.len();
                generations.retain(|_, entry| !entry.is_expired(now));
                removed += before - generations.len();
                !generations.is_empty()
            });
        }
        if removed > 0 {
            self.len.fetch_sub(removed, Ordering::AcqRel);
            tracing::debug!(removed, remaining = self.len(), "swept expired contexts");
        }
        removed
    }

    fn shard(&self, context_id: &ContextId) -> &Shard {
        let index = self.hasher.hash_one(context_id) as usize % self.shards.len();
        &self.shards[index]
    }

    /// Replace an existing entry in place. Hands the context back if there
    /// was nothing to replace.
    fn replace_existing(&self, context: SecurityContext) -> Option<SecurityContext> {
        let key = context.cache_key();
        let mut guard = self.shard(&key.context_id).write();
        match guard.get_mut(&key.context_id).and_then(|g| g.get_mut(&key.key_generation)) {
            Some(slot) => {
                *slot = CacheEntry::new(context);
                None
            },
            None => Some(context),
        }
    }

    fn try_reserve(&self) -> bool {
        let capacity = self.config.capacity;
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                (len < capacity).then_some(len + 1)
            })
            .is_ok()
    }

    /// Insert using a slot already reserved. Gives the slot back if a
    /// concurrent insert of the same key got there first.
    fn insert_reserved(&self, context: SecurityContext) {
        let key = context.cache_key();
        tracing::debug!(
            context_id = %key.context_id,
            key_generation = ?key.key_generation.as_ref().map(KeyGeneration::as_str),
            "caching context"
        );

        let mut guard = self.shard(&key.context_id).write();
        let previous = guard
            .entry(key.context_id)
            .or_default()
            .insert(key.key_generation, CacheEntry::new(context));
        if previous.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Evict the entry with the earliest cache expiry.
    ///
    /// Candidates are found with one shard read lock at a time, then removed
    /// under that shard's write lock if still present.
    fn evict_one(&self) -> bool {
        let mut candidate: Option<(usize, ContextId, Option<KeyGeneration>, Timestamp)> = None;

        for (index, shard) in self.shards.iter().enumerate() {
            let guard = shard.read();
            for (context_id, generations) in guard.iter() {
                for (generation, entry) in generations {
                    let expiry = entry.expires_at;
                    if candidate.as_ref().is_none_or(|(_, _, _, best)| expiry < *best) {
                        candidate = Some((index, context_id.clone(), generation.clone(), expiry));
                    }
                }
            }
        }

        let Some((index, context_id, generation, expiry)) = candidate else {
            return false;
        };

        let mut guard = self.shards[index].write();
        let Some(generations) = guard.get_mut(&context_id) else {
            // Removed concurrently; a slot may have been freed
            return true;
        };
        if generations.remove(&generation).is_some() {
            if generations.is_empty() {
                guard.remove(&context_id);
            }
            self.len.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(context_id = %context_id, expiry = %expiry, "evicted context");
        }
        true
    }

    fn remove_if_expired(
        &self,
        context_id: &ContextId,
        generation: &Option<KeyGeneration>,
        now: Timestamp,
    ) {
        let mut guard = self.shard(context_id).write();
        let Some(generations) = guard.get_mut(context_id) else {
            return;
        };
        if generations.get(generation).is_some_and(|entry| entry.is_expired(now)) {
            generations.remove(generation);
            if generations.is_empty() {
                guard.remove(context_id);
            }
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
