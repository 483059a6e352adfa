//! Shaped-result cache with per-class TTL and LRU eviction.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::Expiry;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tokio::time::Instant;
use wca_gateway_sdk::{ResourceClass, ResourceIdentity, ShapedResult, ShapingPolicy};
use xxhash_rust::xxh3::xxh3_128;

use crate::config::{MAX_TTL, TtlConfig};
use crate::domain::error::DomainError;
use crate::domain::single_flight::{FlightRole, SingleFlight};

/// 128-bit hash of a canonical identity, optionally combined with a shaping policy.
pub type CacheKey = u128;

/// Key of one shaped view: `hash(identity, policy)`.
#[must_use]
pub fn view_key(identity: &ResourceIdentity, policy: &ShapingPolicy) -> CacheKey {
    let material = format!("{}\u{1f}{}", identity.canonical(), policy.canonical());
    xxh3_128(material.as_bytes())
}

/// Key of the raw upstream document: `hash(upstream path)`. Identities that differ
/// only in filters read the same document and share this key.
#[must_use]
pub fn document_key(identity: &ResourceIdentity) -> CacheKey {
    xxh3_128(identity.upstream_path().as_bytes())
}

/// An immutable cached value. Replaced as a whole, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Canonical identity the value was shaped from.
    pub identity: String,
    pub value: ShapedResult,
    pub fetched_at: Instant,
    pub expires_at: Instant,
    pub size_bytes: usize,
}

impl CacheEntry {
    #[must_use]
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.fetched_at)
    }
}

/// Lets moka reclaim memory once an entry's own TTL has passed.
struct EntryExpiry;

impl Expiry<CacheKey, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<CacheEntry>,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl())
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &Arc<CacheEntry>,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl())
    }
}

/// Whether a lookup was answered from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    /// Populated by this call.
    Miss,
    /// Populated by a concurrent call this one waited for.
    Coalesced,
}

/// Bounded store of shaped results.
///
/// Validity is decided against the tokio clock (`now < expires_at`), so expiry can be
/// driven deterministically from tests with a paused clock.
pub struct CacheStore {
    entries: Cache<CacheKey, Arc<CacheEntry>>,
    ttl: TtlConfig,
    populating: SingleFlight<CacheKey, Arc<CacheEntry>, DomainError>,
}

impl CacheStore {
    #[must_use]
    pub fn new(capacity: u64, ttl: TtlConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryExpiry)
            .support_invalidation_closures()
            .build();

        Self {
            entries,
            ttl,
            populating: SingleFlight::new(),
        }
    }

    /// Valid entry for `key`, if any.
    pub async fn get(&self, key: CacheKey) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.get(&key).await?;
        entry.is_valid_at(Instant::now()).then_some(entry)
    }

    /// Store `value`, replacing any previous entry for `key`.
    pub async fn put(
        &self,
        key: CacheKey,
        identity: &ResourceIdentity,
        value: ShapedResult,
        class: ResourceClass,
    ) -> Arc<CacheEntry> {
        let entry = make_entry(&self.ttl, key, identity.canonical(), value, class);
        self.entries.insert(key, Arc::clone(&entry)).await;
        entry
    }

    /// Return the valid entry for `key`, or run `populate` once (across all concurrent
    /// callers for `key`) and store its value. Failures are never stored.
    ///
    /// # Errors
    /// Propagates the error returned by `populate`.
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: CacheKey,
        identity: &ResourceIdentity,
        class: ResourceClass,
        populate: F,
    ) -> Result<(Arc<CacheEntry>, Lookup), DomainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ShapedResult, DomainError>> + Send + 'static,
    {
        if let Some(entry) = self.get(key).await {
            return Ok((entry, Lookup::Hit));
        }

        let entries = self.entries.clone();
        let ttl = self.ttl.clone();
        let canonical = identity.canonical().to_owned();
        let (result, role) = self
            .populating
            .run(key, move || {
                let work = populate();
                async move {
                    // A producer that finished just before this one registered may
                    // already have stored a fresh entry.
                    if let Some(entry) = entries.get(&key).await
                        && entry.is_valid_at(Instant::now())
                    {
                        return Ok(entry);
                    }
                    let value = work.await?;
                    let entry = make_entry(&ttl, key, &canonical, value, class);
                    entries.insert(key, Arc::clone(&entry)).await;
                    tracing::info!(
                        identity = %canonical,
                        ttl = ?entry.ttl(),
                        bytes = entry.size_bytes,
                        "cache populated"
                    );
                    Ok(entry)
                }
            })
            .await;

        let lookup = match role {
            FlightRole::Leader => Lookup::Miss,
            FlightRole::Follower => Lookup::Coalesced,
        };
        result.map(|entry| (entry, lookup))
    }

    /// Remove one entry immediately.
    pub async fn invalidate(&self, key: CacheKey) {
        self.entries.invalidate(&key).await;
    }

    /// Remove every entry shaped from `identity`.
    pub fn invalidate_identity(&self, identity: &ResourceIdentity) {
        let canonical = identity.canonical().to_owned();
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |_, entry| entry.identity == canonical)
        {
            tracing::warn!(error = %e, "cache invalidation by identity failed");
        }
    }

    /// Number of live entries, after pending maintenance is applied.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Number of populations currently running.
    #[must_use]
    pub fn populating(&self) -> usize {
        self.populating.in_flight()
    }
}

fn make_entry(
    ttl: &TtlConfig,
    key: CacheKey,
    identity: &str,
    value: ShapedResult,
    class: ResourceClass,
) -> Arc<CacheEntry> {
    let fetched_at = Instant::now();
    let lifetime = ttl.for_class(class).min(MAX_TTL);
    let size_bytes = serde_json::to_vec(&value.payload).map_or(0, |bytes| bytes.len());
    Arc::new(CacheEntry {
        key,
        identity: identity.to_owned(),
        value,
        fetched_at,
        expires_at: fetched_at.checked_add(lifetime).unwrap_or(fetched_at),
        size_bytes,
    })
}
