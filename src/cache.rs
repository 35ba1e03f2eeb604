use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use moka::Expiry;
use moka::future::Cache;
use serde_json::Value;

use crate::config::CacheConfig;
use crate::types::MarketInfo;

/// Cache key: entity kind plus identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum CacheKey {
    /// Resolved metadata, keyed by condition id.
    MarketInfo(String),
    /// Raw trade page, keyed by lowercase wallet address.
    Trades(String),
}

#[derive(Debug, Clone)]
pub enum CacheValue {
    MarketInfo(Arc<MarketInfo>),
    Trades(Arc<Vec<Value>>),
}

/// Capability interface the resolver and scanner depend on.
#[async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<CacheValue>;

    async fn put(&self, key: CacheKey, value: CacheValue);

    /// Return the cached value or run `fetch`. A `None` from `fetch` is not
    /// cached. Concurrent callers for one key share a single fetch.
    async fn get_or_fetch(
        &self,
        key: CacheKey,
        fetch: BoxFuture<'_, Option<CacheValue>>,
    ) -> Option<CacheValue>;

    /// Drop the per-refresh tier only.
    fn invalidate_session(&self);

    /// Drop both tiers.
    fn invalidate_all(&self);
}

/// Per-kind TTL for the shared tier.
struct KindExpiry {
    market_ttl: Duration,
    trades_ttl: Duration,
}

impl Expiry<CacheKey, CacheValue> for KindExpiry {
    fn expire_after_create(
        &self,
        key: &CacheKey,
        _value: &CacheValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(match key {
            CacheKey::MarketInfo(_) => self.market_ttl,
            CacheKey::Trades(_) => self.trades_ttl,
        })
    }
}

/// moka-backed two-tier [`LookupCache`].
///
/// The TTL tier survives refreshes and bounds the external call rate; each
/// entity kind carries its own TTL. The session tier pins values for one
/// refresh cycle and is dropped by [`LookupCache::invalidate_session`].
#[derive(Clone)]
pub struct TieredCache {
    session: Cache<CacheKey, CacheValue>,
    shared: Cache<CacheKey, CacheValue>,
}

impl TieredCache {
    pub fn new(config: &CacheConfig) -> Self {
        let session = Cache::builder().max_capacity(config.max_capacity).build();
        let shared = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(KindExpiry {
                market_ttl: Duration::from_secs(config.market_ttl_secs),
                trades_ttl: Duration::from_secs(config.trades_ttl_secs),
            })
            .build();
        Self { session, shared }
    }
}

#[async_trait]
impl LookupCache for TieredCache {
    async fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        if let Some(value) = self.session.get(key).await {
            return Some(value);
        }
        let value = self.shared.get(key).await?;
        self.session.insert(key.clone(), value.clone()).await;
        Some(value)
    }

    async fn put(&self, key: CacheKey, value: CacheValue) {
        self.shared.insert(key.clone(), value.clone()).await;
        self.session.insert(key, value).await;
    }

    async fn get_or_fetch(
        &self,
        key: CacheKey,
        fetch: BoxFuture<'_, Option<CacheValue>>,
    ) -> Option<CacheValue> {
        if let Some(value) = self.session.get(&key).await {
            return Some(value);
        }
        let value = self.shared.optionally_get_with(key.clone(), fetch).await?;
        self.session.insert(key, value.clone()).await;
        Some(value)
    }

    fn invalidate_session(&self) {
        self.session.invalidate_all();
    }

    fn invalidate_all(&self) {
        self.session.invalidate_all();
        self.shared.invalidate_all();
    }
}
