//! Caching contracts: storage, admission policy, policy configuration

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::domain::fingerprint::QueryFingerprint;

/// Decision returned by a caching policy for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDecision {
    pub should_cache: bool,
    pub ttl: Option<Duration>,
}

impl CacheDecision {
    /// Cache with the given time-to-live
    pub fn store(ttl: Duration) -> Self {
        Self {
            should_cache: true,
            ttl: Some(ttl),
        }
    }

    /// Do not cache this result
    pub fn skip() -> Self {
        Self {
            should_cache: false,
            ttl: None,
        }
    }
}

/// Pluggable cache admission policy.
///
/// Implementations must be cheap and side-effect free; `evaluate` runs on
/// every write-through.
pub trait CachingPolicy: Send + Sync + Debug {
    fn evaluate(&self, fingerprint: &QueryFingerprint) -> CacheDecision;
}

/// Live caching configuration, replaced as a whole unit so readers never
/// observe a partially-updated instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enabled: bool,
    pub default_ttl_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 60,
        }
    }
}

/// Tenant-partitioned storage for serialized result payloads.
///
/// `set` calls that would exceed the tenant's byte budget are dropped
/// silently; the entry simply misses on the next read. TTL expiry is lazy,
/// applied at read time.
#[async_trait]
pub trait CacheStorage: Send + Sync + Debug {
    async fn try_get(&self, tenant_id: &str, key: &str) -> Option<Bytes>;

    async fn set(&self, tenant_id: &str, key: &str, value: Bytes, ttl: Option<Duration>);
}
