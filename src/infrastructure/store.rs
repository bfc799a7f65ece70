//! Tenant-partitioned in-memory cache storage
//!
//! Each tenant owns an isolated shard with its own byte budget. Writes that
//! would exceed the budget are denied, leaving existing entries intact; TTL
//! expiry is applied lazily at read time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use tracing::debug;

use crate::domain::{CacheStorage, TenantQuotaProvider};

#[derive(Debug, Clone)]
struct StoredEntry {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= Instant::now())
    }
}

#[derive(Debug)]
struct TenantShard {
    entries: DashMap<String, StoredEntry>,
    used_bytes: AtomicU64,
    budget_bytes: u64,
}

impl TenantShard {
    fn new(budget_bytes: u64) -> Self {
        Self {
            entries: DashMap::new(),
            used_bytes: AtomicU64::new(0),
            budget_bytes,
        }
    }

    fn entry_cost(key: &str, data: &Bytes) -> u64 {
        (key.len() + data.len()) as u64
    }

    /// Reserves `additional` bytes against the budget; false when the write
    /// would exceed it. Compare-exchange loop so concurrent writers cannot
    /// overshoot.
    fn try_charge(&self, additional: u64) -> bool {
        let mut used = self.used_bytes.load(Ordering::Acquire);
        loop {
            let projected = used + additional;
            if projected > self.budget_bytes {
                return false;
            }
            match self.used_bytes.compare_exchange_weak(
                used,
                projected,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => used = actual,
            }
        }
    }

    fn release(&self, amount: u64) {
        self.used_bytes.fetch_sub(amount, Ordering::AcqRel);
    }
}

/// In-memory `CacheStorage` with strict per-tenant byte accounting.
///
/// Budgets come from the quota provider at shard creation; tenants without
/// an explicit quota fall back to the configured default. One tenant's churn
/// never affects another tenant's stored bytes or admission decisions.
#[derive(Debug)]
pub struct TenantCacheStore {
    tenants: DashMap<String, Arc<TenantShard>>,
    quotas: Arc<dyn TenantQuotaProvider>,
    default_budget_bytes: u64,
}

impl TenantCacheStore {
    pub fn new(quotas: Arc<dyn TenantQuotaProvider>, default_budget_bytes: u64) -> Self {
        Self {
            tenants: DashMap::new(),
            quotas,
            default_budget_bytes,
        }
    }

    fn shard(&self, tenant_id: &str) -> Arc<TenantShard> {
        if let Some(shard) = self.tenants.get(tenant_id) {
            return shard.clone();
        }

        let budget = self
            .quotas
            .cache_budget_bytes(tenant_id)
            .unwrap_or(self.default_budget_bytes);
        self.tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(TenantShard::new(budget)))
            .clone()
    }

    /// Bytes currently accounted to a tenant
    pub fn used_bytes(&self, tenant_id: &str) -> u64 {
        self.tenants
            .get(tenant_id)
            .map(|shard| shard.used_bytes.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Number of live entries stored for a tenant
    pub fn entry_count(&self, tenant_id: &str) -> usize {
        self.tenants
            .get(tenant_id)
            .map(|shard| shard.entries.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStorage for TenantCacheStore {
    async fn try_get(&self, tenant_id: &str, key: &str) -> Option<Bytes> {
        let shard = self.tenants.get(tenant_id)?.clone();

        {
            let entry = shard.entries.get(key)?;
            if !entry.is_expired() {
                return Some(entry.data.clone());
            }
            // Guard dropped here; removing while holding it would deadlock
        }

        if let Some((removed_key, removed)) = shard.entries.remove(key) {
            shard.release(TenantShard::entry_cost(&removed_key, &removed.data));
        }
        None
    }

    async fn set(&self, tenant_id: &str, key: &str, value: Bytes, ttl: Option<Duration>) {
        let shard = self.shard(tenant_id);
        let cost = TenantShard::entry_cost(key, &value);
        let entry = StoredEntry {
            data: value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };

        match shard.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let prior = TenantShard::entry_cost(key, &occupied.get().data);
                if cost > prior {
                    if !shard.try_charge(cost - prior) {
                        counter!("vector_cache_store_rejected_total", "tenant" => tenant_id.to_string())
                            .increment(1);
                        debug!(tenant = tenant_id, "tenant cache budget exhausted, write dropped");
                        return;
                    }
                } else {
                    shard.release(prior - cost);
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                if !shard.try_charge(cost) {
                    counter!("vector_cache_store_rejected_total", "tenant" => tenant_id.to_string())
                        .increment(1);
                    debug!(tenant = tenant_id, "tenant cache budget exhausted, write dropped");
                    return;
                }
                vacant.insert(entry);
            }
        }
    }
}
