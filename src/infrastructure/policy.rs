//! Cache admission policies

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::domain::{CacheDecision, CachingPolicy, PolicyConfig, QueryFingerprint};
use crate::infrastructure::epoch::IndexEpochRegistry;

/// Always caches with a fixed TTL; the baseline/fallback policy
#[derive(Debug, Clone)]
pub struct StaticCachePolicy {
    ttl: Duration,
}

impl StaticCachePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl CachingPolicy for StaticCachePolicy {
    fn evaluate(&self, _fingerprint: &QueryFingerprint) -> CacheDecision {
        CacheDecision::store(self.ttl)
    }
}

/// Holds the live `PolicyConfig`; updates replace the whole snapshot so a
/// concurrent reader never observes a mix of old and new fields
#[derive(Debug, Default)]
pub struct PolicyConfigStore {
    current: RwLock<Arc<PolicyConfig>>,
}

impl PolicyConfigStore {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Loads the current snapshot
    pub fn current(&self) -> Arc<PolicyConfig> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the configuration as a whole unit
    pub fn update(&self, config: PolicyConfig) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::new(config);
    }
}

/// Reads the live config snapshot on every evaluation.
///
/// When wired with the epoch registry, the TTL for results of a hot
/// (frequently mutated) index is damped so churned entries expire quickly.
#[derive(Debug)]
pub struct DynamicCachePolicy {
    config: Arc<PolicyConfigStore>,
    write_heat: Option<Arc<IndexEpochRegistry>>,
}

impl DynamicCachePolicy {
    pub fn new(config: Arc<PolicyConfigStore>) -> Self {
        Self {
            config,
            write_heat: None,
        }
    }

    pub fn with_write_heat(mut self, epochs: Arc<IndexEpochRegistry>) -> Self {
        self.write_heat = Some(epochs);
        self
    }
}

impl CachingPolicy for DynamicCachePolicy {
    fn evaluate(&self, fingerprint: &QueryFingerprint) -> CacheDecision {
        let config = self.config.current();
        if !config.enabled || config.default_ttl_secs == 0 {
            return CacheDecision::skip();
        }

        let mut ttl = Duration::from_secs(config.default_ttl_secs);
        if let Some(epochs) = &self.write_heat {
            ttl = epochs.recommended_ttl(fingerprint.tenant_id(), fingerprint.index_name(), ttl);
        }

        CacheDecision::store(ttl)
    }
}
