//! Result cache orchestration
//!
//! Single entry point combining alias canonicalization, epoch stamping,
//! policy-gated admission and tenant-bounded storage. The current index
//! epoch is embedded in the storage key, so mutating an index invalidates
//! its cached results implicitly instead of enumerating and deleting them.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tracing::trace;

use crate::domain::{
    CacheStorage, CachingPolicy, DomainError, IndexEpochs, QueryFingerprint, SearchResult,
};
use crate::infrastructure::alias::SemanticAliasIndex;

/// Policy-gated, epoch-aware read/write facade over the tenant cache store.
///
/// Callers on the search path should log cache errors and treat them as a
/// miss; a cache failure must never fail the user-visible query.
#[derive(Debug)]
pub struct ResultCache {
    storage: Arc<dyn CacheStorage>,
    epochs: Arc<dyn IndexEpochs>,
    aliases: Arc<SemanticAliasIndex>,
    policy: Arc<dyn CachingPolicy>,
}

impl ResultCache {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        epochs: Arc<dyn IndexEpochs>,
        aliases: Arc<SemanticAliasIndex>,
        policy: Arc<dyn CachingPolicy>,
    ) -> Self {
        Self {
            storage,
            epochs,
            aliases,
            policy,
        }
    }

    /// Looks up the canonicalized, epoch-stamped entry for a fingerprint.
    ///
    /// An epoch advance between write and read shows up as a miss because
    /// the storage key embeds the epoch.
    pub async fn try_get(
        &self,
        fingerprint: &QueryFingerprint,
    ) -> Result<Option<SearchResult>, DomainError> {
        let storage_key = self.storage_key(fingerprint);

        match self
            .storage
            .try_get(fingerprint.tenant_id(), &storage_key)
            .await
        {
            Some(data) => {
                let result = serde_json::from_slice(&data).map_err(|e| {
                    DomainError::serialization(format!("failed to decode cached result: {}", e))
                })?;
                counter!("vector_cache_hits_total", "tenant" => fingerprint.tenant_id().to_string())
                    .increment(1);
                trace!(key = %storage_key, "result cache hit");
                Ok(Some(result))
            }
            None => {
                counter!("vector_cache_misses_total", "tenant" => fingerprint.tenant_id().to_string())
                    .increment(1);
                trace!(key = %storage_key, "result cache miss");
                Ok(None)
            }
        }
    }

    /// Writes a result through the caching policy.
    ///
    /// A policy decline is a silent no-op; a storage denial (tenant over
    /// budget) degrades to a miss on the next read.
    pub async fn set(
        &self,
        fingerprint: &QueryFingerprint,
        result: &SearchResult,
    ) -> Result<(), DomainError> {
        let decision = self.policy.evaluate(fingerprint);
        if !decision.should_cache {
            counter!("vector_cache_policy_skips_total").increment(1);
            return Ok(());
        }

        let data = serde_json::to_vec(result).map_err(|e| {
            DomainError::serialization(format!("failed to encode search result: {}", e))
        })?;

        let storage_key = self.storage_key(fingerprint);
        self.storage
            .set(
                fingerprint.tenant_id(),
                &storage_key,
                Bytes::from(data),
                decision.ttl,
            )
            .await;
        counter!("vector_cache_stores_total", "tenant" => fingerprint.tenant_id().to_string())
            .increment(1);

        Ok(())
    }

    /// Substitutes the canonical hash when the alias index knows one
    fn canonical_hash(&self, fingerprint: &QueryFingerprint) -> u64 {
        let source_hash = fingerprint.hash64();
        match self.aliases.try_get_canonical(source_hash) {
            Some((canonical_hash, _confidence)) => canonical_hash,
            None => source_hash,
        }
    }

    fn storage_key(&self, fingerprint: &QueryFingerprint) -> String {
        let epoch = self
            .epochs
            .epoch(fingerprint.tenant_id(), fingerprint.index_name());
        format!(
            "cache:{}:{}:{}:{:016x}",
            fingerprint.tenant_id(),
            fingerprint.index_name(),
            epoch,
            self.canonical_hash(fingerprint)
        )
    }
}
