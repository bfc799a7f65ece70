//! Contracts for the external search path, index epochs and tenant quotas

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::fingerprint::QueryFingerprint;
use crate::domain::DomainError;

/// One scored hit returned by the search executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Result payload cached per fingerprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
}

impl SearchResult {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

/// Executes a similarity search on a cache miss or prefetch.
///
/// `scan_budget` carries the guardrail's reduced candidate budget while
/// degraded; `None` means the executor's default budget applies. Failures
/// are search errors, not cache errors.
#[async_trait]
pub trait SearchExecutor: Send + Sync + Debug {
    async fn execute(
        &self,
        fingerprint: &QueryFingerprint,
        scan_budget: Option<usize>,
    ) -> Result<SearchResult, DomainError>;
}

/// Read access to per-(tenant, index) mutation epochs.
///
/// An index that has never been mutated reports epoch 0.
pub trait IndexEpochs: Send + Sync + Debug {
    fn epoch(&self, tenant_id: &str, index_name: &str) -> u64;
}

/// Supplies each tenant's configured cache memory budget in bytes.
///
/// `None` means the tenant has no explicit quota and the store's default
/// budget applies.
pub trait TenantQuotaProvider: Send + Sync + Debug {
    fn cache_budget_bytes(&self, tenant_id: &str) -> Option<u64>;
}
