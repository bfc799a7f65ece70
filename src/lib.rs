//! PMP Vector Cache
//!
//! Tenant-aware adaptive result cache for vector similarity search:
//! - Query fingerprinting and semantic alias canonicalization
//! - Epoch-based implicit invalidation for mutable indexes
//! - Per-tenant byte budgets with deny-new overflow behavior
//! - Pluggable caching policy with atomically-swappable configuration
//! - SLO-driven degraded-mode admission control
//! - Predictive background prefetching

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use domain::{CacheStorage, CachingPolicy, SearchExecutor, TenantQuotaProvider};
use infrastructure::alias::SemanticAliasIndex;
use infrastructure::epoch::IndexEpochRegistry;
use infrastructure::policy::{DynamicCachePolicy, PolicyConfigStore};
use infrastructure::prefetch::PredictivePrefetcher;
use infrastructure::result_cache::ResultCache;
use infrastructure::slo::{SloGuardrail, SloMonitor};
use infrastructure::store::TenantCacheStore;

/// Fully wired caching subsystem and its background tasks.
///
/// Holds the SLO monitor, alias cleanup, and prefetch consumer tasks;
/// `shutdown` stops them cooperatively and waits for them to finish.
pub struct CacheRuntime {
    pub result_cache: Arc<ResultCache>,
    pub guardrail: Arc<SloGuardrail>,
    pub prefetcher: PredictivePrefetcher,
    pub aliases: Arc<SemanticAliasIndex>,
    pub epochs: Arc<IndexEpochRegistry>,
    pub policy_config: Arc<PolicyConfigStore>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl CacheRuntime {
    /// Signals all background tasks and waits for them to stop
    pub async fn shutdown(mut self) {
        info!("shutting down cache runtime");
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Wires the cache subsystem from configuration and external collaborators
pub async fn create_cache_runtime(
    config: &AppConfig,
    executor: Arc<dyn SearchExecutor>,
    quotas: Arc<dyn TenantQuotaProvider>,
) -> anyhow::Result<CacheRuntime> {
    anyhow::ensure!(
        config.cache.default_tenant_budget_bytes > 0,
        "default tenant cache budget must be positive"
    );

    let epochs = Arc::new(IndexEpochRegistry::new());
    let aliases = Arc::new(SemanticAliasIndex::new());
    let storage: Arc<dyn CacheStorage> = Arc::new(TenantCacheStore::new(
        quotas,
        config.cache.default_tenant_budget_bytes,
    ));
    let policy_config = Arc::new(PolicyConfigStore::new(config.policy.clone()));
    let policy: Arc<dyn CachingPolicy> = Arc::new(
        DynamicCachePolicy::new(policy_config.clone()).with_write_heat(epochs.clone()),
    );

    let result_cache = Arc::new(ResultCache::new(
        storage,
        epochs.clone(),
        aliases.clone(),
        policy,
    ));
    let guardrail = Arc::new(SloGuardrail::new(config.slo.clone()));

    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    tasks.push(
        SloMonitor::new(guardrail.clone(), config.slo.clone()).spawn(shutdown_rx.clone()),
    );
    tasks.push(spawn_alias_cleanup(
        aliases.clone(),
        Duration::from_secs(config.cache.alias_cleanup_interval_secs.max(1)),
        shutdown_rx.clone(),
    ));

    let (prefetcher, prefetch_task) = PredictivePrefetcher::spawn(
        result_cache.clone(),
        executor,
        guardrail.clone(),
        config.prefetch.clone(),
        shutdown_rx,
    );
    tasks.push(prefetch_task);

    info!("cache runtime started");

    Ok(CacheRuntime {
        result_cache,
        guardrail,
        prefetcher,
        aliases,
        epochs,
        policy_config,
        shutdown,
        tasks,
    })
}

fn spawn_alias_cleanup(
    aliases: Arc<SemanticAliasIndex>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = aliases.cleanup_expired();
                    if removed > 0 {
                        debug!(removed, "expired aliases removed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("alias cleanup stopped");
    })
}
