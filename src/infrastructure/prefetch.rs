//! Predictive prefetching
//!
//! Predicted fingerprints are queued onto a bounded channel and executed in
//! the background against the search path to pre-populate the cache.
//! Prefetching is best-effort: a full queue drops the enqueue rather than
//! backpressuring the request path, and one failed prefetch never kills the
//! consumer.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::PrefetchConfig;
use crate::domain::{DomainError, QueryFingerprint, SearchExecutor};
use crate::infrastructure::result_cache::ResultCache;
use crate::infrastructure::slo::SloGuardrail;

/// Handle for enqueuing predicted fingerprints
#[derive(Debug, Clone)]
pub struct PredictivePrefetcher {
    queue: mpsc::Sender<QueryFingerprint>,
}

impl PredictivePrefetcher {
    /// Spawns the background consumer and returns the enqueue handle plus
    /// the consumer task
    pub fn spawn(
        result_cache: Arc<ResultCache>,
        executor: Arc<dyn SearchExecutor>,
        guardrail: Arc<SloGuardrail>,
        config: PrefetchConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));

        let consumer = PrefetchConsumer {
            result_cache,
            executor,
            guardrail,
            parallelism: Arc::new(Semaphore::new(config.max_parallelism.max(1))),
            receiver,
            shutdown,
        };
        let handle = tokio::spawn(consumer.run());

        (Self { queue }, handle)
    }

    /// Non-blocking; returns whether the fingerprint was accepted. A full
    /// queue drops the prefetch silently.
    pub fn enqueue(&self, fingerprint: QueryFingerprint) -> bool {
        match self.queue.try_send(fingerprint) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("prefetch queue full, dropping prefetch");
                counter!("prefetch_dropped_total").increment(1);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("prefetch consumer stopped, dropping prefetch");
                false
            }
        }
    }
}

struct PrefetchConsumer {
    result_cache: Arc<ResultCache>,
    executor: Arc<dyn SearchExecutor>,
    guardrail: Arc<SloGuardrail>,
    parallelism: Arc<Semaphore>,
    receiver: mpsc::Receiver<QueryFingerprint>,
    shutdown: watch::Receiver<bool>,
}

impl PrefetchConsumer {
    async fn run(mut self) {
        debug!("prefetch consumer starting");

        loop {
            tokio::select! {
                received = self.receiver.recv() => {
                    let Some(fingerprint) = received else {
                        break;
                    };
                    let Ok(permit) = self.parallelism.clone().acquire_owned().await else {
                        break;
                    };

                    let result_cache = self.result_cache.clone();
                    let executor = self.executor.clone();
                    let guardrail = self.guardrail.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(error) =
                            prefetch_one(&result_cache, &*executor, &guardrail, &fingerprint).await
                        {
                            warn!(error = %error, "prefetch failed");
                        }
                    });
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("prefetch consumer stopped");
    }
}

/// Equivalent of a cache-missed lookup: execute under the guardrail's
/// current admission mode and write through the result cache. Already-cached
/// fingerprints short-circuit.
async fn prefetch_one(
    result_cache: &ResultCache,
    executor: &dyn SearchExecutor,
    guardrail: &SloGuardrail,
    fingerprint: &QueryFingerprint,
) -> Result<(), DomainError> {
    if result_cache.try_get(fingerprint).await?.is_some() {
        counter!("prefetch_already_cached_total").increment(1);
        return Ok(());
    }

    let result = executor
        .execute(fingerprint, guardrail.scan_budget())
        .await?;
    result_cache.set(fingerprint, &result).await?;
    counter!("prefetch_completed_total").increment(1);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SloConfig;
    use crate::domain::{
        CachingPolicy, DistanceMetric, SearchHit, SearchResult, TenantQuotaProvider,
    };
    use crate::infrastructure::alias::SemanticAliasIndex;
    use crate::infrastructure::epoch::IndexEpochRegistry;
    use crate::infrastructure::policy::StaticCachePolicy;
    use crate::infrastructure::store::TenantCacheStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct NoQuotas;

    impl TenantQuotaProvider for NoQuotas {
        fn cache_budget_bytes(&self, _tenant_id: &str) -> Option<u64> {
            None
        }
    }

    #[derive(Debug)]
    struct CountingExecutor {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingExecutor {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchExecutor for CountingExecutor {
        async fn execute(
            &self,
            fingerprint: &QueryFingerprint,
            _scan_budget: Option<usize>,
        ) -> Result<SearchResult, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DomainError::search("executor unavailable"));
            }
            Ok(SearchResult::new(vec![SearchHit::new(
                format!("hit-{}", fingerprint.top_k()),
                1.0,
            )]))
        }
    }

    fn result_cache() -> Arc<ResultCache> {
        let storage = Arc::new(TenantCacheStore::new(Arc::new(NoQuotas), 1024 * 1024));
        let policy: Arc<dyn CachingPolicy> =
            Arc::new(StaticCachePolicy::new(Duration::from_secs(60)));
        Arc::new(ResultCache::new(
            storage,
            Arc::new(IndexEpochRegistry::new()),
            Arc::new(SemanticAliasIndex::new()),
            policy,
        ))
    }

    fn guardrail() -> Arc<SloGuardrail> {
        Arc::new(SloGuardrail::new(SloConfig::default()))
    }

    fn fingerprint(top_k: usize) -> QueryFingerprint {
        QueryFingerprint::new("t1", "idx1", vec![1.0, 2.0], top_k, DistanceMetric::L2, None)
            .unwrap()
    }

    async fn wait_until_cached(cache: &ResultCache, fingerprint: &QueryFingerprint) {
        for _ in 0..100 {
            if cache.try_get(fingerprint).await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("prefetch did not populate the cache in time");
    }

    #[tokio::test]
    async fn test_prefetch_populates_cache() {
        let cache = result_cache();
        let executor = Arc::new(CountingExecutor::new(false));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (prefetcher, _task) = PredictivePrefetcher::spawn(
            cache.clone(),
            executor.clone(),
            guardrail(),
            PrefetchConfig::default(),
            shutdown_rx,
        );

        assert!(prefetcher.enqueue(fingerprint(10)));
        wait_until_cached(&cache, &fingerprint(10)).await;
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_on_full_queue_drops_without_blocking() {
        // No consumer attached; the queue just fills up
        let (queue, _receiver) = mpsc::channel(1);
        let prefetcher = PredictivePrefetcher { queue };

        assert!(prefetcher.enqueue(fingerprint(10)));
        assert!(!prefetcher.enqueue(fingerprint(20)));
    }

    #[tokio::test]
    async fn test_already_cached_fingerprint_skips_executor() {
        let cache = result_cache();
        let executor = Arc::new(CountingExecutor::new(false));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        cache
            .set(&fingerprint(10), &SearchResult::default())
            .await
            .unwrap();

        let (prefetcher, _task) = PredictivePrefetcher::spawn(
            cache.clone(),
            executor.clone(),
            guardrail(),
            PrefetchConfig::default(),
            shutdown_rx,
        );

        assert!(prefetcher.enqueue(fingerprint(10)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_executor_failure_does_not_kill_consumer() {
        let cache = result_cache();
        let failing = Arc::new(CountingExecutor::new(true));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (prefetcher, _task) = PredictivePrefetcher::spawn(
            cache.clone(),
            failing.clone(),
            guardrail(),
            PrefetchConfig::default(),
            shutdown_rx,
        );

        assert!(prefetcher.enqueue(fingerprint(10)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(failing.calls(), 1);

        // The consumer is still draining after the failure
        assert!(prefetcher.enqueue(fingerprint(20)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(failing.calls(), 2);
    }

    #[tokio::test]
    async fn test_consumer_stops_on_shutdown() {
        let cache = result_cache();
        let executor = Arc::new(CountingExecutor::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (_prefetcher, task) = PredictivePrefetcher::spawn(
            cache,
            executor,
            guardrail(),
            PrefetchConfig::default(),
            shutdown_rx,
        );

        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("consumer did not stop")
            .unwrap();
    }
}
