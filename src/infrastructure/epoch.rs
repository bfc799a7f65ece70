//! Index mutation epochs and write-heat tracking
//!
//! Every mutation to a (tenant, index) pair bumps its epoch. Cached results
//! embed the epoch they were computed under in their storage key, so
//! advancing the epoch invalidates them implicitly without enumerating or
//! deleting entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::domain::IndexEpochs;

const HEAT_WINDOW: Duration = Duration::from_secs(60);
const HOT_WRITES_PER_WINDOW: u64 = 10;
const HOT_TTL_FACTOR: f64 = 0.1;
const MIN_DAMPED_TTL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct WriteHeat {
    window_start: Instant,
    count: u64,
}

#[derive(Debug)]
struct IndexState {
    epoch: AtomicU64,
    heat: Mutex<WriteHeat>,
}

impl IndexState {
    fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            heat: Mutex::new(WriteHeat {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }
}

/// Monotonic per-(tenant, index) mutation counters plus a rolling write-heat
/// window used to dampen cache TTLs for churning indexes
#[derive(Debug, Default)]
pub struct IndexEpochRegistry {
    indexes: DashMap<String, IndexState>,
}

impl IndexEpochRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_key(tenant_id: &str, index_name: &str) -> String {
        format!("{}:{}", tenant_id, index_name)
    }

    /// Current epoch; 0 for an index that has never been mutated
    pub fn epoch(&self, tenant_id: &str, index_name: &str) -> u64 {
        self.indexes
            .get(&Self::index_key(tenant_id, index_name))
            .map(|state| state.epoch.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Bumps the epoch for one index mutation and returns the new value
    pub fn increment(&self, tenant_id: &str, index_name: &str) -> u64 {
        let key = Self::index_key(tenant_id, index_name);
        let state = self.indexes.entry(key).or_insert_with(IndexState::new);

        Self::record_write(&state.heat);
        state.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// TTL recommendation for cached results of this index: a hot index
    /// (more than HOT_WRITES_PER_WINDOW mutations in the current window)
    /// gets 10% of the base TTL, clamped to at least one second
    pub fn recommended_ttl(&self, tenant_id: &str, index_name: &str, base: Duration) -> Duration {
        let key = Self::index_key(tenant_id, index_name);
        let Some(state) = self.indexes.get(&key) else {
            return base;
        };

        let heat = state.heat.lock().unwrap_or_else(|e| e.into_inner());
        let in_window = heat.window_start.elapsed() <= HEAT_WINDOW;
        if !in_window || heat.count <= HOT_WRITES_PER_WINDOW {
            return base;
        }

        let damped = base.mul_f64(HOT_TTL_FACTOR);
        damped.max(MIN_DAMPED_TTL)
    }

    fn record_write(heat: &Mutex<WriteHeat>) {
        let mut heat = heat.lock().unwrap_or_else(|e| e.into_inner());
        if heat.window_start.elapsed() > HEAT_WINDOW {
            heat.window_start = Instant::now();
            heat.count = 0;
        }
        heat.count += 1;
    }
}

impl IndexEpochs for IndexEpochRegistry {
    fn epoch(&self, tenant_id: &str, index_name: &str) -> u64 {
        IndexEpochRegistry::epoch(self, tenant_id, index_name)
    }
}
