use serde::Deserialize;

use crate::domain::PolicyConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub policy: PolicyConfig,
    pub slo: SloConfig,
    pub prefetch: PrefetchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget applied to tenants without an explicit quota
    pub default_tenant_budget_bytes: u64,
    /// Interval for the background alias cleanup task
    pub alias_cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SloConfig {
    pub enabled: bool,
    /// Search is degraded when estimated P99 latency exceeds this threshold
    pub target_p99_ms: f64,
    /// Degradation is cleared when P99 <= target_p99_ms * recovery_factor
    pub recovery_factor: f64,
    /// Candidate scan budget used by the search path while degraded
    pub degraded_max_scans: usize,
    /// Monitoring interval for estimating P99 from drained samples
    pub monitor_interval_secs: u64,
    /// Minimum samples per interval for the P99 estimate to be acted on
    pub min_samples_per_interval: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Bounded queue size; enqueues beyond it are dropped
    pub queue_capacity: usize,
    /// Maximum prefetches executed concurrently
    pub max_parallelism: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_tenant_budget_bytes: 64 * 1024 * 1024,
            alias_cleanup_interval_secs: 60,
        }
    }
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_p99_ms: 50.0,
            recovery_factor: 0.8,
            degraded_max_scans: 5000,
            monitor_interval_secs: 5,
            min_samples_per_interval: 20,
        }
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_parallelism: 4,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
