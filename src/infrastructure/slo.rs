//! SLO guardrail
//!
//! Samples per-request latencies, computes rolling nearest-rank P99 on an
//! interval, and toggles a degraded admission mode that shrinks the search
//! scan budget until latency recovers. The guardrail only exposes the
//! current mode and the degraded budget; honoring them is the search path's
//! job.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::SloConfig;
use crate::domain::LatencySummary;

const FALLBACK_RECOVERY_FACTOR: f64 = 0.8;

/// Admission mode reported to the search path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    Normal,
    Degraded,
}

/// Interval buffer of latency samples in milliseconds.
///
/// `record` is a short mutex push, safe from any number of concurrent
/// request paths; the monitor swaps the buffer out wholesale each tick.
#[derive(Debug, Default)]
struct LatencyRecorder {
    samples: Mutex<Vec<f64>>,
}

impl LatencyRecorder {
    fn record(&self, latency_ms: f64) {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        samples.push(latency_ms);
    }

    fn drain(&self) -> Vec<f64> {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *samples)
    }
}

/// Two-state admission controller with hysteresis.
///
/// normal -> degraded when P99 exceeds the target; degraded -> normal when
/// P99 falls to target * recovery_factor or below. The gap between the two
/// thresholds prevents flapping.
#[derive(Debug)]
pub struct SloGuardrail {
    config: SloConfig,
    recorder: LatencyRecorder,
    degraded: AtomicBool,
    last_p99_bits: AtomicU64,
}

impl SloGuardrail {
    pub fn new(config: SloConfig) -> Self {
        Self {
            config,
            recorder: LatencyRecorder::default(),
            degraded: AtomicBool::new(false),
            last_p99_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn current_mode(&self) -> AdmissionMode {
        if self.is_degraded() {
            AdmissionMode::Degraded
        } else {
            AdmissionMode::Normal
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Last P99 computed by the monitor, for visibility
    pub fn last_p99_ms(&self) -> f64 {
        f64::from_bits(self.last_p99_bits.load(Ordering::Acquire))
    }

    /// Scan budget the search path should use while degraded
    pub fn degraded_scan_budget(&self) -> usize {
        self.config.degraded_max_scans
    }

    /// `None` while normal: the search path keeps its default budget
    pub fn scan_budget(&self) -> Option<usize> {
        if self.is_degraded() {
            Some(self.config.degraded_max_scans)
        } else {
            None
        }
    }

    /// Records one request latency into the current interval. No-op when the
    /// guardrail is disabled.
    pub fn record_latency(&self, latency: Duration) {
        if self.config.enabled {
            self.recorder.record(latency.as_secs_f64() * 1000.0);
        }
    }

    /// Applies the hysteresis state machine to a fresh P99 estimate
    pub fn update_p99(&self, p99_ms: f64) {
        self.last_p99_bits.store(p99_ms.to_bits(), Ordering::Release);

        if !self.config.enabled || self.config.target_p99_ms <= 0.0 {
            self.degraded.store(false, Ordering::Release);
            return;
        }

        let mut recovery_factor = self.config.recovery_factor;
        if recovery_factor.is_nan() || recovery_factor <= 0.0 || recovery_factor > 1.0 {
            recovery_factor = FALLBACK_RECOVERY_FACTOR;
        }

        let target = self.config.target_p99_ms;
        let recovery_threshold = target * recovery_factor;

        let degraded = self.is_degraded();
        if !degraded && p99_ms > target {
            self.degraded.store(true, Ordering::Release);
        } else if degraded && p99_ms > 0.0 && p99_ms <= recovery_threshold {
            self.degraded.store(false, Ordering::Release);
        }
    }

    fn drain_samples(&self) -> Vec<f64> {
        self.recorder.drain()
    }
}

/// Periodic monitor driving the guardrail from the interval's drained
/// samples. Holds state when an interval has too few samples.
#[derive(Debug)]
pub struct SloMonitor {
    guardrail: Arc<SloGuardrail>,
    config: SloConfig,
}

impl SloMonitor {
    pub fn new(guardrail: Arc<SloGuardrail>, config: SloConfig) -> Self {
        Self { guardrail, config }
    }

    /// Spawns the monitor loop; it stops when the shutdown signal fires
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled {
                debug!("SLO guardrail disabled, monitor not running");
                return;
            }

            let interval = Duration::from_secs(self.config.monitor_interval_secs.max(1));
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the first real
            // interval has a full window of samples
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("SLO monitor stopped");
        })
    }

    /// One monitoring interval: drain, estimate, transition
    fn tick(&self) {
        let samples = self.guardrail.drain_samples();

        let min_samples = self.config.min_samples_per_interval.max(1);
        if samples.len() < min_samples {
            debug!(
                samples = samples.len(),
                min_samples, "insufficient latency samples, holding guardrail state"
            );
            return;
        }

        let Some(summary) = LatencySummary::from_millis(&samples) else {
            return;
        };

        let was_degraded = self.guardrail.is_degraded();
        self.guardrail.update_p99(summary.p99_ms);
        let is_degraded = self.guardrail.is_degraded();

        if was_degraded != is_degraded {
            warn!(
                degraded = is_degraded,
                p99_ms = summary.p99_ms,
                samples = summary.count,
                "SLO guardrail state changed"
            );
        }
    }
}
