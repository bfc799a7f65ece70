//! Latency summary statistics over one monitoring interval

/// Summary of latency samples in milliseconds.
///
/// Percentiles use the nearest-rank definition: for sorted ascending samples
/// of size n, index = ceil(q * n) - 1, clamped to [0, n - 1].
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    /// Computes summary statistics; `None` for an empty sample set
    pub fn from_millis(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let min = sorted[0];
        let max = sorted[count - 1];
        let mean = sorted.iter().sum::<f64>() / count as f64;

        Some(Self {
            count,
            min_ms: min,
            mean_ms: mean,
            p50_ms: quantile_nearest_rank(&sorted, 0.50),
            p95_ms: quantile_nearest_rank(&sorted, 0.95),
            p99_ms: quantile_nearest_rank(&sorted, 0.99),
            max_ms: max,
        })
    }
}

fn quantile_nearest_rank(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if q <= 0.0 {
        return sorted[0];
    }
    if q >= 1.0 {
        return sorted[n - 1];
    }

    let index = (q * n as f64).ceil() as usize;
    sorted[index.saturating_sub(1).min(n - 1)]
}
