//! Metrics and logging for operators
//!
//! Operators bump named counters (pages read, key comparisons, matches) on a
//! shared [`MetricsCollector`] and record timing samples for whole
//! executions. [`Logger`] forwards to `tracing`, tagging every event with the
//! operator that emitted it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known metric ids
pub mod names {
    pub const PAGES_READ: &str = "pages_read";
    pub const RECORDS_COMPARED: &str = "records_compared";
    pub const MATCHES: &str = "matches";
    pub const BLOCKS_LOADED: &str = "blocks_loaded";
    pub const PARTITIONS: &str = "partitions";
    pub const HASH_BUCKETS: &str = "hash_buckets";
    pub const RECORDS_SORTED: &str = "records_sorted";
    pub const RUN_REWINDS: &str = "run_rewinds";
    pub const RECORDS_EXAMINED: &str = "records_examined";
    pub const ROWS_MATERIALIZED: &str = "rows_materialized";
    pub const EXECUTION_MS: &str = "execution_ms";
}

/// Metric definition describing a metric that an operator can collect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Unique identifier for the metric
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Type of metric
    pub metric_type: MetricType,
    /// Unit of measurement (e.g., "pages", "ms")
    pub unit: String,
    /// Description of what this metric measures
    pub description: String,
}

impl MetricDefinition {
    pub fn counter(
        id: impl Into<String>,
        name: impl Into<String>,
        unit: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric_type: MetricType::Counter,
            unit: unit.into(),
            description: description.into(),
        }
    }
}

/// Type of metric being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    /// Monotonically increasing counter
    Counter,
    /// Duration measurements
    Timing,
}

/// Type of aggregation to apply to timing samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationType {
    Sum,
    Avg,
    Min,
    Max,
    P50,
    P95,
}

#[derive(Debug, Default)]
struct MetricStore {
    counters: HashMap<String, u64>,
    samples: HashMap<String, Vec<f64>>,
}

/// Thread-safe metrics collector
///
/// Clones share the same underlying store, so every iterator spawned from one
/// execution context reports into the same counters.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    store: Arc<Mutex<MetricStore>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by 1
    pub fn increment(&self, metric_id: &str) {
        self.add(metric_id, 1);
    }

    /// Increment a counter by `amount`
    pub fn add(&self, metric_id: &str, amount: u64) {
        let mut store = self.store.lock();
        *store.counters.entry(metric_id.to_string()).or_insert(0) += amount;
    }

    /// Current value of a counter, zero if never touched
    pub fn counter(&self, metric_id: &str) -> u64 {
        self.store.lock().counters.get(metric_id).copied().unwrap_or(0)
    }

    /// Record a timing sample
    pub fn record(&self, metric_id: &str, value: f64) {
        self.store
            .lock()
            .samples
            .entry(metric_id.to_string())
            .or_default()
            .push(value);
    }

    pub fn samples(&self, metric_id: &str) -> Vec<f64> {
        self.store.lock().samples.get(metric_id).cloned().unwrap_or_default()
    }

    /// Aggregate the timing samples of a metric
    pub fn aggregate(&self, metric_id: &str, agg_type: AggregationType) -> Option<f64> {
        let mut values = self.samples(metric_id);
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));

        match agg_type {
            AggregationType::Sum => Some(values.iter().sum()),
            AggregationType::Avg => Some(values.iter().sum::<f64>() / values.len() as f64),
            AggregationType::Min => values.first().copied(),
            AggregationType::Max => values.last().copied(),
            AggregationType::P50 => percentile(&values, 0.5),
            AggregationType::P95 => percentile(&values, 0.95),
        }
    }

    /// Snapshot of all counters
    pub fn counters(&self) -> HashMap<String, u64> {
        self.store.lock().counters.clone()
    }

    pub fn clear(&self) {
        let mut store = self.store.lock();
        store.counters.clear();
        store.samples.clear();
    }
}

/// Linear interpolation between the nearest ranks of sorted values
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (sorted.len() as f64 - 1.0) * p;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    if lower == upper {
        return sorted.get(lower).copied();
    }
    let fraction = idx - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Operator-scoped logger backed by `tracing`
#[derive(Debug, Clone)]
pub struct Logger {
    operator: Arc<str>,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            operator: Arc::from("engine"),
        }
    }

    /// Logger tagging its events with the given operator name
    pub fn scoped(&self, operator: &str) -> Self {
        Self {
            operator: Arc::from(operator),
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(operator = %self.operator, "{}", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(operator = %self.operator, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(operator = %self.operator, "{}", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(operator = %self.operator, "{}", message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}
