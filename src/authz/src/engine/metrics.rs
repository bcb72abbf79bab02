//! Prometheus-style counters for permission checks

use super::decision::Decision;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Snapshot of engine counters
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    pub total_checks: u64,
    pub allowed_decisions: u64,
    pub denied_decisions: u64,
    pub indeterminate_decisions: u64,

    /// Checks allowed only through the root account
    pub superuser_overrides: u64,

    pub provisioned_users: u64,
    pub provisioned_action_resources: u64,

    /// Latency percentiles (p50, p90, p99) over the sample window,
    /// computed when the snapshot is taken
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    pub avg_latency_ms: f64,

    pub error_count: u64,
}

impl EngineMetrics {
    /// Share of determinate checks that were allowed
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Collects counters and a bounded window of latency samples
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,
    latency_samples: Arc<RwLock<VecDeque<f64>>>,
    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(VecDeque::with_capacity(max_samples.max(1)))),
            max_samples: max_samples.max(1),
        }
    }

    pub async fn record_decision(&self, decision: Decision) {
        let mut metrics = self.metrics.write().await;
        metrics.total_checks += 1;
        match decision {
            Decision::Allowed => metrics.allowed_decisions += 1,
            Decision::Denied => metrics.denied_decisions += 1,
            Decision::Indeterminate => metrics.indeterminate_decisions += 1,
        }
    }

    pub async fn record_superuser_override(&self) {
        self.metrics.write().await.superuser_overrides += 1;
    }

    pub async fn record_provisioned(&self, users: usize, action_resources: usize) {
        if users == 0 && action_resources == 0 {
            return;
        }
        let mut metrics = self.metrics.write().await;
        metrics.provisioned_users += users as u64;
        metrics.provisioned_action_resources += action_resources as u64;
    }

    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        if samples.len() == self.max_samples {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    pub async fn record_error(&self) {
        self.metrics.write().await.error_count += 1;
    }

    pub async fn get_metrics(&self) -> EngineMetrics {
        let mut metrics = self.metrics.read().await.clone();

        let mut sorted: Vec<f64> = self.latency_samples.read().await.iter().copied().collect();
        if sorted.is_empty() {
            return metrics;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
        metrics
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics().await;

        format!(
            r#"# HELP live_permissions_checks_total Permission checks by decision
# TYPE live_permissions_checks_total counter
live_permissions_checks_total{{decision="allowed"}} {}
live_permissions_checks_total{{decision="denied"}} {}
live_permissions_checks_total{{decision="indeterminate"}} {}

# HELP live_permissions_superuser_overrides_total Checks allowed through the root account
# TYPE live_permissions_superuser_overrides_total counter
live_permissions_superuser_overrides_total {}

# HELP live_permissions_provisioned_total Rows created while checking
# TYPE live_permissions_provisioned_total counter
live_permissions_provisioned_total{{kind="user"}} {}
live_permissions_provisioned_total{{kind="action_resource"}} {}

# HELP live_permissions_check_latency_seconds Check latency percentiles
# TYPE live_permissions_check_latency_seconds summary
live_permissions_check_latency_seconds{{quantile="0.5"}} {}
live_permissions_check_latency_seconds{{quantile="0.9"}} {}
live_permissions_check_latency_seconds{{quantile="0.99"}} {}

# HELP live_permissions_errors_total Failed checks
# TYPE live_permissions_errors_total counter
live_permissions_errors_total {}
"#,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.indeterminate_decisions,
            metrics.superuser_overrides,
            metrics.provisioned_users,
            metrics.provisioned_action_resources,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
            metrics.error_count,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
