//! Request metrics for the prediction endpoints
//!
//! Counters live outside the dispatcher so the prediction pipeline itself
//! stays stateless. They are only read by the `/metrics` endpoint.

use crate::deployment::DeploymentId;
use actix_web::http::StatusCode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

/// Counters for one deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCounters {
    pub requests: u64,
    pub successes: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    /// Sum of handling time in milliseconds
    pub total_latency_ms: f64,
}

impl DeploymentCounters {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_latency_ms / self.requests as f64
        }
    }
}

/// Metrics snapshot at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: i64,
    pub uptime_seconds: f64,
    pub deployments: BTreeMap<DeploymentId, DeploymentCounters>,
}

/// Metrics collector shared by all workers
#[derive(Debug)]
pub struct MetricsCollector {
    deployments: RwLock<BTreeMap<DeploymentId, DeploymentCounters>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            deployments: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one finished request
    pub fn record(&self, deployment: DeploymentId, status: StatusCode, elapsed: Duration) {
        let mut deployments = self.deployments.write();
        let counters = deployments.entry(deployment).or_default();
        counters.requests += 1;
        if status.is_success() {
            counters.successes += 1;
        } else if status.is_client_error() {
            counters.client_errors += 1;
        } else {
            counters.server_errors += 1;
        }
        counters.total_latency_ms += elapsed.as_secs_f64() * 1000.0;
    }

    pub fn counters(&self, deployment: DeploymentId) -> DeploymentCounters {
        self.deployments
            .read()
            .get(&deployment)
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            uptime_seconds: self.start_time.elapsed().as_secs_f64(),
            deployments: self.deployments.read().clone(),
        }
    }

    /// Render the current counters in Prometheus text format
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "# HELP fleet_predict_uptime_seconds Process uptime in seconds");
        let _ = writeln!(out, "# TYPE fleet_predict_uptime_seconds gauge");
        let _ = writeln!(out, "fleet_predict_uptime_seconds {:.3}", snapshot.uptime_seconds);

        let series: [(&str, &str, &str, fn(&DeploymentCounters) -> f64); 5] = [
            ("requests_total", "counter", "Prediction requests received", |c| c.requests as f64),
            ("success_total", "counter", "Predictions served", |c| c.successes as f64),
            ("client_errors_total", "counter", "Requests rejected as invalid", |c| {
                c.client_errors as f64
            }),
            ("server_errors_total", "counter", "Requests failed by the service", |c| {
                c.server_errors as f64
            }),
            ("avg_latency_ms", "gauge", "Average handling time in milliseconds", |c| {
                c.avg_latency_ms()
            }),
        ];

        for (name, kind, help, value) in series {
            let _ = writeln!(out, "\n# HELP fleet_predict_{name} {help}");
            let _ = writeln!(out, "# TYPE fleet_predict_{name} {kind}");
            for (deployment, counters) in &snapshot.deployments {
                let _ = writeln!(
                    out,
                    "fleet_predict_{name}{{deployment=\"{deployment}\"}} {}",
                    value(counters)
                );
            }
        }
        out
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_classifies_status() {
        let collector = MetricsCollector::new();
        let ms = Duration::from_millis(4);
        collector.record(DeploymentId::Battery, StatusCode::OK, ms);
        collector.record(DeploymentId::Battery, StatusCode::BAD_REQUEST, ms);
        collector.record(DeploymentId::Battery, StatusCode::INTERNAL_SERVER_ERROR, ms);
        collector.record(DeploymentId::Collision, StatusCode::OK, ms);

        let battery = collector.counters(DeploymentId::Battery);
        assert_eq!(battery.requests, 3);
        assert_eq!(battery.successes, 1);
        assert_eq!(battery.client_errors, 1);
        assert_eq!(battery.server_errors, 1);
        assert!((battery.avg_latency_ms() - 4.0).abs() < 1e-9);

        assert_eq!(collector.counters(DeploymentId::Collision).requests, 1);
        assert_eq!(collector.counters(DeploymentId::Maintenance).requests, 0);
    }

    #[test]
    fn test_prometheus_output() {
        let collector = MetricsCollector::new();
        collector.record(DeploymentId::Maintenance, StatusCode::OK, Duration::ZERO);

        let text = collector.render_prometheus();
        assert!(text.contains("# TYPE fleet_predict_requests_total counter"));
        assert!(text.contains("fleet_predict_requests_total{deployment=\"maintenance\"} 1"));
        assert!(!text.contains("deployment=\"battery\""));
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = MetricsCollector::new();
        collector.record(DeploymentId::Battery, StatusCode::OK, Duration::ZERO);
        let json = serde_json::to_value(collector.snapshot()).unwrap();
        assert_eq!(json["deployments"]["battery"]["successes"], 1);
    }
}
