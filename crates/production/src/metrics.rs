//! Prometheus metrics.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

/// Node counters and gauges, registered in a private registry.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    webhook_requests: IntCounterVec,
    confirmations: IntCounterVec,
    sweep_unresolved: IntGaugeVec,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let webhook_requests = IntCounterVec::new(
            Opts::new("certchain_webhook_requests_total", "Ledger webhook deliveries by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(webhook_requests.clone()))?;

        let confirmations = IntCounterVec::new(
            Opts::new(
                "certchain_confirmations_total",
                "Certificates confirmed as minted, by confirmation path",
            ),
            &["path"],
        )?;
        registry.register(Box::new(confirmations.clone()))?;

        let sweep_unresolved = IntGaugeVec::new(
            Opts::new(
                "certchain_sweep_unresolved",
                "Pending certificates the latest reconciliation sweep could not confirm",
            ),
            &["tenant"],
        )?;
        registry.register(Box::new(sweep_unresolved.clone()))?;

        Ok(Self {
            registry,
            webhook_requests,
            confirmations,
            sweep_unresolved,
        })
    }

    pub fn webhook_request(&self, outcome: &str) {
        self.webhook_requests.with_label_values(&[outcome]).inc();
    }

    pub fn confirmed(&self, path: &str, count: u64) {
        self.confirmations.with_label_values(&[path]).inc_by(count);
    }

    /// Backlog left by the latest sweep of `tenant`.
    pub fn sweep_unresolved(&self, tenant: &str, count: usize) {
        self.sweep_unresolved
            .with_label_values(&[tenant])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Text exposition format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.webhook_request("confirmed");
        metrics.webhook_request("confirmed");
        metrics.confirmed("pull", 3);
        metrics.sweep_unresolved("mit", 2);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"certchain_webhook_requests_total{outcome="confirmed"} 2"#));
        assert!(text.contains(r#"certchain_confirmations_total{path="pull"} 3"#));
        assert!(text.contains(r#"certchain_sweep_unresolved{tenant="mit"} 2"#));
    }

    #[test]
    fn test_unresolved_backlog_is_replaced_not_accumulated() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.sweep_unresolved("mit", 3);
        metrics.sweep_unresolved("mit", 3);
        metrics.sweep_unresolved("mit", 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"certchain_sweep_unresolved{tenant="mit"} 1"#));
    }

    #[test]
    fn test_instances_do_not_share_registries() {
        let a = NodeMetrics::new().unwrap();
        let b = NodeMetrics::new().unwrap();
        a.webhook_request("ignored");
        assert!(!b.encode().unwrap().contains("outcome=\"ignored\""));
    }
}
