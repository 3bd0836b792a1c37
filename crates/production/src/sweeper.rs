//! Periodic reconciliation driver.

use crate::NodeMetrics;
use certchain_confirmation::{ReconciliationReport, ReconciliationSweep};
use certchain_core::CoreResult;
use certchain_types::TenantId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Runs the reconciliation sweep over every configured tenant on a fixed
/// interval. Tenants are swept one after another.
pub struct SweepDriver {
    sweep: Arc<ReconciliationSweep>,
    tenants: Vec<TenantId>,
    interval: Duration,
    metrics: NodeMetrics,
}

impl SweepDriver {
    pub fn new(
        sweep: Arc<ReconciliationSweep>,
        tenants: Vec<TenantId>,
        interval: Duration,
        metrics: NodeMetrics,
    ) -> Self {
        Self {
            sweep,
            tenants,
            interval,
            metrics,
        }
    }

    /// Sweep one tenant and record the outcome.
    pub async fn reconcile_tenant(&self, tenant_id: &TenantId) -> CoreResult<ReconciliationReport> {
        let report = self.sweep.run(tenant_id).await?;
        self.metrics.confirmed("pull", report.confirmed.len() as u64);
        self.metrics.sweep_unresolved(
            tenant_id.as_str(),
            report.unresolved.len() + report.errors.len(),
        );
        Ok(report)
    }

    /// One pass over all tenants. A failing tenant does not stop the pass.
    pub async fn run_once(&self) -> Vec<ReconciliationReport> {
        let mut reports = Vec::with_capacity(self.tenants.len());
        for tenant_id in &self.tenants {
            match self.reconcile_tenant(tenant_id).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(tenant = %tenant_id, error = %e, "Reconciliation sweep failed"),
            }
        }
        reports
    }

    /// Sweep every `interval` until `shutdown` resolves. The first pass
    /// starts immediately. A pass in flight at shutdown is dropped; whatever
    /// it left PENDING is picked up by the next start.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            tenants = self.tenants.len(),
            interval = ?self.interval,
            "Sweep driver started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Sweep pass interrupted by shutdown");
                    break;
                }
                _ = self.run_once() => {}
            }
        }
        info!("Sweep driver stopped");
    }
}
