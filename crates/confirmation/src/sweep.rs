//! Pull path: reconciliation sweep.

use crate::{ApplyOutcome, ConfirmationIngress};
use certchain_core::{ConfirmationEvent, CoreError, CoreResult, ReconciliationResult};
use certchain_resolver::{LedgerAssetResolver, Resolution};
use certchain_types::{Certificate, CertificateId, TenantId};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Configuration for the reconciliation sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Certificates resolved at the same time.
    pub max_concurrency: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

impl SweepConfig {
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self { max_concurrency }
    }
}

/// A certificate the sweep could not confirm. It stays PENDING.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCertificate {
    pub certificate_id: CertificateId,
    pub certificate_number: String,
    pub reason: String,
}

/// Summary of one sweep over a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub tenant_id: TenantId,
    pub examined: usize,
    pub confirmed: Vec<CertificateId>,
    pub already_confirmed: usize,
    /// Left PENDING for operator follow-up.
    pub unresolved: Vec<UnresolvedCertificate>,
    /// Confirmations that failed with an error.
    pub errors: Vec<UnresolvedCertificate>,
}

impl ReconciliationReport {
    fn new(tenant_id: TenantId, examined: usize) -> Self {
        Self {
            tenant_id,
            examined,
            confirmed: Vec::new(),
            already_confirmed: 0,
            unresolved: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Whether every examined certificate ended up confirmed.
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.errors.is_empty()
    }
}

enum SweepItem {
    Confirmed(CertificateId),
    AlreadyConfirmed,
    Unresolved(UnresolvedCertificate),
    Error(UnresolvedCertificate),
}

/// Confirms PENDING certificates by asking the indexer.
///
/// Never moves a certificate to FAILED.
pub struct ReconciliationSweep {
    ingress: Arc<ConfirmationIngress>,
    resolver: Arc<LedgerAssetResolver>,
    config: SweepConfig,
}

impl ReconciliationSweep {
    pub fn new(
        ingress: Arc<ConfirmationIngress>,
        resolver: Arc<LedgerAssetResolver>,
        config: SweepConfig,
    ) -> Self {
        Self {
            ingress,
            resolver,
            config,
        }
    }

    /// Sweep one tenant's PENDING certificates that carry a submission signature.
    pub async fn run(&self, tenant_id: &TenantId) -> CoreResult<ReconciliationReport> {
        let store = self
            .ingress
            .registry()
            .resolve_for_tenant(tenant_id)
            .await?
            .store;
        let pending = store.pending_with_submission().await?;
        info!(tenant = %tenant_id, pending = pending.len(), "Starting reconciliation sweep");

        let mut report = ReconciliationReport::new(tenant_id.clone(), pending.len());
        let items: Vec<SweepItem> = stream::iter(pending)
            .map(|certificate| self.reconcile_one(tenant_id, certificate))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for item in items {
            match item {
                SweepItem::Confirmed(id) => report.confirmed.push(id),
                SweepItem::AlreadyConfirmed => report.already_confirmed += 1,
                SweepItem::Unresolved(u) => report.unresolved.push(u),
                SweepItem::Error(u) => report.errors.push(u),
            }
        }

        info!(
            tenant = %tenant_id,
            examined = report.examined,
            confirmed = report.confirmed.len(),
            unresolved = report.unresolved.len(),
            errors = report.errors.len(),
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    async fn reconcile_one(&self, tenant_id: &TenantId, certificate: Certificate) -> SweepItem {
        let unresolved = |reason: String| UnresolvedCertificate {
            certificate_id: certificate.id,
            certificate_number: certificate.certificate_number.clone(),
            reason,
        };

        let resolved = match self
            .resolver
            .resolve(&certificate.recipient, &certificate.ledger_tree_id)
            .await
        {
            Resolution::Found(resolved) => resolved,
            Resolution::NotFound { attempts } => {
                let timeout = CoreError::ConfirmationTimeout(format!(
                    "{} not located after {attempts} attempts",
                    certificate.certificate_number
                ));
                warn!(tenant = %tenant_id, certificate_id = %certificate.id, "{timeout}");
                return SweepItem::Unresolved(unresolved(timeout.to_string()));
            }
        };

        let event = ConfirmationEvent::Pull(ReconciliationResult {
            tenant_id: tenant_id.clone(),
            certificate_id: certificate.id,
            submission_signature: certificate.submission_signature.clone(),
            resolved,
        });
        match self.ingress.ingest(event).await {
            Ok(ApplyOutcome::Confirmed { certificate_id, .. }) => SweepItem::Confirmed(certificate_id),
            Ok(ApplyOutcome::AlreadyConfirmed) => SweepItem::AlreadyConfirmed,
            Ok(ApplyOutcome::Unmatched) => {
                SweepItem::Unresolved(unresolved("no mint activity entry correlates".into()))
            }
            Ok(ApplyOutcome::BelongsToOther { certificate_id }) => {
                let owner = certificate_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "a failed submission".into());
                SweepItem::Unresolved(unresolved(format!("resolved asset belongs to {owner}")))
            }
            Ok(ApplyOutcome::Orphaned { reason }) => SweepItem::Unresolved(unresolved(reason)),
            Err(e) => {
                warn!(tenant = %tenant_id, certificate_id = %certificate.id, error = %e,
                    "Failed to apply pulled confirmation");
                SweepItem::Error(unresolved(e.to_string()))
            }
        }
    }
}
