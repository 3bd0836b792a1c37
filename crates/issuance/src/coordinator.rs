//! Issuance saga.
//!
//! ```text
//! resolve tenant ─► validate student ─► duplicate check ─► allocate number
//!        │
//!        ▼
//!  submit mint (irreversible) ─► insert PENDING certificate ─► insert SUBMITTED entry
//! ```
//!
//! The ledger submission happens before any local write. Confirmation is
//! left to the webhook or the reconciliation sweep.

use crate::{CertificateMetadata, IssuanceConfig};
use certchain_core::{
    with_timeout, CoreError, CoreResult, DomainEvent, ExternalError, LedgerClient,
    NotificationSink, StoreError,
};
use certchain_tenancy::{TenantConnectionRegistry, TenantContext};
use certchain_types::{
    ActorId, Certificate, CertificateId, CertificateNumber, CertificateStatus, IssuanceRequest,
    MintActivityLogEntry, MintActivityStatus, MintRequest, SubmissionSignature, TenantId,
    WalletAddress,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Issues certificates and abandons dead submissions.
pub struct CertificateIssuanceCoordinator {
    registry: Arc<TenantConnectionRegistry>,
    ledger: Arc<dyn LedgerClient>,
    notifier: Arc<dyn NotificationSink>,
    config: IssuanceConfig,
}

impl CertificateIssuanceCoordinator {
    pub fn new(
        registry: Arc<TenantConnectionRegistry>,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn NotificationSink>,
        config: IssuanceConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            notifier,
            config,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Issue
    // ═══════════════════════════════════════════════════════════════════════

    /// Submit a credential mint and record it as PENDING.
    ///
    /// No inline retries: a failed issuance is retried by the caller.
    pub async fn issue(&self, request: IssuanceRequest) -> CoreResult<Certificate> {
        let TenantContext { profile, store } =
            self.registry.resolve_for_tenant(&request.tenant_id).await?;

        if request.badge_title.trim().is_empty() {
            return Err(CoreError::Validation("badge title is empty".into()));
        }
        let student = store
            .find_student(&request.student_id)
            .await?
            .ok_or_else(|| {
                CoreError::Validation(format!("{} does not exist", request.student_id))
            })?;
        if !student.active {
            return Err(CoreError::Validation(format!("{} is inactive", student.id)));
        }
        let recipient = student.wallet_address.clone().ok_or_else(|| {
            CoreError::Validation(format!("{} has no registered ledger address", student.id))
        })?;

        if let Some(existing) = store
            .find_active_certificate(&student.id, &request.badge_title)
            .await?
        {
            return Err(CoreError::Conflict(format!(
                "{} already holds '{}' as {} ({})",
                student.id, request.badge_title, existing.certificate_number, existing.status
            )));
        }

        let now = Utc::now();
        let existing_count = store.count_certificates().await?;
        let certificate_number = CertificateNumber::next_after(
            &profile.routing_code,
            now,
            student.department.as_deref(),
            existing_count,
        )
        .to_string();

        let metadata = CertificateMetadata::new(
            &request.badge_title,
            request.description.as_deref(),
            &certificate_number,
            &student.full_name,
            student.department.as_deref(),
            &profile.routing_code,
            now,
        );
        let metadata_uri = metadata
            .content_uri(&self.config.metadata_base_uri)
            .map_err(|e| CoreError::Validation(format!("metadata is not serializable: {e}")))?;

        let mint = MintRequest {
            metadata_uri: metadata_uri.clone(),
            recipient: recipient.clone(),
            tree: profile.tree_id.clone(),
            authority: profile.authority.clone(),
        };
        let receipt =
            match with_timeout(self.config.submit_timeout, self.ledger.submit_mint(&mint)).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    self.record_submission_failure(&request, &recipient, &e).await;
                    return Err(CoreError::LedgerSubmission(e.to_string()));
                }
            };
        let signature = receipt.signature;

        let certificate = Certificate {
            id: CertificateId::generate(),
            certificate_number: certificate_number.clone(),
            student_id: student.id.clone(),
            recipient: recipient.clone(),
            badge_title: request.badge_title.clone(),
            status: CertificateStatus::Pending,
            ledger_asset_id: None,
            ledger_tree_id: profile.tree_id.clone(),
            submission_signature: Some(signature.clone()),
            leaf_index: None,
            revoked: false,
            revoked_at: None,
            revocation_reason: None,
            metadata_uri,
            issued_by: request.issued_by.clone(),
            created_at: now,
        };

        if let Err(e) = store.insert_certificate(certificate.clone()).await {
            error!(
                tenant = %request.tenant_id,
                certificate_number = %certificate_number,
                signature = %signature,
                error = %e,
                "Ledger accepted mint but certificate row was not written"
            );
            let message = match &e {
                StoreError::UniqueViolation(_) => {
                    format!("certificate number {certificate_number} already allocated")
                }
                other => format!("certificate row not written: {other}"),
            };
            self.record_trail(MintActivityLogEntry::failed(
                request.tenant_id.clone(),
                recipient,
                Some(signature),
                message.clone(),
                now,
            ))
            .await;
            return Err(match e {
                StoreError::UniqueViolation(_) => CoreError::Conflict(message),
                other => CoreError::Store(other),
            });
        }

        let entry = MintActivityLogEntry::submitted(
            request.tenant_id.clone(),
            certificate.id,
            certificate_number.clone(),
            recipient,
            signature.clone(),
            now,
        );
        if let Err(e) = self.registry.audit().insert_mint_activity(entry).await {
            error!(
                tenant = %request.tenant_id,
                certificate_id = %certificate.id,
                signature = %signature,
                error = %e,
                "Certificate is PENDING without a mint activity entry"
            );
            return Err(CoreError::Store(e));
        }

        info!(
            tenant = %request.tenant_id,
            certificate_id = %certificate.id,
            certificate_number = %certificate_number,
            signature = %signature,
            "Submitted certificate mint"
        );
        Ok(certificate)
    }

    async fn record_submission_failure(
        &self,
        request: &IssuanceRequest,
        recipient: &WalletAddress,
        err: &ExternalError,
    ) {
        warn!(
            tenant = %request.tenant_id,
            student = %request.student_id,
            error = %err,
            "Ledger rejected mint submission"
        );
        self.record_trail(MintActivityLogEntry::failed(
            request.tenant_id.clone(),
            recipient.clone(),
            None,
            err.to_string(),
            Utc::now(),
        ))
        .await;
        self.notifier.emit(DomainEvent::IssuanceFailed {
            tenant_id: request.tenant_id.clone(),
            actor_id: request.issued_by.clone(),
            student_id: request.student_id.clone(),
            badge_title: request.badge_title.clone(),
            error: err.to_string(),
        });
    }

    /// Best-effort FAILED trail for operators.
    async fn record_trail(&self, entry: MintActivityLogEntry) {
        let id = entry.id;
        if let Err(e) = self.registry.audit().insert_mint_activity(entry).await {
            error!(entry = %id, error = %e, "Failed to record mint failure trail");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Abandon
    // ═══════════════════════════════════════════════════════════════════════

    /// Give up on a PENDING certificate whose submission is known to be dead.
    pub async fn abandon(
        &self,
        tenant_id: &TenantId,
        certificate_id: CertificateId,
        reason: &str,
        actor: &ActorId,
    ) -> CoreResult<Certificate> {
        let TenantContext { store, .. } = self.registry.resolve_for_tenant(tenant_id).await?;

        let mut certificate = store
            .get_certificate(certificate_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{certificate_id} in {tenant_id}")))?;
        if !certificate.status.can_transition_to(CertificateStatus::Failed) {
            return Err(CoreError::Conflict(format!(
                "{certificate_id} is {}, only PENDING can be abandoned",
                certificate.status
            )));
        }

        certificate.mark_failed();
        store
            .update_certificate(&certificate, CertificateStatus::Pending)
            .await
            .map_err(|e| {
                CoreError::lost_race(e, || format!("{certificate_id} changed while abandoning"))
            })?;

        if let Some(signature) = &certificate.submission_signature {
            self.fail_entry(signature, reason).await?;
        }

        info!(
            tenant = %tenant_id,
            certificate_id = %certificate_id,
            actor = %actor,
            reason,
            "Abandoned pending certificate"
        );
        self.notifier.emit(DomainEvent::CertificateFailed {
            tenant_id: tenant_id.clone(),
            actor_id: actor.clone(),
            certificate_id,
            reason: reason.to_string(),
        });
        Ok(certificate)
    }

    async fn fail_entry(&self, signature: &SubmissionSignature, reason: &str) -> CoreResult<()> {
        let audit = self.registry.audit();
        match audit.find_mint_activity_by_signature(signature).await? {
            Some(mut entry) if entry.status == MintActivityStatus::Submitted => {
                entry.fail(reason);
                audit.update_mint_activity(&entry).await?;
            }
            Some(_) => {}
            None => warn!(signature = %signature, "No mint activity entry to mark failed"),
        }
        Ok(())
    }
}
