//! The shared apply step behind both confirmation paths.

use certchain_core::{
    ConfirmationEvent, CoreError, CoreResult, DomainEvent, NotificationSink, StoreError,
};
use certchain_tenancy::TenantConnectionRegistry;
use certchain_types::{
    Certificate, CertificateId, CertificateStatus, LedgerAssetId, MintActivityLogEntry,
    MintActivityStatus, SubmissionSignature, TenantId, WebhookEventType,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the caller knows about a confirmation besides the asset id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub submission_signature: Option<SubmissionSignature>,
    pub leaf_index: Option<u64>,
    /// Certificate the caller expects the asset to belong to.
    pub certificate_id: Option<CertificateId>,
}

/// Result of applying a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The entry is now SUCCESS. `newly_minted` is set when this call moved
    /// the certificate PENDING → MINTED.
    Confirmed {
        certificate_id: CertificateId,
        newly_minted: bool,
    },
    /// The entry was already SUCCESS; nothing was written.
    AlreadyConfirmed,
    /// No mint activity entry correlates; nothing was written.
    Unmatched,
    /// The asset correlates to a different certificate than expected.
    BelongsToOther { certificate_id: Option<CertificateId> },
    /// The entry cannot be confirmed (failed submission or missing row).
    Orphaned { reason: String },
}

/// Applies ledger confirmations to the tenant and audit stores.
///
/// Safe under at-least-once delivery: every write is preceded by a status
/// check and the certificate write is a conditional update.
pub struct ConfirmationIngress {
    registry: Arc<TenantConnectionRegistry>,
    notifier: Arc<dyn NotificationSink>,
}

impl ConfirmationIngress {
    pub fn new(registry: Arc<TenantConnectionRegistry>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { registry, notifier }
    }

    pub fn registry(&self) -> &Arc<TenantConnectionRegistry> {
        &self.registry
    }

    /// Funnel a pushed or pulled confirmation into [`Self::apply_confirmation`].
    pub async fn ingest(&self, event: ConfirmationEvent) -> CoreResult<ApplyOutcome> {
        let path = event.path();
        match event {
            ConfirmationEvent::Push(payload) => {
                if payload.event_type != WebhookEventType::Mint {
                    return Ok(ApplyOutcome::Unmatched);
                }
                let Some(nft) = payload.nft_data else {
                    return Ok(ApplyOutcome::Unmatched);
                };
                let outcome = ConfirmationOutcome {
                    submission_signature: payload.signature,
                    leaf_index: nft.leaf_index,
                    certificate_id: None,
                };
                let Some(entry) = self.correlate(&nft.mint, &outcome).await? else {
                    warn!(path, asset_id = %nft.mint, "Confirmation for unknown mint");
                    return Ok(ApplyOutcome::Unmatched);
                };
                self.apply_confirmation(&entry.tenant_id, &nft.mint, outcome)
                    .await
            }
            ConfirmationEvent::Pull(result) => {
                let outcome = ConfirmationOutcome {
                    submission_signature: result.submission_signature,
                    leaf_index: Some(result.resolved.leaf_index),
                    certificate_id: Some(result.certificate_id),
                };
                self.apply_confirmation(&result.tenant_id, &result.resolved.asset_id, outcome)
                    .await
            }
        }
    }

    /// Record that `asset_id` is confirmed on the ledger.
    ///
    /// Idempotent. The certificate is written before the audit entry, so a
    /// crash in between is healed by the next delivery or sweep.
    pub async fn apply_confirmation(
        &self,
        tenant_id: &TenantId,
        asset_id: &LedgerAssetId,
        outcome: ConfirmationOutcome,
    ) -> CoreResult<ApplyOutcome> {
        let mut entry = match self.correlate(asset_id, &outcome).await? {
            Some(entry) => entry,
            None => match self.restore_entry(tenant_id, &outcome).await? {
                Some(entry) => entry,
                None => {
                    debug!(tenant = %tenant_id, asset_id = %asset_id, "No mint activity entry correlates");
                    return Ok(ApplyOutcome::Unmatched);
                }
            },
        };

        if &entry.tenant_id != tenant_id {
            return Err(CoreError::Validation(format!(
                "{asset_id} belongs to {}, not {tenant_id}",
                entry.tenant_id
            )));
        }
        if let Some(expected) = outcome.certificate_id {
            if entry.certificate_id != Some(expected) {
                return Ok(ApplyOutcome::BelongsToOther {
                    certificate_id: entry.certificate_id,
                });
            }
        }
        match entry.status {
            MintActivityStatus::Success => return Ok(ApplyOutcome::AlreadyConfirmed),
            MintActivityStatus::Failed => {
                warn!(tenant = %tenant_id, asset_id = %asset_id, entry = %entry.id,
                    "Ledger confirmed a mint recorded as failed");
                return Ok(ApplyOutcome::Orphaned {
                    reason: "mint activity entry is FAILED".into(),
                });
            }
            MintActivityStatus::Submitted => {}
        }
        let Some(certificate_id) = entry.certificate_id else {
            return Ok(ApplyOutcome::Orphaned {
                reason: "mint activity entry has no certificate".into(),
            });
        };

        let minted = self
            .mint_certificate(tenant_id, certificate_id, asset_id, outcome.leaf_index)
            .await?;
        let Some((certificate, newly_minted)) = minted else {
            return Ok(ApplyOutcome::Orphaned {
                reason: format!("{certificate_id} does not exist"),
            });
        };

        entry.confirm(asset_id.clone(), Utc::now());
        self.registry
            .audit()
            .update_mint_activity(&entry)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => {
                    CoreError::Conflict(format!("{asset_id} already confirmed for another mint"))
                }
                other => CoreError::Store(other),
            })?;

        if newly_minted {
            info!(
                tenant = %tenant_id,
                certificate_id = %certificate_id,
                asset_id = %asset_id,
                "Certificate minted"
            );
            self.notifier.emit(DomainEvent::CertificateMinted {
                tenant_id: tenant_id.clone(),
                actor_id: certificate.issued_by,
                certificate_id,
                certificate_number: certificate.certificate_number,
                asset_id: asset_id.clone(),
            });
        }
        Ok(ApplyOutcome::Confirmed {
            certificate_id,
            newly_minted,
        })
    }

    /// Entry keyed by the asset id, else the one carrying the signature.
    async fn correlate(
        &self,
        asset_id: &LedgerAssetId,
        outcome: &ConfirmationOutcome,
    ) -> CoreResult<Option<MintActivityLogEntry>> {
        let audit = self.registry.audit();
        if let Some(entry) = audit.find_mint_activity(asset_id).await? {
            return Ok(Some(entry));
        }
        match &outcome.submission_signature {
            Some(signature) => Ok(audit.find_mint_activity_by_signature(signature).await?),
            None => Ok(None),
        }
    }

    /// Rebuild the SUBMITTED entry of a PENDING certificate whose audit write
    /// was lost after its row was inserted. Only the pull path names the
    /// certificate, so pushes never get here.
    async fn restore_entry(
        &self,
        tenant_id: &TenantId,
        outcome: &ConfirmationOutcome,
    ) -> CoreResult<Option<MintActivityLogEntry>> {
        let (Some(certificate_id), Some(signature)) =
            (outcome.certificate_id, outcome.submission_signature.as_ref())
        else {
            return Ok(None);
        };
        let store = self.registry.resolve_for_tenant(tenant_id).await?.store;
        let Some(certificate) = store.get_certificate(certificate_id).await? else {
            return Ok(None);
        };
        if certificate.status != CertificateStatus::Pending
            || certificate.submission_signature.as_ref() != Some(signature)
        {
            return Ok(None);
        }

        let entry = MintActivityLogEntry::submitted(
            tenant_id.clone(),
            certificate.id,
            certificate.certificate_number,
            certificate.recipient,
            signature.clone(),
            certificate.created_at,
        );
        self.registry
            .audit()
            .insert_mint_activity(entry.clone())
            .await?;
        warn!(
            tenant = %tenant_id,
            certificate_id = %certificate_id,
            signature = %signature,
            "Restored missing mint activity entry"
        );
        Ok(Some(entry))
    }

    /// Move the certificate to MINTED. The flag is set if this call did it
    /// and clear if it was already done; `None` if the row is missing.
    async fn mint_certificate(
        &self,
        tenant_id: &TenantId,
        certificate_id: CertificateId,
        asset_id: &LedgerAssetId,
        leaf_index: Option<u64>,
    ) -> CoreResult<Option<(Certificate, bool)>> {
        let store = self.registry.resolve_for_tenant(tenant_id).await?.store;

        // One retry: a concurrent writer may have confirmed it between read and update.
        for _ in 0..2 {
            let Some(mut certificate) = store.get_certificate(certificate_id).await? else {
                return Ok(None);
            };
            match certificate.status {
                CertificateStatus::Pending => {}
                CertificateStatus::Minted | CertificateStatus::Revoked
                    if certificate.ledger_asset_id.as_ref() == Some(asset_id) =>
                {
                    return Ok(Some((certificate, false)));
                }
                status => {
                    return Err(CoreError::Conflict(format!(
                        "{certificate_id} is {status} and cannot be confirmed as {asset_id}"
                    )));
                }
            }

            certificate.confirm_minted(asset_id.clone(), leaf_index);
            match store
                .update_certificate(&certificate, CertificateStatus::Pending)
                .await
            {
                Ok(()) => return Ok(Some((certificate, true))),
                Err(StoreError::StaleState(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(CoreError::Conflict(format!(
            "{certificate_id} changed while confirming"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixture::{fixture, mint_body, signature};
    use certchain_core::{AuditStore, ReconciliationResult, TenantStore};
    use certchain_notify::SubscriptionScope;
    use certchain_types::{AssetRef, ResolvedAsset, WebhookPayload};
    use proptest::prelude::*;
    use tracing_test::traced_test;

    fn push(sig: &str, asset: &str, leaf: u64) -> ConfirmationEvent {
        ConfirmationEvent::Push(WebhookPayload::from_slice(&mint_body(sig, asset, leaf)).unwrap())
    }

    fn pull(certificate: &Certificate, asset: &str, leaf: u64) -> ConfirmationEvent {
        ConfirmationEvent::Pull(ReconciliationResult {
            tenant_id: TenantId::new("mit"),
            certificate_id: certificate.id,
            submission_signature: certificate.submission_signature.clone(),
            resolved: ResolvedAsset {
                asset_id: LedgerAssetId::new(asset),
                leaf_index: leaf,
            },
        })
    }

    #[tokio::test]
    async fn test_push_confirms_once() {
        let f = fixture();
        let mut events = f.notifier.subscribe(SubscriptionScope::All);
        let cert = f.seed_pending(1).await;

        let first = f.ingress.ingest(push("sig-1", "A1", 7)).await.unwrap();
        assert_eq!(
            first,
            ApplyOutcome::Confirmed {
                certificate_id: cert.id,
                newly_minted: true
            }
        );

        let minted = f.certificate(cert.id).await;
        assert_eq!(minted.status, CertificateStatus::Minted);
        assert_eq!(minted.ledger_asset_id, Some(LedgerAssetId::new("A1")));
        assert_eq!(minted.leaf_index, Some(7));

        let entry = &f.audit.mint_activity()[0];
        assert_eq!(entry.status, MintActivityStatus::Success);
        assert_eq!(entry.asset_ref, AssetRef::Assigned(LedgerAssetId::new("A1")));
        assert!(entry.confirmed_at.is_some());

        match events.try_recv() {
            Some(DomainEvent::CertificateMinted { actor_id, asset_id, .. }) => {
                assert_eq!(actor_id.as_str(), "registrar");
                assert_eq!(asset_id.as_str(), "A1");
            }
            other => panic!("expected CertificateMinted, got {other:?}"),
        }

        let again = f.ingress.ingest(push("sig-1", "A1", 7)).await.unwrap();
        assert_eq!(again, ApplyOutcome::AlreadyConfirmed);
        assert!(events.try_recv().is_none());
        assert_eq!(f.certificate(cert.id).await, minted);
    }

    #[tokio::test]
    async fn test_unknown_mint_is_unmatched() {
        let f = fixture();
        let cert = f.seed_pending(1).await;

        let outcome = f.ingress.ingest(push("sig-unknown", "A9", 0)).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Unmatched);
        assert_eq!(f.certificate(cert.id).await.status, CertificateStatus::Pending);
        assert_eq!(f.audit.mint_activity()[0].status, MintActivityStatus::Submitted);
    }

    #[tokio::test]
    async fn test_tenant_mismatch_is_rejected() {
        let f = fixture();
        let cert = f.seed_pending(1).await;

        let err = f
            .ingress
            .apply_confirmation(
                &TenantId::new("eth"),
                &LedgerAssetId::new("A1"),
                ConfirmationOutcome {
                    submission_signature: Some(signature(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(f.certificate(cert.id).await.status, CertificateStatus::Pending);
        assert!(f.eth.certificates().is_empty());
    }

    #[tokio::test]
    async fn test_pull_for_other_certificate_is_not_applied() {
        let f = fixture();
        let first = f.seed_pending(1).await;
        let second = f.seed_pending(2).await;
        f.ingress.ingest(push("sig-1", "A1", 0)).await.unwrap();

        let outcome = f.ingress.ingest(pull(&second, "A1", 0)).await.unwrap();

        assert_eq!(
            outcome,
            ApplyOutcome::BelongsToOther {
                certificate_id: Some(first.id)
            }
        );
        assert_eq!(f.certificate(second.id).await.status, CertificateStatus::Pending);
    }

    #[tokio::test]
    async fn test_crash_between_writes_is_healed_without_second_event() {
        let f = fixture();
        let mut events = f.notifier.subscribe(SubscriptionScope::All);
        let cert = f.seed_pending(1).await;

        // Certificate written, audit entry not.
        let mut minted = cert.clone();
        minted.confirm_minted(LedgerAssetId::new("A1"), Some(3));
        f.mit
            .update_certificate(&minted, CertificateStatus::Pending)
            .await
            .unwrap();

        let outcome = f.ingress.ingest(pull(&cert, "A1", 3)).await.unwrap();

        assert_eq!(
            outcome,
            ApplyOutcome::Confirmed {
                certificate_id: cert.id,
                newly_minted: false
            }
        );
        assert_eq!(f.audit.mint_activity()[0].status, MintActivityStatus::Success);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_pull_restores_entry_lost_after_certificate_insert() {
        let f = fixture();
        let mut events = f.notifier.subscribe(SubscriptionScope::All);
        let cert = f.seed_certificate(2).await;
        assert!(f.audit.mint_activity().is_empty());

        let outcome = f.ingress.ingest(pull(&cert, "A2", 5)).await.unwrap();

        assert_eq!(
            outcome,
            ApplyOutcome::Confirmed {
                certificate_id: cert.id,
                newly_minted: true
            }
        );
        assert_eq!(f.certificate(cert.id).await.status, CertificateStatus::Minted);
        let entries = f.audit.mint_activity();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, MintActivityStatus::Success);
        assert_eq!(entries[0].certificate_id, Some(cert.id));
        assert_eq!(entries[0].submission_signature, Some(signature(2)));
        assert!(matches!(events.try_recv(), Some(DomainEvent::CertificateMinted { .. })));
        assert!(logs_contain("Restored missing mint activity entry"));

        // The late push now correlates through the restored entry.
        let late = f.ingress.ingest(push("sig-2", "A2", 5)).await.unwrap();
        assert_eq!(late, ApplyOutcome::AlreadyConfirmed);
        assert_eq!(f.audit.mint_activity().len(), 1);
    }

    #[tokio::test]
    async fn test_push_without_entry_does_not_restore() {
        let f = fixture();
        let cert = f.seed_certificate(2).await;

        let outcome = f.ingress.ingest(push("sig-2", "A2", 5)).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Unmatched);
        assert!(f.audit.mint_activity().is_empty());
        assert_eq!(f.certificate(cert.id).await.status, CertificateStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_entry_is_orphaned() {
        let f = fixture();
        let cert = f.seed_pending(1).await;
        let mut entry = f
            .audit
            .find_mint_activity_by_signature(&signature(1))
            .await
            .unwrap()
            .unwrap();
        entry.fail("abandoned");
        f.audit.update_mint_activity(&entry).await.unwrap();

        let outcome = f.ingress.ingest(push("sig-1", "A1", 0)).await.unwrap();

        assert!(matches!(outcome, ApplyOutcome::Orphaned { .. }));
        assert_eq!(f.certificate(cert.id).await.status, CertificateStatus::Pending);
    }

    #[tokio::test]
    async fn test_confirming_a_different_asset_for_minted_certificate_conflicts() {
        let f = fixture();
        let cert = f.seed_pending(1).await;
        let mut minted = cert.clone();
        minted.confirm_minted(LedgerAssetId::new("A1"), None);
        f.mit
            .update_certificate(&minted, CertificateStatus::Pending)
            .await
            .unwrap();

        let err = f.ingress.ingest(pull(&cert, "B2", 0)).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[derive(Debug, Clone)]
    enum Delivery {
        Push,
        Pull,
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_any_delivery_sequence_converges(
            deliveries in prop::collection::vec(
                prop_oneof![Just(Delivery::Push), Just(Delivery::Pull)],
                1..8,
            )
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let f = fixture();
                let mut events = f.notifier.subscribe(SubscriptionScope::All);
                let cert = f.seed_pending(1).await;

                for delivery in &deliveries {
                    let event = match delivery {
                        Delivery::Push => push("sig-1", "A1", 4),
                        Delivery::Pull => pull(&cert, "A1", 4),
                    };
                    f.ingress.ingest(event).await.unwrap();
                }

                let minted = f.certificate(cert.id).await;
                assert_eq!(minted.status, CertificateStatus::Minted);
                assert_eq!(minted.ledger_asset_id, Some(LedgerAssetId::new("A1")));
                assert_eq!(minted.leaf_index, Some(4));
                assert_eq!(f.audit.mint_activity().len(), 1);
                assert!(matches!(events.try_recv(), Some(DomainEvent::CertificateMinted { .. })));
                assert!(events.try_recv().is_none());
            });
        }
    }
}
