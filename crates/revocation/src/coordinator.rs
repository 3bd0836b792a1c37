//! Revocation flow.

use crate::RevocationConfig;
use certchain_core::{
    with_timeout, CoreError, CoreResult, DomainEvent, LedgerClient, NotificationSink, StoreError,
};
use certchain_tenancy::{TenantConnectionRegistry, TenantContext};
use certchain_types::{
    ActorId, BurnRequest, Certificate, CertificateId, CertificateStatus, LedgerAssetId,
    RevocationIndexEntry, TenantId,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Burns minted credentials and records them in the shared revocation index.
pub struct RevocationCoordinator {
    registry: Arc<TenantConnectionRegistry>,
    ledger: Arc<dyn LedgerClient>,
    notifier: Arc<dyn NotificationSink>,
    config: RevocationConfig,
}

impl RevocationCoordinator {
    pub fn new(
        registry: Arc<TenantConnectionRegistry>,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn NotificationSink>,
        config: RevocationConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            notifier,
            config,
        }
    }

    /// Revoke a MINTED certificate.
    pub async fn revoke(
        &self,
        tenant_id: &TenantId,
        certificate_id: CertificateId,
        reason: &str,
        actor: &ActorId,
    ) -> CoreResult<Certificate> {
        let TenantContext { profile, store } = self.registry.resolve_for_tenant(tenant_id).await?;

        let mut certificate = store
            .get_certificate(certificate_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{certificate_id} in {tenant_id}")))?;
        if certificate.revoked || certificate.status == CertificateStatus::Revoked {
            return Err(CoreError::Conflict(format!("{certificate_id} is already revoked")));
        }
        let asset_id = match (&certificate.status, &certificate.ledger_asset_id) {
            (CertificateStatus::Minted, Some(asset_id)) => asset_id.clone(),
            (status, _) => {
                return Err(CoreError::Validation(format!(
                    "{certificate_id} is {status}, only minted certificates can be revoked"
                )));
            }
        };

        let burn = BurnRequest {
            asset_id: asset_id.clone(),
            owner: certificate.recipient.clone(),
            tree: certificate.ledger_tree_id.clone(),
            authority: profile.authority.clone(),
        };
        let receipt = with_timeout(self.config.burn_timeout, self.ledger.submit_burn(&burn))
            .await
            .map_err(|e| {
                warn!(
                    tenant = %tenant_id,
                    certificate_id = %certificate_id,
                    asset_id = %asset_id,
                    error = %e,
                    "Ledger rejected burn submission"
                );
                CoreError::LedgerSubmission(e.to_string())
            })?;

        let now = Utc::now();
        certificate.mark_revoked(reason, now);
        store
            .update_certificate(&certificate, CertificateStatus::Minted)
            .await
            .map_err(|e| {
                CoreError::lost_race(e, || format!("{certificate_id} was revoked concurrently"))
            })?;

        let entry = RevocationIndexEntry {
            ledger_asset_id: asset_id.clone(),
            certificate_number: certificate.certificate_number.clone(),
            revoked_by_tenant_id: tenant_id.clone(),
            revoked_by_actor_id: actor.clone(),
            reason: reason.to_string(),
            student_wallet: certificate.recipient.clone(),
            revoked_at: now,
        };
        if let Err(e) = self.registry.audit().insert_revocation(entry).await {
            error!(
                tenant = %tenant_id,
                certificate_id = %certificate_id,
                asset_id = %asset_id,
                error = %e,
                "Certificate is REVOKED without a revocation index entry"
            );
            return Err(match e {
                StoreError::UniqueViolation(_) => {
                    CoreError::Conflict(format!("{asset_id} is already in the revocation index"))
                }
                other => CoreError::Store(other),
            });
        }

        info!(
            tenant = %tenant_id,
            certificate_id = %certificate_id,
            asset_id = %asset_id,
            signature = %receipt.signature,
            actor = %actor,
            "Certificate revoked"
        );
        self.notifier.emit(DomainEvent::CertificateRevoked {
            tenant_id: tenant_id.clone(),
            actor_id: actor.clone(),
            certificate_id,
            asset_id,
            reason: reason.to_string(),
        });
        Ok(certificate)
    }

    /// Look up an asset in the shared revocation index. Needs no tenant.
    pub async fn revocation_status(
        &self,
        asset_id: &LedgerAssetId,
    ) -> CoreResult<Option<RevocationIndexEntry>> {
        Ok(self.registry.audit().find_revocation(asset_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::{ExternalError, TenantStore};
    use certchain_notify::{EventNotifier, SubscriptionScope};
    use certchain_simulation::{
        MemoryAuditStore, MemoryConnector, MemoryTenantStore, ScriptedLedger,
    };
    use certchain_tenancy::DescriptorCipher;
    use certchain_types::{
        ConnectionDescriptor, StudentId, TenantProfile, TreeId, WalletAddress,
    };
    use std::time::Duration;
    use tracing_test::traced_test;

    struct Fixture {
        coordinator: Arc<RevocationCoordinator>,
        ledger: Arc<ScriptedLedger>,
        store: Arc<MemoryTenantStore>,
        audit: Arc<MemoryAuditStore>,
        notifier: EventNotifier,
    }

    fn fixture(ledger: ScriptedLedger) -> Fixture {
        let store = Arc::new(MemoryTenantStore::new("uoc"));
        let connector = Arc::new(MemoryConnector::new());
        connector.register("memory://uoc", store.clone());
        let audit = Arc::new(MemoryAuditStore::new());
        audit.add_tenant(TenantProfile {
            tenant_id: TenantId::new("uoc"),
            routing_code: "UOC".into(),
            descriptor: ConnectionDescriptor::new("memory://uoc"),
            tree_id: TreeId::new("T"),
            authority: WalletAddress::new("auth"),
            active: true,
        });
        let registry = Arc::new(TenantConnectionRegistry::new(
            connector,
            audit.clone(),
            DescriptorCipher::plaintext_only(),
        ));
        let ledger = Arc::new(ledger);
        let notifier = EventNotifier::default();
        let coordinator = Arc::new(RevocationCoordinator::new(
            registry,
            ledger.clone(),
            Arc::new(notifier.clone()),
            RevocationConfig::default().with_burn_timeout(Duration::from_secs(5)),
        ));
        Fixture {
            coordinator,
            ledger,
            store,
            audit,
            notifier,
        }
    }

    async fn seed(store: &MemoryTenantStore, status: CertificateStatus) -> Certificate {
        let certificate = Certificate {
            id: CertificateId::generate(),
            certificate_number: "UOC-2025-GEN-00001".into(),
            student_id: StudentId::new("s1"),
            recipient: WalletAddress::new("w1"),
            badge_title: "BSc".into(),
            status,
            ledger_asset_id: (status == CertificateStatus::Minted)
                .then(|| LedgerAssetId::new("A1")),
            ledger_tree_id: TreeId::new("T"),
            submission_signature: None,
            leaf_index: None,
            revoked: false,
            revoked_at: None,
            revocation_reason: None,
            metadata_uri: "memory://meta".into(),
            issued_by: ActorId::new("registrar"),
            created_at: Utc::now(),
        };
        store.insert_certificate(certificate.clone()).await.unwrap();
        certificate
    }

    fn tenant() -> TenantId {
        TenantId::new("uoc")
    }

    #[tokio::test]
    async fn test_revoke_burns_updates_and_indexes() {
        let f = fixture(ScriptedLedger::new());
        let mut events = f.notifier.subscribe(SubscriptionScope::Tenant(tenant()));
        let cert = seed(&f.store, CertificateStatus::Minted).await;

        let revoked = f
            .coordinator
            .revoke(&tenant(), cert.id, "academic misconduct", &ActorId::new("dean"))
            .await
            .unwrap();

        assert_eq!(revoked.status, CertificateStatus::Revoked);
        assert!(revoked.revoked);
        assert!(revoked.revoked_at.is_some());
        assert_eq!(revoked.revocation_reason.as_deref(), Some("academic misconduct"));
        assert_eq!(f.store.certificates(), vec![revoked]);

        let burns = f.ledger.burns();
        assert_eq!(burns.len(), 1);
        assert_eq!(burns[0].asset_id, LedgerAssetId::new("A1"));
        assert_eq!(burns[0].authority, WalletAddress::new("auth"));

        let status = f
            .coordinator
            .revocation_status(&LedgerAssetId::new("A1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.revoked_by_tenant_id, tenant());
        assert_eq!(status.revoked_by_actor_id, ActorId::new("dean"));
        assert_eq!(status.student_wallet, WalletAddress::new("w1"));

        assert!(matches!(
            events.try_recv(),
            Some(DomainEvent::CertificateRevoked { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_revoke_is_conflict_without_duplicate_index_entry() {
        let f = fixture(ScriptedLedger::new());
        let cert = seed(&f.store, CertificateStatus::Minted).await;
        let dean = ActorId::new("dean");

        f.coordinator.revoke(&tenant(), cert.id, "first", &dean).await.unwrap();
        let err = f
            .coordinator
            .revoke(&tenant(), cert.id, "second", &dean)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(f.audit.revocations().len(), 1);
        assert_eq!(f.ledger.burns().len(), 1);
    }

    #[tokio::test]
    async fn test_only_minted_certificates_can_be_revoked() {
        let f = fixture(ScriptedLedger::new());
        let cert = seed(&f.store, CertificateStatus::Pending).await;

        let err = f
            .coordinator
            .revoke(&tenant(), cert.id, "r", &ActorId::new("dean"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = f
            .coordinator
            .revoke(&tenant(), CertificateId::generate(), "r", &ActorId::new("dean"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(f.ledger.burns().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_burn_failure_changes_nothing() {
        let f = fixture(ScriptedLedger::new());
        f.ledger
            .script_burn(Err(ExternalError::Rejected("tree authority mismatch".into())));
        let cert = seed(&f.store, CertificateStatus::Minted).await;

        let err = f
            .coordinator
            .revoke(&tenant(), cert.id, "r", &ActorId::new("dean"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::LedgerSubmission(_)));
        assert_eq!(f.store.certificates(), vec![cert]);
        assert!(f.audit.revocations().is_empty());
        assert!(logs_contain("Ledger rejected burn submission"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_revokes_have_one_winner() {
        let f = fixture(ScriptedLedger::new().with_latency(Duration::from_millis(20)));
        let cert = seed(&f.store, CertificateStatus::Minted).await;
        let dean = ActorId::new("dean");
        let registrar = ActorId::new("registrar");

        let tid = tenant();
        let (a, b) = tokio::join!(
            f.coordinator.revoke(&tid, cert.id, "a", &dean),
            f.coordinator.revoke(&tid, cert.id, "b", &registrar),
        );

        let errors: Vec<_> = [a, b].into_iter().filter_map(Result::err).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CoreError::Conflict(_)));
        assert_eq!(f.audit.revocations().len(), 1);
    }
}
