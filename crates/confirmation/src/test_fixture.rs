//! Shared wiring for the confirmation tests.

use crate::ConfirmationIngress;
use certchain_core::{AuditStore, TenantStore};
use certchain_notify::EventNotifier;
use certchain_simulation::{MemoryAuditStore, MemoryConnector, MemoryTenantStore, ScriptedIndexer};
use certchain_tenancy::{DescriptorCipher, TenantConnectionRegistry};
use certchain_types::{
    ActorId, Certificate, CertificateId, CertificateStatus, Compression, ConnectionDescriptor,
    IndexedAsset, LedgerAssetId, MintActivityLogEntry, StudentId, SubmissionSignature, TenantId,
    TenantProfile, TreeId, WalletAddress,
};
use chrono::Utc;
use std::sync::Arc;

pub(crate) struct Fixture {
    pub ingress: Arc<ConfirmationIngress>,
    pub mit: Arc<MemoryTenantStore>,
    pub eth: Arc<MemoryTenantStore>,
    pub audit: Arc<MemoryAuditStore>,
    pub indexer: Arc<ScriptedIndexer>,
    pub notifier: EventNotifier,
}

fn profile(name: &str) -> TenantProfile {
    TenantProfile {
        tenant_id: TenantId::new(name),
        routing_code: name.to_uppercase(),
        descriptor: ConnectionDescriptor::new(format!("memory://{name}")),
        tree_id: TreeId::new("T"),
        authority: WalletAddress::new("auth"),
        active: true,
    }
}

pub(crate) fn fixture() -> Fixture {
    let mit = Arc::new(MemoryTenantStore::new("mit"));
    let eth = Arc::new(MemoryTenantStore::new("eth"));
    let connector = Arc::new(MemoryConnector::new());
    connector.register("memory://mit", mit.clone());
    connector.register("memory://eth", eth.clone());

    let audit = Arc::new(MemoryAuditStore::new());
    audit.add_tenant(profile("mit"));
    audit.add_tenant(profile("eth"));

    let registry = Arc::new(TenantConnectionRegistry::new(
        connector,
        audit.clone(),
        DescriptorCipher::plaintext_only(),
    ));
    let notifier = EventNotifier::default();
    let ingress = Arc::new(ConfirmationIngress::new(registry, Arc::new(notifier.clone())));
    Fixture {
        ingress,
        mit,
        eth,
        audit,
        indexer: Arc::new(ScriptedIndexer::new()),
        notifier,
    }
}

impl Fixture {
    /// Seed a PENDING certificate `n` for the MIT tenant with signature
    /// `sig-{n}`, recipient `w{n}` and its SUBMITTED entry.
    pub async fn seed_pending(&self, n: u64) -> Certificate {
        let certificate = self.seed_certificate(n).await;
        self.audit
            .insert_mint_activity(MintActivityLogEntry::submitted(
                TenantId::new("mit"),
                certificate.id,
                certificate.certificate_number.clone(),
                certificate.recipient.clone(),
                signature(n),
                certificate.created_at,
            ))
            .await
            .unwrap();
        certificate
    }

    /// Like [`Self::seed_pending`] but without the audit entry, as if the
    /// audit write failed after the row was inserted.
    pub async fn seed_certificate(&self, n: u64) -> Certificate {
        let now = Utc::now();
        let certificate = Certificate {
            id: CertificateId::generate(),
            certificate_number: format!("MIT-2025-GEN-{n:05}"),
            student_id: StudentId::new(format!("s{n}")),
            recipient: WalletAddress::new(format!("w{n}")),
            badge_title: "BSc".into(),
            status: CertificateStatus::Pending,
            ledger_asset_id: None,
            ledger_tree_id: TreeId::new("T"),
            submission_signature: Some(signature(n)),
            leaf_index: None,
            revoked: false,
            revoked_at: None,
            revocation_reason: None,
            metadata_uri: format!("memory://meta/{n}"),
            issued_by: ActorId::new("registrar"),
            created_at: now,
        };
        self.mit.insert_certificate(certificate.clone()).await.unwrap();
        certificate
    }

    /// Make `asset` visible to the indexer as held by `certificate`'s recipient.
    pub fn publish(&self, certificate: &Certificate, asset: &str, leaf: u64) {
        self.indexer.hold(
            &certificate.recipient,
            IndexedAsset {
                id: LedgerAssetId::new(asset),
                burnt: false,
                compression: Compression {
                    compressed: true,
                    tree: Some(certificate.ledger_tree_id.clone()),
                    leaf_id: Some(leaf),
                },
            },
        );
    }

    pub async fn certificate(&self, id: CertificateId) -> Certificate {
        self.mit.get_certificate(id).await.unwrap().unwrap()
    }
}

pub(crate) fn signature(n: u64) -> SubmissionSignature {
    SubmissionSignature::new(format!("sig-{n}"))
}

pub(crate) fn mint_body(signature: &str, asset: &str, leaf: u64) -> Vec<u8> {
    format!(
        r#"{{"signature":"{signature}","type":"MINT","timestamp":1700000000,"nftData":{{"mint":"{asset}","owner":"w1","leafIndex":{leaf}}}}}"#
    )
    .into_bytes()
}
