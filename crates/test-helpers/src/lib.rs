//! Test helpers for certchain.
//!
//! [`Harness`] wires every coordinator against the in-memory collaborators
//! from `certchain-simulation`: two tenants (`mit`, `eth`) each with their
//! own store and tree, one shared audit store, and a scripted ledger whose
//! mints appear in the scripted indexer straight away.

use certchain_confirmation::{
    ConfirmationIngress, ReconciliationSweep, SweepConfig, WebhookDisposition, WebhookHandler,
    WebhookVerifier,
};
use certchain_core::{CoreError, CoreResult, NotificationSink};
use certchain_issuance::{CertificateIssuanceCoordinator, IssuanceConfig};
use certchain_notify::EventNotifier;
use certchain_resolver::{LedgerAssetResolver, ResolverConfig};
use certchain_revocation::{RevocationConfig, RevocationCoordinator};
use certchain_simulation::{
    MemoryAuditStore, MemoryConnector, MemoryTenantStore, ScriptedIndexer, ScriptedLedger,
};
use certchain_tenancy::{DescriptorCipher, DescriptorError, TenantConnectionRegistry};
use certchain_types::{
    ActorId, Certificate, CertificateId, ConnectionDescriptor, IssuanceRequest, Student,
    StudentId, TenantId, TenantProfile, TreeId, WalletAddress,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared secret the harness signs webhooks with.
pub const WEBHOOK_SECRET: &str = "harness-webhook-secret";

/// Tenants seeded by [`Harness::new`].
pub const TENANTS: [&str; 2] = ["mit", "eth"];

/// Students per tenant. Student `s{n}` of tenant `t` holds wallet `t-w{n}`.
pub const STUDENTS_PER_TENANT: usize = 4;

/// Knobs for [`Harness::with_config`].
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub resolver: ResolverConfig,
    pub sweep: SweepConfig,
    pub issuance: IssuanceConfig,
    pub revocation: RevocationConfig,
    /// Encrypt tenant descriptors with a fresh master key.
    pub encrypt_descriptors: bool,
    pub ledger_latency: Option<Duration>,
    pub connect_latency: Option<Duration>,
}

/// A fully wired in-memory deployment.
pub struct Harness {
    pub registry: Arc<TenantConnectionRegistry>,
    pub connector: Arc<MemoryConnector>,
    pub audit: Arc<MemoryAuditStore>,
    pub ledger: Arc<ScriptedLedger>,
    pub indexer: Arc<ScriptedIndexer>,
    pub notifier: EventNotifier,
    pub issuance: Arc<CertificateIssuanceCoordinator>,
    pub revocation: Arc<RevocationCoordinator>,
    pub ingress: Arc<ConfirmationIngress>,
    pub resolver: Arc<LedgerAssetResolver>,
    pub sweep: Arc<ReconciliationSweep>,
    pub webhook: WebhookHandler,
    pub verifier: WebhookVerifier,
    stores: Vec<(TenantId, Arc<MemoryTenantStore>)>,
}

impl Harness {
    pub fn new() -> CoreResult<Self> {
        Self::with_config(HarnessConfig::default())
    }

    pub fn with_config(config: HarnessConfig) -> CoreResult<Self> {
        let cipher = if config.encrypt_descriptors {
            DescriptorCipher::from_hex(&DescriptorCipher::generate_key_hex())
                .map_err(descriptor_error)?
        } else {
            DescriptorCipher::plaintext_only()
        };

        let mut connector = MemoryConnector::new();
        if let Some(latency) = config.connect_latency {
            connector = connector.with_latency(latency);
        }
        let connector = Arc::new(connector);
        let audit = Arc::new(MemoryAuditStore::new());
        let mut stores = Vec::with_capacity(TENANTS.len());
        for name in TENANTS {
            let plain = ConnectionDescriptor::new(format!("memory://{name}"));
            let store = Arc::new(MemoryTenantStore::new(name).with_students(students(name)));
            connector.register(plain.expose(), store.clone());
            audit.add_tenant(TenantProfile {
                tenant_id: TenantId::new(name),
                routing_code: name.to_uppercase(),
                descriptor: if cipher.has_key() {
                    cipher.encrypt(&plain).map_err(descriptor_error)?
                } else {
                    plain.clone()
                },
                tree_id: tree(name),
                authority: WalletAddress::new(format!("{name}-authority")),
                active: true,
            });
            stores.push((TenantId::new(name), store));
        }

        let registry = Arc::new(TenantConnectionRegistry::new(
            connector.clone(),
            audit.clone(),
            cipher,
        ));
        let indexer = Arc::new(ScriptedIndexer::new());
        let mut ledger = ScriptedLedger::new().with_indexer(indexer.clone());
        if let Some(latency) = config.ledger_latency {
            ledger = ledger.with_latency(latency);
        }
        let ledger = Arc::new(ledger);
        let notifier = EventNotifier::default();
        let sink: Arc<dyn NotificationSink> = Arc::new(notifier.clone());

        let issuance = Arc::new(CertificateIssuanceCoordinator::new(
            registry.clone(),
            ledger.clone(),
            sink.clone(),
            config.issuance,
        ));
        let revocation = Arc::new(RevocationCoordinator::new(
            registry.clone(),
            ledger.clone(),
            sink.clone(),
            config.revocation,
        ));
        let ingress = Arc::new(ConfirmationIngress::new(registry.clone(), sink));
        let resolver = Arc::new(LedgerAssetResolver::with_config(
            indexer.clone(),
            config.resolver,
        ));
        let sweep = Arc::new(ReconciliationSweep::new(
            ingress.clone(),
            resolver.clone(),
            config.sweep,
        ));
        let verifier = WebhookVerifier::new(WEBHOOK_SECRET)?;
        let webhook = WebhookHandler::new(ingress.clone(), verifier.clone());

        Ok(Self {
            registry,
            connector,
            audit,
            ledger,
            indexer,
            notifier,
            issuance,
            revocation,
            ingress,
            resolver,
            sweep,
            webhook,
            verifier,
            stores,
        })
    }

    /// The in-memory store behind `tenant`.
    ///
    /// # Panics
    ///
    /// Panics if `tenant` is not one of [`TENANTS`].
    pub fn store(&self, tenant: &str) -> &Arc<MemoryTenantStore> {
        self.stores
            .iter()
            .find(|(id, _)| id.as_str() == tenant)
            .map(|(_, store)| store)
            .unwrap_or_else(|| panic!("harness has no tenant {tenant}"))
    }

    /// Current row for `id`, read without going through the registry.
    pub fn certificate(&self, tenant: &str, id: CertificateId) -> Option<Certificate> {
        self.store(tenant)
            .certificates()
            .into_iter()
            .find(|c| c.id == id)
    }

    /// Issue `title` to student `s{n}` of `tenant`, acting as `registrar`.
    pub async fn issue(&self, tenant: &str, student: usize, title: &str) -> CoreResult<Certificate> {
        self.issuance.issue(request(tenant, student, title)).await
    }

    /// A MINT webhook body for `signature`, and its signature header.
    pub fn signed_mint(
        &self,
        signature: &str,
        asset: &str,
        owner: &WalletAddress,
        leaf: u64,
    ) -> (Vec<u8>, String) {
        let body = mint_body(signature, asset, owner, leaf);
        let header = self.verifier.sign(&body);
        (body, header)
    }

    /// Deliver a signed body to the webhook handler.
    pub async fn deliver(&self, body: &[u8], header: &str) -> CoreResult<WebhookDisposition> {
        self.webhook.handle(body, Some(header)).await
    }
}

/// Issuance request for student `s{n}` of `tenant`.
pub fn request(tenant: &str, student: usize, title: &str) -> IssuanceRequest {
    IssuanceRequest {
        tenant_id: TenantId::new(tenant),
        student_id: StudentId::new(format!("s{student}")),
        badge_title: title.to_string(),
        description: None,
        issued_by: ActorId::new("registrar"),
    }
}

/// Wallet of student `s{n}` of `tenant`.
pub fn wallet(tenant: &str, student: usize) -> WalletAddress {
    WalletAddress::new(format!("{tenant}-w{student}"))
}

/// Tree `tenant` mints into.
pub fn tree(tenant: &str) -> TreeId {
    TreeId::new(format!("{tenant}-tree"))
}

pub fn mint_body(signature: &str, asset: &str, owner: &WalletAddress, leaf: u64) -> Vec<u8> {
    let owner = owner.as_str();
    format!(
        r#"{{"signature":"{signature}","type":"MINT","timestamp":1700000000,"nftData":{{"mint":"{asset}","owner":"{owner}","leafIndex":{leaf}}}}}"#
    )
    .into_bytes()
}

pub fn burn_body(asset: &str, owner: &WalletAddress) -> Vec<u8> {
    let owner = owner.as_str();
    format!(
        r#"{{"signature":"burn-{asset}","type":"BURN","timestamp":1700000100,"nftData":{{"mint":"{asset}","owner":"{owner}"}}}}"#
    )
    .into_bytes()
}

fn descriptor_error(err: DescriptorError) -> CoreError {
    CoreError::Configuration(err.to_string())
}

fn students(tenant: &str) -> Vec<Student> {
    (1..=STUDENTS_PER_TENANT)
        .map(|n| Student {
            id: StudentId::new(format!("s{n}")),
            full_name: format!("Student {n}"),
            department: Some("Computer Science".into()),
            wallet_address: Some(wallet(tenant, n)),
            active: true,
        })
        .collect()
}
