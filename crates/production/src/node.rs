//! Node wiring.
//!
//! Tenant and audit stores are the in-memory implementations, seeded from the
//! `[[tenants]]` fixtures. The ledger and indexer are the HTTP clients when a
//! `[ledger]` section is present, otherwise an in-process simulated ledger
//! whose mints become visible to the indexer immediately.

use crate::config::{ConfigError, NodeConfig};
use crate::server::{self, AppState};
use crate::{DasIndexer, HttpClientError, HttpLedgerClient, MetricsError, NodeMetrics, SweepDriver};
use certchain_confirmation::{ConfirmationIngress, ReconciliationSweep, WebhookHandler, WebhookVerifier};
use certchain_core::{AssetIndexer, CoreError, LedgerClient, NotificationSink};
use certchain_issuance::CertificateIssuanceCoordinator;
use certchain_notify::EventNotifier;
use certchain_resolver::LedgerAssetResolver;
use certchain_revocation::RevocationCoordinator;
use certchain_simulation::{
    MemoryAuditStore, MemoryConnector, MemoryTenantStore, ScriptedIndexer, ScriptedLedger,
};
use certchain_tenancy::{DescriptorCipher, DescriptorError, TenantConnectionRegistry};
use certchain_types::TenantId;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors building or running the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("HTTP client error: {0}")]
    Http(#[from] HttpClientError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully wired certchain node.
pub struct Node {
    config: NodeConfig,
    registry: Arc<TenantConnectionRegistry>,
    audit: Arc<MemoryAuditStore>,
    notifier: EventNotifier,
    metrics: NodeMetrics,
    issuance: Arc<CertificateIssuanceCoordinator>,
    revocation: Arc<RevocationCoordinator>,
    ingress: Arc<ConfirmationIngress>,
    sweep: Arc<ReconciliationSweep>,
}

impl Node {
    pub fn build(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let cipher = match config.secrets.master_key.as_deref() {
            Some(key) => DescriptorCipher::from_hex(key)?,
            None => DescriptorCipher::plaintext_only(),
        };

        let audit = Arc::new(MemoryAuditStore::new());
        let connector = Arc::new(MemoryConnector::new());
        for fixture in &config.tenants {
            let profile = &fixture.profile;
            let plaintext = cipher.decrypt(&profile.descriptor)?;
            let store = MemoryTenantStore::new(profile.tenant_id.as_str())
                .with_students(fixture.students.iter().cloned());
            connector.register(plaintext.expose(), Arc::new(store));
            audit.add_tenant(profile.clone());
            info!(
                tenant = %profile.tenant_id,
                descriptor = %profile.descriptor,
                students = fixture.students.len(),
                "Seeded tenant"
            );
        }

        let (ledger, indexer): (Arc<dyn LedgerClient>, Arc<dyn AssetIndexer>) =
            match &config.ledger {
                Some(endpoints) => (
                    Arc::new(HttpLedgerClient::new(
                        &endpoints.ledger_url,
                        endpoints.request_timeout,
                    )?),
                    Arc::new(DasIndexer::new(
                        &endpoints.indexer_url,
                        endpoints.request_timeout,
                    )?),
                ),
                None => {
                    warn!("No [ledger] section, using the in-process simulated ledger");
                    let indexer = Arc::new(ScriptedIndexer::new());
                    let ledger = ScriptedLedger::new().with_indexer(indexer.clone());
                    (Arc::new(ledger), indexer)
                }
            };

        let registry = Arc::new(TenantConnectionRegistry::with_config(
            connector,
            audit.clone(),
            cipher,
            config.registry_config(),
        ));
        let notifier = EventNotifier::default();
        let sink: Arc<dyn NotificationSink> = Arc::new(notifier.clone());

        let issuance = Arc::new(CertificateIssuanceCoordinator::new(
            registry.clone(),
            ledger.clone(),
            sink.clone(),
            config.issuance_config(),
        ));
        let revocation = Arc::new(RevocationCoordinator::new(
            registry.clone(),
            ledger,
            sink.clone(),
            config.revocation_config(),
        ));
        let ingress = Arc::new(ConfirmationIngress::new(registry.clone(), sink));
        let resolver = Arc::new(LedgerAssetResolver::with_config(
            indexer,
            config.resolver_config(),
        ));
        let sweep = Arc::new(ReconciliationSweep::new(
            ingress.clone(),
            resolver,
            config.sweep_config(),
        ));

        Ok(Self {
            config,
            registry,
            audit,
            notifier,
            metrics: NodeMetrics::new()?,
            issuance,
            revocation,
            ingress,
            sweep,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TenantConnectionRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &Arc<MemoryAuditStore> {
        &self.audit
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    pub fn issuance(&self) -> &Arc<CertificateIssuanceCoordinator> {
        &self.issuance
    }

    pub fn revocation(&self) -> &Arc<RevocationCoordinator> {
        &self.revocation
    }

    pub fn ingress(&self) -> &Arc<ConfirmationIngress> {
        &self.ingress
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        self.config
            .tenants
            .iter()
            .map(|t| t.profile.tenant_id.clone())
            .collect()
    }

    /// HTTP state. Fails when no webhook secret is configured.
    pub fn app_state(&self) -> Result<AppState, NodeError> {
        let verifier = WebhookVerifier::new(self.config.webhook_secret()?)?;
        Ok(AppState {
            webhook: Arc::new(WebhookHandler::new(self.ingress.clone(), verifier)),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
        })
    }

    pub fn sweep_driver(&self) -> SweepDriver {
        SweepDriver::new(
            self.sweep.clone(),
            self.tenant_ids(),
            self.config.sweep.interval,
            self.metrics.clone(),
        )
    }

    /// Serve HTTP and, if enabled, the periodic sweep until `shutdown`
    /// resolves, then close every tenant connection.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), NodeError> {
        let state = self.app_state()?;
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let sweeper = if self.config.sweep.enabled {
            let driver = self.sweep_driver();
            Some(tokio::spawn(driver.run(async move {
                let _ = stop_rx.await;
            })))
        } else {
            None
        };

        info!(addr = ?listener.local_addr().ok(), "Serving");
        let served = server::serve(listener, state, shutdown).await;

        let _ = stop_tx.send(());
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweep driver task failed");
            }
        }
        self.registry.shutdown().await;
        served?;
        Ok(())
    }
}
