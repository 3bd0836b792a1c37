//! Tenant connection registry.

use crate::{DescriptorCipher, RegistryConfig};
use certchain_core::{
    AuditStore, CoreError, CoreResult, StoreError, TenantConnector, TenantStore,
};
use certchain_types::{ConnectionDescriptor, TenantId, TenantProfile};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

type HandleCell = Arc<OnceCell<Arc<dyn TenantStore>>>;

/// A resolved tenant: its shared-store profile and an open store handle.
#[derive(Clone)]
pub struct TenantContext {
    pub profile: TenantProfile,
    pub store: Arc<dyn TenantStore>,
}

/// Caches one open tenant store per distinct connection descriptor.
///
/// Keys are the descriptors as stored (possibly encrypted). Each key owns a
/// [`OnceCell`], so concurrent first access to one descriptor constructs a
/// single handle while other descriptors proceed in parallel. A failed
/// construction leaves the cell empty for the next caller to retry.
pub struct TenantConnectionRegistry {
    connector: Arc<dyn TenantConnector>,
    audit: Arc<dyn AuditStore>,
    cipher: DescriptorCipher,
    config: RegistryConfig,
    handles: DashMap<ConnectionDescriptor, HandleCell>,
}

impl TenantConnectionRegistry {
    pub fn new(
        connector: Arc<dyn TenantConnector>,
        audit: Arc<dyn AuditStore>,
        cipher: DescriptorCipher,
    ) -> Self {
        Self::with_config(connector, audit, cipher, RegistryConfig::default())
    }

    pub fn with_config(
        connector: Arc<dyn TenantConnector>,
        audit: Arc<dyn AuditStore>,
        cipher: DescriptorCipher,
        config: RegistryConfig,
    ) -> Self {
        Self {
            connector,
            audit,
            cipher,
            config,
            handles: DashMap::new(),
        }
    }

    /// The cipher used for descriptors.
    pub fn cipher(&self) -> &DescriptorCipher {
        &self.cipher
    }

    /// The shared audit store tenant profiles are read from.
    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }

    /// Return the cached handle for `descriptor`, opening it on first use.
    pub async fn resolve(&self, descriptor: &ConnectionDescriptor) -> CoreResult<Arc<dyn TenantStore>> {
        let cell = self
            .handles
            .entry(descriptor.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();

        // A failed open leaves the cell empty in the map; the next waiter retries on it.
        let store = cell.get_or_try_init(|| self.open(descriptor)).await?;
        Ok(store.clone())
    }

    /// Look a tenant up in the shared store and resolve its descriptor.
    pub async fn resolve_for_tenant(&self, tenant_id: &TenantId) -> CoreResult<TenantContext> {
        let profile = self
            .audit
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{tenant_id} is not registered")))?;
        if !profile.active {
            return Err(CoreError::Validation(format!("{tenant_id} is inactive")));
        }
        let store = self.resolve(&profile.descriptor).await?;
        Ok(TenantContext { profile, store })
    }

    /// Close and evict one handle. Returns whether a live handle was closed.
    pub async fn disconnect(&self, descriptor: &ConnectionDescriptor) -> bool {
        let Some((_, cell)) = self.handles.remove(descriptor) else {
            return false;
        };
        let Some(store) = cell.get() else {
            return false;
        };
        if let Err(e) = store.close().await {
            warn!(descriptor = %descriptor, error = %e, "Failed to close tenant connection");
        } else {
            info!(descriptor = %descriptor, "Closed tenant connection");
        }
        true
    }

    /// Close every handle concurrently. Failures are logged, not returned.
    pub async fn disconnect_all(&self) -> usize {
        let keys: Vec<ConnectionDescriptor> =
            self.handles.iter().map(|e| e.key().clone()).collect();
        let stores: Vec<(ConnectionDescriptor, Arc<dyn TenantStore>)> = keys
            .into_iter()
            .filter_map(|key| {
                let (key, cell) = self.handles.remove(&key)?;
                let store = cell.get()?.clone();
                Some((key, store))
            })
            .collect();

        let results = join_all(stores.iter().map(|(_, store)| store.close())).await;
        let mut closed = 0;
        for ((descriptor, _), result) in stores.iter().zip(results) {
            match result {
                Ok(()) => closed += 1,
                Err(e) => {
                    warn!(descriptor = %descriptor, error = %e, "Failed to close tenant connection")
                }
            }
        }
        info!(closed, total = stores.len(), "Closed tenant connections");
        closed
    }

    /// Release all handles. Call once on process exit.
    pub async fn shutdown(&self) {
        self.disconnect_all().await;
    }

    /// Round-trip the tenant store. Never fails: any error reads as unhealthy.
    pub async fn health_check(&self, descriptor: &ConnectionDescriptor) -> bool {
        let round_trip = async {
            let store = self.resolve(descriptor).await?;
            store.ping().await?;
            Ok::<_, CoreError>(())
        };
        match tokio::time::timeout(self.config.health_timeout, round_trip).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(descriptor = %descriptor, error = %e, "Tenant health check failed");
                false
            }
            Err(_) => {
                warn!(descriptor = %descriptor, "Tenant health check timed out");
                false
            }
        }
    }

    /// Number of live handles.
    pub fn connection_count(&self) -> usize {
        self.handles
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    async fn open(&self, descriptor: &ConnectionDescriptor) -> CoreResult<Arc<dyn TenantStore>> {
        let plain = self.cipher.decrypt(descriptor).map_err(|e| {
            CoreError::Configuration(format!("cannot decrypt descriptor {descriptor}: {e}"))
        })?;
        Url::parse(plain.expose()).map_err(|_| {
            CoreError::Configuration(format!("descriptor {plain} is not a valid URL"))
        })?;

        debug!(descriptor = %plain, "Opening tenant connection");
        let store = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(&plain))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "connect timed out after {:?}",
                    self.config.connect_timeout
                ))
            })??;
        info!(descriptor = %plain, "Opened tenant connection");
        Ok(store)
    }
}
