//! In-memory tenant connector.

use crate::MemoryTenantStore;
use async_trait::async_trait;
use certchain_core::{StoreError, TenantConnector, TenantStore};
use certchain_types::ConnectionDescriptor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hands out registered [`MemoryTenantStore`]s by descriptor.
///
/// Counts every construction so tests can assert that concurrent resolves of
/// one descriptor open exactly one handle.
#[derive(Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<String, Arc<MemoryTenantStore>>>,
    connects: AtomicUsize,
    failures_remaining: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: delay every connect by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register the store served for a plaintext descriptor.
    pub fn register(&self, descriptor: impl Into<String>, store: Arc<MemoryTenantStore>) {
        self.stores.lock().insert(descriptor.into(), store);
    }

    /// Fail the next `n` connects with [`StoreError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of connect calls that reached the connector.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantConnector for MemoryConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn TenantStore>, StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("connection refused".into()));
        }

        let store = self
            .stores
            .lock()
            .get(descriptor.expose())
            .cloned()
            .ok_or_else(|| StoreError::Unavailable("unknown database".into()))?;
        store.reopen();
        debug!(store = store.name(), "Opened in-memory tenant store");
        Ok(store)
    }
}
