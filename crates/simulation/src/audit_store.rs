//! In-memory shared audit store.

use async_trait::async_trait;
use certchain_core::{AuditStore, StoreError};
use certchain_types::{
    LedgerAssetId, MintActivityLogEntry, RevocationIndexEntry, SubmissionSignature,
    TenantId, TenantProfile, WebhookDelivery,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    tenants: HashMap<TenantId, TenantProfile>,
    mint_activity: Vec<MintActivityLogEntry>,
    revocations: HashMap<LedgerAssetId, RevocationIndexEntry>,
    webhook_deliveries: Vec<WebhookDelivery>,
}

/// Shared audit store backed by in-process collections.
#[derive(Default)]
pub struct MemoryAuditStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self, profile: TenantProfile) {
        self.tables
            .lock()
            .tenants
            .insert(profile.tenant_id.clone(), profile);
    }

    /// Snapshot of the mint activity log in insertion order.
    pub fn mint_activity(&self) -> Vec<MintActivityLogEntry> {
        self.tables.lock().mint_activity.clone()
    }

    /// Snapshot of the revocation index.
    pub fn revocations(&self) -> Vec<RevocationIndexEntry> {
        self.tables.lock().revocations.values().cloned().collect()
    }

    /// Snapshot of recorded webhook deliveries in arrival order.
    pub fn webhook_deliveries(&self) -> Vec<WebhookDelivery> {
        self.tables.lock().webhook_deliveries.clone()
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit store is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn find_tenant(&self, tenant_id: &TenantId) -> Result<Option<TenantProfile>, StoreError> {
        self.check()?;
        Ok(self.tables.lock().tenants.get(tenant_id).cloned())
    }

    async fn insert_mint_activity(&self, entry: MintActivityLogEntry) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock();
        if tables
            .mint_activity
            .iter()
            .any(|e| e.asset_ref.as_str() == entry.asset_ref.as_str())
        {
            return Err(StoreError::UniqueViolation(format!(
                "asset_ref {}",
                entry.asset_ref
            )));
        }
        tables.mint_activity.push(entry);
        Ok(())
    }

    async fn find_mint_activity(
        &self,
        asset_id: &LedgerAssetId,
    ) -> Result<Option<MintActivityLogEntry>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .mint_activity
            .iter()
            .find(|e| e.asset_ref.asset_id() == Some(asset_id))
            .cloned())
    }

    async fn find_mint_activity_by_signature(
        &self,
        signature: &SubmissionSignature,
    ) -> Result<Option<MintActivityLogEntry>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .mint_activity
            .iter()
            .rev()
            .find(|e| e.submission_signature.as_ref() == Some(signature))
            .cloned())
    }

    async fn update_mint_activity(&self, entry: &MintActivityLogEntry) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock();
        if tables
            .mint_activity
            .iter()
            .any(|e| e.id != entry.id && e.asset_ref.as_str() == entry.asset_ref.as_str())
        {
            return Err(StoreError::UniqueViolation(format!(
                "asset_ref {}",
                entry.asset_ref
            )));
        }
        let slot = tables
            .mint_activity
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| StoreError::StaleState(format!("mint activity {} missing", entry.id)))?;
        *slot = entry.clone();
        Ok(())
    }

    async fn insert_revocation(&self, entry: RevocationIndexEntry) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock();
        if tables.revocations.contains_key(&entry.ledger_asset_id) {
            return Err(StoreError::UniqueViolation(format!(
                "revocation {}",
                entry.ledger_asset_id
            )));
        }
        tables
            .revocations
            .insert(entry.ledger_asset_id.clone(), entry);
        Ok(())
    }

    async fn find_revocation(
        &self,
        asset_id: &LedgerAssetId,
    ) -> Result<Option<RevocationIndexEntry>, StoreError> {
        self.check()?;
        Ok(self.tables.lock().revocations.get(asset_id).cloned())
    }

    async fn insert_webhook_delivery(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        self.check()?;
        self.tables.lock().webhook_deliveries.push(delivery);
        Ok(())
    }

    async fn mark_webhook_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock();
        let delivery = tables
            .webhook_deliveries
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::StaleState(format!("webhook delivery {id} missing")))?;
        delivery.processed = true;
        delivery.processed_at = Some(at);
        Ok(())
    }
}
