//! Collaborator traits.
//!
//! Every external dependency of the coordinators sits behind one of these
//! traits so the same coordinator code runs against the in-memory
//! implementations in tests and the networked ones in the node.
//!
//! None of the stores share a transaction with another. Mutations of a
//! [`Certificate`] are conditional on the expected prior status so that
//! concurrent writers cannot move it backwards.

use crate::{DomainEvent, ExternalError, StoreError};
use async_trait::async_trait;
use certchain_types::{
    BurnRequest, Certificate, CertificateId, CertificateStatus, ConnectionDescriptor,
    IndexedAsset, LedgerAssetId, MintActivityLogEntry, MintRequest, RevocationIndexEntry, Student,
    StudentId, SubmissionReceipt, SubmissionSignature, TenantId, TenantProfile, WalletAddress,
    WebhookDelivery,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// One tenant's relational store.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Trivial round-trip used by health checks.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release the underlying connection. Later calls fail with
    /// [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;

    async fn find_student(&self, id: &StudentId) -> Result<Option<Student>, StoreError>;

    /// A PENDING or MINTED certificate for the same student and title.
    async fn find_active_certificate(
        &self,
        student: &StudentId,
        badge_title: &str,
    ) -> Result<Option<Certificate>, StoreError>;

    /// Number of certificate rows, any status.
    async fn count_certificates(&self) -> Result<u64, StoreError>;

    /// Insert a new row. Fails with [`StoreError::UniqueViolation`] when the
    /// certificate number is already taken.
    async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StoreError>;

    async fn get_certificate(&self, id: CertificateId) -> Result<Option<Certificate>, StoreError>;

    async fn find_by_asset(
        &self,
        asset_id: &LedgerAssetId,
    ) -> Result<Option<Certificate>, StoreError>;

    async fn find_by_submission(
        &self,
        signature: &SubmissionSignature,
    ) -> Result<Option<Certificate>, StoreError>;

    /// PENDING certificates that carry a submission signature.
    async fn pending_with_submission(&self) -> Result<Vec<Certificate>, StoreError>;

    /// Replace a row if its stored status still equals `expected`, otherwise
    /// fail with [`StoreError::StaleState`].
    async fn update_certificate(
        &self,
        certificate: &Certificate,
        expected: CertificateStatus,
    ) -> Result<(), StoreError>;
}

/// Opens tenant stores from (already decrypted) descriptors.
#[async_trait]
pub trait TenantConnector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn TenantStore>, StoreError>;
}

/// The shared, cross-tenant audit store.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn find_tenant(&self, tenant_id: &TenantId) -> Result<Option<TenantProfile>, StoreError>;

    /// Insert an entry. Fails with [`StoreError::UniqueViolation`] when the
    /// asset reference is already used.
    async fn insert_mint_activity(&self, entry: MintActivityLogEntry) -> Result<(), StoreError>;

    /// Entry keyed by an assigned asset id.
    async fn find_mint_activity(
        &self,
        asset_id: &LedgerAssetId,
    ) -> Result<Option<MintActivityLogEntry>, StoreError>;

    /// Most recent entry carrying `signature`.
    async fn find_mint_activity_by_signature(
        &self,
        signature: &SubmissionSignature,
    ) -> Result<Option<MintActivityLogEntry>, StoreError>;

    /// Replace the entry with the same `id`, re-keying it if its asset
    /// reference changed.
    async fn update_mint_activity(&self, entry: &MintActivityLogEntry) -> Result<(), StoreError>;

    /// Append to the revocation index. Fails with
    /// [`StoreError::UniqueViolation`] if the asset is already listed.
    async fn insert_revocation(&self, entry: RevocationIndexEntry) -> Result<(), StoreError>;

    async fn find_revocation(
        &self,
        asset_id: &LedgerAssetId,
    ) -> Result<Option<RevocationIndexEntry>, StoreError>;

    /// Record a verified webhook delivery before it is dispatched.
    async fn insert_webhook_delivery(&self, delivery: WebhookDelivery) -> Result<(), StoreError>;

    /// Mark a recorded delivery as processed.
    async fn mark_webhook_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Submits instructions to the ledger. Returned signatures are not final.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit_mint(&self, request: &MintRequest) -> Result<SubmissionReceipt, ExternalError>;

    async fn submit_burn(&self, request: &BurnRequest) -> Result<SubmissionReceipt, ExternalError>;
}

/// Read-side ledger indexer. May lag behind the ledger.
#[async_trait]
pub trait AssetIndexer: Send + Sync {
    async fn assets_by_owner(
        &self,
        owner: &WalletAddress,
    ) -> Result<Vec<IndexedAsset>, ExternalError>;
}

/// Fire-and-forget sink for state-transition events.
///
/// Implementations must not block and must not fail the caller.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn emit(&self, _event: DomainEvent) {}
}
