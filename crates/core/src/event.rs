//! Domain and confirmation events.

use certchain_types::{
    ActorId, CertificateId, LedgerAssetId, ResolvedAsset, StudentId, SubmissionSignature,
    TenantId, WebhookPayload,
};

/// Terminal state transitions, published through a
/// [`NotificationSink`](crate::NotificationSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    // ═══════════════════════════════════════════════════════════════════════
    // Issuance
    // ═══════════════════════════════════════════════════════════════════════
    /// The ledger confirmed a mint.
    CertificateMinted {
        tenant_id: TenantId,
        actor_id: ActorId,
        certificate_id: CertificateId,
        certificate_number: String,
        asset_id: LedgerAssetId,
    },

    /// A pending issuance was abandoned.
    CertificateFailed {
        tenant_id: TenantId,
        actor_id: ActorId,
        certificate_id: CertificateId,
        reason: String,
    },

    /// The ledger refused or never answered a mint submission.
    IssuanceFailed {
        tenant_id: TenantId,
        actor_id: ActorId,
        student_id: StudentId,
        badge_title: String,
        error: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Revocation
    // ═══════════════════════════════════════════════════════════════════════
    /// A minted credential was burned and indexed as revoked.
    CertificateRevoked {
        tenant_id: TenantId,
        actor_id: ActorId,
        certificate_id: CertificateId,
        asset_id: LedgerAssetId,
        reason: String,
    },
}

impl DomainEvent {
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            DomainEvent::CertificateMinted { tenant_id, .. }
            | DomainEvent::CertificateFailed { tenant_id, .. }
            | DomainEvent::IssuanceFailed { tenant_id, .. }
            | DomainEvent::CertificateRevoked { tenant_id, .. } => tenant_id,
        }
    }

    pub fn actor_id(&self) -> &ActorId {
        match self {
            DomainEvent::CertificateMinted { actor_id, .. }
            | DomainEvent::CertificateFailed { actor_id, .. }
            | DomainEvent::IssuanceFailed { actor_id, .. }
            | DomainEvent::CertificateRevoked { actor_id, .. } => actor_id,
        }
    }

    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            DomainEvent::CertificateMinted { .. } => "CertificateMinted",
            DomainEvent::CertificateFailed { .. } => "CertificateFailed",
            DomainEvent::IssuanceFailed { .. } => "IssuanceFailed",
            DomainEvent::CertificateRevoked { .. } => "CertificateRevoked",
        }
    }
}

/// A pending certificate located on the ledger by the reconciliation sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub tenant_id: TenantId,
    pub certificate_id: CertificateId,
    pub submission_signature: Option<SubmissionSignature>,
    pub resolved: ResolvedAsset,
}

/// Where a confirmation came from. Both paths end in the same apply step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationEvent {
    /// Pushed by the ledger webhook.
    Push(WebhookPayload),
    /// Pulled by the reconciliation sweep.
    Pull(ReconciliationResult),
}

impl ConfirmationEvent {
    /// Label used for logs and metrics.
    pub fn path(&self) -> &'static str {
        match self {
            ConfirmationEvent::Push(_) => "push",
            ConfirmationEvent::Pull(_) => "pull",
        }
    }
}
