//! Shared (cross-tenant) audit rows: mint activity log and revocation index.

use crate::{ActorId, CertificateId, LedgerAssetId, SubmissionSignature, TenantId, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status of a mint activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MintActivityStatus {
    Submitted,
    Success,
    Failed,
}

impl fmt::Display for MintActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MintActivityStatus::Submitted => "SUBMITTED",
            MintActivityStatus::Success => "SUCCESS",
            MintActivityStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Key of a mint activity entry.
///
/// Issuance happens before the ledger assigns an asset id, so entries start
/// out under a unique placeholder and are re-keyed once confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssetRef {
    Placeholder(String),
    Assigned(LedgerAssetId),
}

impl AssetRef {
    /// Placeholder for a submitted (not yet confirmed) mint.
    pub fn pending() -> Self {
        AssetRef::Placeholder(format!("pending_{}", Uuid::new_v4().simple()))
    }

    /// Placeholder for a submission that never reached the ledger.
    pub fn failed() -> Self {
        AssetRef::Placeholder(format!("failed_{}", Uuid::new_v4().simple()))
    }

    /// The real asset id, if assigned.
    pub fn asset_id(&self) -> Option<&LedgerAssetId> {
        match self {
            AssetRef::Assigned(id) => Some(id),
            AssetRef::Placeholder(_) => None,
        }
    }

    /// Raw key value, unique across both forms.
    pub fn as_str(&self) -> &str {
        match self {
            AssetRef::Placeholder(p) => p,
            AssetRef::Assigned(id) => id.as_str(),
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetRef::Placeholder(p) => write!(f, "Placeholder({})", p),
            AssetRef::Assigned(id) => write!(f, "{}", id),
        }
    }
}

/// Cross-tenant correlation and idempotency record for a mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintActivityLogEntry {
    pub id: Uuid,
    pub asset_ref: AssetRef,
    pub tenant_id: TenantId,
    /// Absent for submissions that failed before a certificate row existed.
    pub certificate_id: Option<CertificateId>,
    pub certificate_number: Option<String>,
    pub recipient: WalletAddress,
    pub submission_signature: Option<SubmissionSignature>,
    pub status: MintActivityStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl MintActivityLogEntry {
    /// A freshly submitted mint, keyed by a pending placeholder.
    pub fn submitted(
        tenant_id: TenantId,
        certificate_id: CertificateId,
        certificate_number: impl Into<String>,
        recipient: WalletAddress,
        signature: SubmissionSignature,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_ref: AssetRef::pending(),
            tenant_id,
            certificate_id: Some(certificate_id),
            certificate_number: Some(certificate_number.into()),
            recipient,
            submission_signature: Some(signature),
            status: MintActivityStatus::Submitted,
            created_at: now,
            confirmed_at: None,
            error_message: None,
        }
    }

    /// A mint that failed before any certificate row was written.
    pub fn failed(
        tenant_id: TenantId,
        recipient: WalletAddress,
        signature: Option<SubmissionSignature>,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_ref: AssetRef::failed(),
            tenant_id,
            certificate_id: None,
            certificate_number: None,
            recipient,
            submission_signature: signature,
            status: MintActivityStatus::Failed,
            created_at: now,
            confirmed_at: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Mark confirmed and re-key to the ledger-assigned asset id.
    pub fn confirm(&mut self, asset_id: LedgerAssetId, at: DateTime<Utc>) {
        self.asset_ref = AssetRef::Assigned(asset_id);
        self.status = MintActivityStatus::Success;
        self.confirmed_at = Some(at);
    }

    /// Mark failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = MintActivityStatus::Failed;
        self.error_message = Some(reason.into());
    }
}

/// Shared revocation record, discoverable without knowing the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationIndexEntry {
    pub ledger_asset_id: LedgerAssetId,
    pub certificate_number: String,
    pub revoked_by_tenant_id: TenantId,
    pub revoked_by_actor_id: ActorId,
    pub reason: String,
    pub student_wallet: WalletAddress,
    pub revoked_at: DateTime<Utc>,
}
