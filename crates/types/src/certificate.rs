//! Tenant-scoped certificate rows and the status lattice.

use crate::{
    ActorId, CertificateId, LedgerAssetId, StudentId, SubmissionSignature, TreeId, WalletAddress,
};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Certificate lifecycle status.
///
/// Forward-only lattice:
///
/// ```text
/// PENDING ──► MINTED ──► REVOKED
///    │
///    └──────► FAILED
/// ```
///
/// FAILED and REVOKED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    /// Submitted to the ledger, not yet confirmed.
    Pending,
    /// Confirmed on the ledger; `ledger_asset_id` is set.
    Minted,
    /// Issuance abandoned.
    Failed,
    /// Burned on the ledger and recorded in the revocation index.
    Revoked,
}

impl CertificateStatus {
    /// Whether moving from `self` to `next` is allowed by the lattice.
    pub fn can_transition_to(self, next: CertificateStatus) -> bool {
        use CertificateStatus::*;
        matches!(
            (self, next),
            (Pending, Minted) | (Pending, Failed) | (Minted, Revoked)
        )
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, CertificateStatus::Failed | CertificateStatus::Revoked)
    }

    /// Whether this status blocks issuing the same credential again.
    pub fn blocks_reissue(self) -> bool {
        matches!(self, CertificateStatus::Pending | CertificateStatus::Minted)
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CertificateStatus::Pending => "PENDING",
            CertificateStatus::Minted => "MINTED",
            CertificateStatus::Failed => "FAILED",
            CertificateStatus::Revoked => "REVOKED",
        };
        f.write_str(name)
    }
}

/// A credential as recorded in the issuing tenant's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    /// Unique per tenant.
    pub certificate_number: String,
    pub student_id: StudentId,
    /// Student ledger address at issuance time.
    pub recipient: WalletAddress,
    pub badge_title: String,
    pub status: CertificateStatus,
    pub ledger_asset_id: Option<LedgerAssetId>,
    pub ledger_tree_id: TreeId,
    pub submission_signature: Option<SubmissionSignature>,
    pub leaf_index: Option<u64>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    pub metadata_uri: String,
    pub issued_by: ActorId,
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    /// Record ledger confirmation. Caller checks the lattice.
    pub fn confirm_minted(&mut self, asset_id: LedgerAssetId, leaf_index: Option<u64>) {
        self.status = CertificateStatus::Minted;
        self.ledger_asset_id = Some(asset_id);
        if leaf_index.is_some() {
            self.leaf_index = leaf_index;
        }
    }

    /// Record revocation. Caller checks the lattice.
    pub fn mark_revoked(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.status = CertificateStatus::Revoked;
        self.revoked = true;
        self.revoked_at = Some(at);
        self.revocation_reason = Some(reason.into());
    }

    /// Record abandonment of the issuance. Caller checks the lattice.
    pub fn mark_failed(&mut self) {
        self.status = CertificateStatus::Failed;
    }
}

/// Components of a certificate number: `{CODE}-{YEAR}-{DEPT}-{SEQ:05}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateNumber {
    routing_prefix: String,
    sequence: u64,
}

impl CertificateNumber {
    /// Maximum department segment length.
    pub const MAX_DEPARTMENT_LEN: usize = 10;

    /// Department segment used when the student has none.
    pub const DEFAULT_DEPARTMENT: &'static str = "GEN";

    /// Build the routing prefix for a tenant, year and department.
    pub fn routing_prefix(routing_code: &str, year: i32, department: Option<&str>) -> String {
        let dept: String = department
            .unwrap_or(Self::DEFAULT_DEPARTMENT)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .take(Self::MAX_DEPARTMENT_LEN)
            .collect();
        let dept = if dept.is_empty() {
            Self::DEFAULT_DEPARTMENT.to_string()
        } else {
            dept
        };
        format!("{}-{}-{}-", routing_code.to_ascii_uppercase(), year, dept)
    }

    /// Allocate the next number from an existing row count.
    ///
    /// Count-then-increment: two concurrent callers reading the same count
    /// produce the same number.
    pub fn next_after(
        routing_code: &str,
        issued_at: DateTime<Utc>,
        department: Option<&str>,
        existing_count: u64,
    ) -> Self {
        Self {
            routing_prefix: Self::routing_prefix(routing_code, issued_at.year(), department),
            sequence: existing_count + 1,
        }
    }

    /// The sequence component.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for CertificateNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:05}", self.routing_prefix, self.sequence)
    }
}
