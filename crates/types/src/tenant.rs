//! Tenant profile, students and issuance requests.

use crate::{ActorId, ConnectionDescriptor, StudentId, TenantId, TreeId, WalletAddress};
use serde::{Deserialize, Serialize};

/// Shared-store record describing an issuing institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub tenant_id: TenantId,
    /// Institution code used as the certificate-number prefix.
    pub routing_code: String,
    pub descriptor: ConnectionDescriptor,
    /// Ledger tree credentials are minted into.
    pub tree_id: TreeId,
    /// Ledger authority address signing mints and burns.
    pub authority: WalletAddress,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Student record in a tenant store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<WalletAddress>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Request to issue one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRequest {
    pub tenant_id: TenantId,
    pub student_id: StudentId,
    pub badge_title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub issued_by: ActorId,
}
