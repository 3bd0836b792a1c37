//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a string-backed identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the raw value.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Issuing institution identifier.
    TenantId,
    "Tenant"
);

string_id!(
    /// Student identifier inside a tenant store.
    StudentId,
    "Student"
);

string_id!(
    /// Administrator (or system actor) performing an operation.
    ActorId,
    "Actor"
);

string_id!(
    /// Asset id assigned by the ledger to a minted credential.
    LedgerAssetId,
    "Asset"
);

string_id!(
    /// Ledger tree a tenant mints into.
    TreeId,
    "Tree"
);

string_id!(
    /// Ledger address (wallet) of a student or authority.
    WalletAddress,
    "Wallet"
);

string_id!(
    /// Signature returned by the ledger for a submitted instruction.
    SubmissionSignature,
    "Sig"
);

/// Certificate identifier (tenant-scoped primary key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(pub Uuid);

impl CertificateId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({})", &self.0.simple().to_string()[..8])
    }
}
