//! Domain data model for ledger-backed academic credentials.
//!
//! Three stores are involved and none of them share a transaction:
//!
//! - the tenant store holds [`Certificate`] and [`Student`] rows,
//! - the shared audit store holds [`MintActivityLogEntry`],
//!   [`RevocationIndexEntry`] and [`TenantProfile`] rows,
//! - the external ledger holds the minted assets themselves.

mod audit;
mod certificate;
mod descriptor;
mod identifiers;
mod ledger;
mod tenant;
mod webhook;

pub use audit::{AssetRef, MintActivityLogEntry, MintActivityStatus, RevocationIndexEntry};
pub use certificate::{Certificate, CertificateNumber, CertificateStatus};
pub use descriptor::{ConnectionDescriptor, ENCRYPTED_PREFIX};
pub use identifiers::{
    ActorId, CertificateId, LedgerAssetId, StudentId, SubmissionSignature, TenantId, TreeId,
    WalletAddress,
};
pub use ledger::{
    BurnRequest, Compression, IndexedAsset, MintRequest, ResolvedAsset, SubmissionReceipt,
};
pub use tenant::{IssuanceRequest, Student, TenantProfile};
pub use webhook::{NftData, WebhookDelivery, WebhookEventType, WebhookPayload};
