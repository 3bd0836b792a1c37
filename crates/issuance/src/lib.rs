//! Certificate issuance.
//!
//! [`CertificateIssuanceCoordinator::issue`] submits the mint to the ledger
//! first and then writes a PENDING certificate and a SUBMITTED mint activity
//! entry. [`CertificateIssuanceCoordinator::abandon`] is the only path that
//! moves a certificate to FAILED.
//!
//! Certificate numbers are allocated count-then-increment. Two concurrent
//! issuances for one tenant can read the same count; the store's unique
//! constraint turns the loser into a conflict after its mint was already
//! submitted, and a FAILED audit entry carrying the submission signature is
//! left behind for operators.

mod config;
mod coordinator;
mod metadata;

pub use config::IssuanceConfig;
pub use coordinator::CertificateIssuanceCoordinator;
pub use metadata::{Attribute, CertificateMetadata};
