//! Mint confirmation.
//!
//! Two paths deliver the same fact, "asset X now exists on the ledger":
//!
//! ```text
//!  POST /webhooks/ledger ─► WebhookHandler ──┐ Push
//!                                            ├──► ConfirmationIngress::apply_confirmation
//!  ReconciliationSweep ─► resolver ──────────┘ Pull
//! ```
//!
//! Both funnel into one idempotent apply step, so duplicate, reordered and
//! racing deliveries converge on the same state and publish
//! `CertificateMinted` once.

mod ingress;
mod sweep;
mod webhook;

#[cfg(test)]
mod test_fixture;

pub use ingress::{ApplyOutcome, ConfirmationIngress, ConfirmationOutcome};
pub use sweep::{ReconciliationReport, ReconciliationSweep, SweepConfig, UnresolvedCertificate};
pub use webhook::{WebhookDisposition, WebhookHandler, WebhookVerifier, SIGNATURE_HEADER};
