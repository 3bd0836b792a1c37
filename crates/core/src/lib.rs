//! Core abstractions for credential issuance and reconciliation.
//!
//! - [`CoreError`], [`StoreError`], [`ExternalError`]: the error taxonomy
//! - [`TenantStore`], [`AuditStore`], [`LedgerClient`], [`AssetIndexer`],
//!   [`TenantConnector`], [`NotificationSink`]: collaborator seams
//! - [`DomainEvent`], [`ConfirmationEvent`]: what flows between components

mod error;
mod event;
mod traits;

pub use error::{with_timeout, CoreError, CoreResult, ExternalError, StoreError};
pub use event::{ConfirmationEvent, DomainEvent, ReconciliationResult};
pub use traits::{
    AssetIndexer, AuditStore, LedgerClient, NotificationSink, NullSink, TenantConnector,
    TenantStore,
};
