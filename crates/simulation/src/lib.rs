//! Deterministic, in-memory collaborators.
//!
//! Every collaborator trait of `certchain-core` has an implementation here.
//! They are used by the unit and scenario tests and by the standalone node,
//! which runs the full issuance/confirmation/revocation flow without any
//! external service.
//!
//! ```text
//! ┌──────────────────┐ mint/burn ┌──────────────────┐
//! │  ScriptedLedger  │──────────►│ ScriptedIndexer  │
//! └──────────────────┘  holdings └──────────────────┘
//!
//! ┌──────────────────┐  connect  ┌──────────────────┐
//! │ MemoryConnector  │──────────►│MemoryTenantStore │ (one per tenant)
//! └──────────────────┘           └──────────────────┘
//!
//! ┌──────────────────┐
//! │ MemoryAuditStore │ (shared)
//! └──────────────────┘
//! ```

mod audit_store;
mod connector;
mod indexer;
mod ledger;
mod tenant_store;

pub use audit_store::MemoryAuditStore;
pub use connector::MemoryConnector;
pub use indexer::ScriptedIndexer;
pub use ledger::ScriptedLedger;
pub use tenant_store::MemoryTenantStore;
