//! Certificate revocation.
//!
//! ```text
//! load MINTED certificate ─► burn on ledger ─► MINTED → REVOKED ─► revocation index ─► event
//! ```
//!
//! The burn is irreversible and happens first. A crash after the burn and
//! before the index write leaves a burned asset whose certificate still reads
//! MINTED, or a REVOKED certificate missing from the index. Nothing repairs
//! this automatically; the ledger's BURN webhook flags the asset as burned
//! without a revocation record so operators can finish the job.

mod config;
mod coordinator;

pub use config::RevocationConfig;
pub use coordinator::RevocationCoordinator;
