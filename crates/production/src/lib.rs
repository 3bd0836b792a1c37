//! Certchain node.
//!
//! Wires the coordinators to concrete collaborators and exposes them over
//! HTTP:
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /webhooks/ledger` | signed ledger webhooks (push confirmation) |
//! | `GET /health` | liveness and open tenant connections |
//! | `GET /metrics` | Prometheus text format |
//!
//! A [`SweepDriver`] runs the pull confirmation path on an interval.

mod clients;
pub mod config;
mod error;
mod metrics;
mod node;
pub mod server;
mod sweeper;
pub mod telemetry;

pub use clients::{DasIndexer, HttpClientError, HttpLedgerClient};
pub use config::{ConfigError, NodeConfig};
pub use error::WebhookHttpError;
pub use metrics::{MetricsError, NodeMetrics};
pub use node::{Node, NodeError};
pub use server::AppState;
pub use sweeper::SweepDriver;
