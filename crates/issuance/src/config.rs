//! Issuance configuration.

use std::time::Duration;

/// Configuration for the issuance coordinator.
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    /// Deadline for the ledger mint submission.
    pub submit_timeout: Duration,

    /// Base of content-addressed metadata URIs.
    pub metadata_base_uri: String,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(30),
            metadata_base_uri: "https://metadata.certchain.local/v1".to_string(),
        }
    }
}

impl IssuanceConfig {
    pub fn with_submit_timeout(mut self, submit_timeout: Duration) -> Self {
        self.submit_timeout = submit_timeout;
        self
    }

    pub fn with_metadata_base_uri(mut self, base: impl Into<String>) -> Self {
        self.metadata_base_uri = base.into();
        self
    }
}
