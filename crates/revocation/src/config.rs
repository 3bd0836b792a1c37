//! Revocation configuration.

use std::time::Duration;

/// Configuration for the revocation coordinator.
#[derive(Debug, Clone)]
pub struct RevocationConfig {
    /// Deadline for the ledger burn submission.
    pub burn_timeout: Duration,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            burn_timeout: Duration::from_secs(30),
        }
    }
}

impl RevocationConfig {
    pub fn with_burn_timeout(mut self, burn_timeout: Duration) -> Self {
        self.burn_timeout = burn_timeout;
        self
    }
}
