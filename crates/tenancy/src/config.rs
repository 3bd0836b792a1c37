//! Registry configuration.

use std::time::Duration;

/// Configuration for the tenant connection registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Deadline for opening a tenant store.
    pub connect_timeout: Duration,

    /// Deadline for the health-check round-trip.
    pub health_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }
}
