//! Error taxonomy shared by every coordinator.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the credential lifecycle.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad or undecryptable connection descriptor, missing key.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing ledger address, inactive student, malformed payload, tenant mismatch.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The ledger rejected a submit/burn or did not answer in time.
    #[error("Ledger submission failed: {0}")]
    LedgerSubmission(String),

    /// The resolver gave up without locating the asset.
    #[error("Confirmation timed out: {0}")]
    ConfirmationTimeout(String),

    /// Webhook signature did not verify.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// Duplicate identity, lost race, or invalid state for the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown tenant or certificate.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Map a failed conditional update: a stale prior state means another
    /// writer won and surfaces as [`CoreError::Conflict`].
    pub fn lost_race(err: StoreError, context: impl FnOnce() -> String) -> Self {
        match err {
            StoreError::StaleState(_) => CoreError::Conflict(context()),
            other => CoreError::Store(other),
        }
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors reported by tenant and audit stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A unique key already exists.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A conditional update found a different prior state.
    #[error("Stale state: {0}")]
    StaleState(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The handle has been closed.
    #[error("Store handle closed")]
    Closed,
}

/// Errors reported by external services (ledger, indexer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    /// The service answered with a rejection.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// No answer within the deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The answer could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Run an external call under a deadline.
pub async fn with_timeout<T, F>(deadline: Duration, call: F) -> Result<T, ExternalError>
where
    F: std::future::Future<Output = Result<T, ExternalError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ExternalError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts() {
        let err: CoreError = StoreError::Closed.into();
        assert!(matches!(err, CoreError::Store(StoreError::Closed)));
        assert_eq!(err.to_string(), "Store error: Store handle closed");
    }

    #[test]
    fn test_lost_race_maps_stale_state_only() {
        let conflict = CoreError::lost_race(StoreError::StaleState("x".into()), || "lost".into());
        assert!(matches!(conflict, CoreError::Conflict(ref m) if m == "lost"));

        let store = CoreError::lost_race(StoreError::Closed, || "lost".into());
        assert!(matches!(store, CoreError::Store(StoreError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<(), _> = with_timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(ExternalError::Timeout(Duration::from_secs(1))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async {
            Err::<(), _>(ExternalError::Rejected("nope".into()))
        })
        .await;
        assert_eq!(result, Err(ExternalError::Rejected("nope".into())));
    }
}
