//! Push path: ledger webhooks.

use crate::{ApplyOutcome, ConfirmationIngress};
use certchain_core::{ConfirmationEvent, CoreError, CoreResult};
use certchain_types::{LedgerAssetId, WebhookDelivery, WebhookEventType, WebhookPayload};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies webhook signatures against a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    keyed: HmacSha256,
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> CoreResult<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CoreError::Configuration("webhook secret is empty".into()));
        }
        let keyed = HmacSha256::new_from_slice(secret)
            .map_err(|e| CoreError::Configuration(format!("invalid webhook secret: {e}")))?;
        Ok(Self { keyed })
    }

    /// Hex signature for `body`. Used by senders and tests.
    pub fn sign(&self, body: &[u8]) -> String {
        hex::encode(self.mac(body).finalize().into_bytes())
    }

    /// Constant-time check of `header` (hex, optional `sha256=` prefix).
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> CoreResult<()> {
        let header = header.ok_or(CoreError::SignatureVerification)?;
        let provided = hex::decode(
            header
                .trim()
                .strip_prefix(SIGNATURE_PREFIX)
                .unwrap_or(header.trim()),
        )
        .map_err(|_| CoreError::SignatureVerification)?;

        let expected = self.mac(body).finalize().into_bytes();
        if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            Ok(())
        } else {
            Err(CoreError::SignatureVerification)
        }
    }

    fn mac(&self, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(body);
        mac
    }
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookVerifier(***)")
    }
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// A MINT went through the shared apply step.
    Mint(ApplyOutcome),
    /// A BURN matching the revocation index.
    RevocationAcknowledged { asset_id: LedgerAssetId },
    /// A BURN with no revocation record: revoked outside this system.
    ExternallyBurned { asset_id: LedgerAssetId },
    /// Credentials are non-transferable; logged only.
    TransferObserved { asset_id: LedgerAssetId },
    /// No asset data or an unhandled type.
    Ignored,
}

impl WebhookDisposition {
    /// Label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            WebhookDisposition::Mint(ApplyOutcome::Confirmed { .. }) => "confirmed",
            WebhookDisposition::Mint(ApplyOutcome::AlreadyConfirmed) => "duplicate",
            WebhookDisposition::Mint(_) => "unmatched",
            WebhookDisposition::RevocationAcknowledged { .. } => "revocation",
            WebhookDisposition::ExternallyBurned { .. } => "external_burn",
            WebhookDisposition::TransferObserved { .. } => "transfer",
            WebhookDisposition::Ignored => "ignored",
        }
    }
}

/// Verifies, parses and dispatches ledger webhooks.
pub struct WebhookHandler {
    ingress: Arc<ConfirmationIngress>,
    verifier: WebhookVerifier,
}

impl WebhookHandler {
    pub fn new(ingress: Arc<ConfirmationIngress>, verifier: WebhookVerifier) -> Self {
        Self { ingress, verifier }
    }

    /// Handle one delivery. Nothing is read or written before the signature
    /// verifies. Parsed deliveries are recorded, then marked processed once
    /// dispatch succeeds.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> CoreResult<WebhookDisposition> {
        if let Err(e) = self.verifier.verify(raw_body, signature_header) {
            warn!(bytes = raw_body.len(), "Rejected webhook with invalid signature");
            return Err(e);
        }
        let payload = WebhookPayload::from_slice(raw_body)
            .map_err(|e| CoreError::Validation(format!("malformed webhook payload: {e}")))?;

        let audit = self.ingress.registry().audit();
        let delivery = WebhookDelivery::received(&payload, raw_body, Utc::now());
        let delivery_id = delivery.id;
        audit.insert_webhook_delivery(delivery).await?;

        let disposition = self.dispatch(payload).await?;
        audit.mark_webhook_processed(delivery_id, Utc::now()).await?;
        debug!(delivery = %delivery_id, disposition = disposition.label(), "Webhook processed");
        Ok(disposition)
    }

    async fn dispatch(&self, payload: WebhookPayload) -> CoreResult<WebhookDisposition> {
        let Some(nft) = payload.nft_data.as_ref() else {
            debug!(event_type = ?payload.event_type, "Webhook without asset data acknowledged");
            return Ok(WebhookDisposition::Ignored);
        };
        let asset_id = nft.mint.clone();

        match payload.event_type {
            WebhookEventType::Mint => {
                let outcome = self.ingress.ingest(ConfirmationEvent::Push(payload)).await?;
                Ok(WebhookDisposition::Mint(outcome))
            }
            WebhookEventType::Burn => {
                let audit = self.ingress.registry().audit();
                if audit.find_revocation(&asset_id).await?.is_some() {
                    info!(asset_id = %asset_id, "Burn matches revocation index");
                    Ok(WebhookDisposition::RevocationAcknowledged { asset_id })
                } else {
                    warn!(asset_id = %asset_id, "Asset burned externally without a revocation record");
                    Ok(WebhookDisposition::ExternallyBurned { asset_id })
                }
            }
            WebhookEventType::Transfer => {
                warn!(
                    asset_id = %asset_id,
                    owner = ?nft.owner,
                    "Transfer observed for a non-transferable credential"
                );
                Ok(WebhookDisposition::TransferObserved { asset_id })
            }
            WebhookEventType::Unknown => {
                debug!(asset_id = %asset_id, "Unhandled webhook type acknowledged");
                Ok(WebhookDisposition::Ignored)
            }
        }
    }
}
