//! Ledger webhook payload.

use crate::{LedgerAssetId, SubmissionSignature, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger event kind. `NFT_`-prefixed names are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "MINT", alias = "NFT_MINT", alias = "COMPRESSED_NFT_MINT")]
    Mint,
    #[serde(rename = "BURN", alias = "NFT_BURN", alias = "COMPRESSED_NFT_BURN")]
    Burn,
    #[serde(
        rename = "TRANSFER",
        alias = "NFT_TRANSFER",
        alias = "COMPRESSED_NFT_TRANSFER"
    )]
    Transfer,
    #[serde(other)]
    Unknown,
}

/// Asset details carried by a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftData {
    pub mint: LedgerAssetId,
    #[serde(default)]
    pub owner: Option<WalletAddress>,
    #[serde(default, rename = "leafIndex")]
    pub leaf_index: Option<u64>,
}

/// Body of `POST /webhooks/ledger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Transaction signature of the ledger event.
    #[serde(default)]
    pub signature: Option<SubmissionSignature>,
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "nftData")]
    pub nft_data: Option<NftData>,
}

impl WebhookPayload {
    /// Parse a raw webhook body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Audit record of one authenticated webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub event_type: WebhookEventType,
    pub signature: Option<SubmissionSignature>,
    pub asset_id: Option<LedgerAssetId>,
    /// Raw body as received.
    pub payload: String,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    /// An unprocessed record for a verified, parsed delivery.
    pub fn received(payload: &WebhookPayload, raw_body: &[u8], now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: payload.event_type,
            signature: payload.signature.clone(),
            asset_id: payload.nft_data.as_ref().map(|nft| nft.mint.clone()),
            payload: String::from_utf8_lossy(raw_body).into_owned(),
            processed: false,
            received_at: now,
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mint_with_alias() {
        let body = br#"{"signature":"s1","type":"NFT_MINT","timestamp":1,"nftData":{"mint":"asset1","owner":"w1"}}"#;
        let payload = WebhookPayload::from_slice(body).unwrap();
        assert_eq!(payload.event_type, WebhookEventType::Mint);
        assert_eq!(payload.nft_data.unwrap().mint, LedgerAssetId::new("asset1"));
    }

    #[test]
    fn test_unknown_type_and_missing_nft_data() {
        let payload = WebhookPayload::from_slice(br#"{"type":"SWAP"}"#).unwrap();
        assert_eq!(payload.event_type, WebhookEventType::Unknown);
        assert!(payload.nft_data.is_none());
    }

    #[test]
    fn test_delivery_record_starts_unprocessed() {
        let body = br#"{"signature":"s1","type":"BURN","nftData":{"mint":"asset1"}}"#;
        let payload = WebhookPayload::from_slice(body).unwrap();
        let record = WebhookDelivery::received(&payload, body, Utc::now());

        assert_eq!(record.event_type, WebhookEventType::Burn);
        assert_eq!(record.signature, Some(SubmissionSignature::new("s1")));
        assert_eq!(record.asset_id, Some(LedgerAssetId::new("asset1")));
        assert_eq!(record.payload.as_bytes(), body);
        assert!(!record.processed);
        assert!(record.processed_at.is_none());
    }

    #[test]
    fn test_malformed_body_is_error() {
        assert!(WebhookPayload::from_slice(b"{not json").is_err());
        assert!(WebhookPayload::from_slice(br#"{"signature":"s"}"#).is_err());
    }
}
