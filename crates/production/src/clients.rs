//! HTTP ledger and indexer clients.

use async_trait::async_trait;
use certchain_core::{AssetIndexer, ExternalError, LedgerClient};
use certchain_types::{
    BurnRequest, IndexedAsset, MintRequest, SubmissionReceipt, WalletAddress,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// DAS page size for `getAssetsByOwner`.
const ASSETS_PAGE_LIMIT: u32 = 100;

/// Errors from the HTTP clients.
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Invalid endpoint {0}")]
    InvalidEndpoint(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<HttpClientError> for ExternalError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::Request(e) if e.is_timeout() => {
                ExternalError::Transport(format!("request timed out: {e}"))
            }
            HttpClientError::Request(e) if e.is_decode() => ExternalError::Malformed(e.to_string()),
            HttpClientError::Request(e) => ExternalError::Transport(e.to_string()),
            HttpClientError::InvalidEndpoint(e) => ExternalError::Transport(e),
            e @ HttpClientError::Status { .. } | e @ HttpClientError::Rpc { .. } => {
                ExternalError::Rejected(e.to_string())
            }
            HttpClientError::Decode(e) => ExternalError::Malformed(e),
        }
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, HttpClientError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()?)
}

fn parse_endpoint(raw: &str) -> Result<Url, HttpClientError> {
    Url::parse(raw).map_err(|e| HttpClientError::InvalidEndpoint(format!("{raw}: {e}")))
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, HttpClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpClientError::Status {
        status: status.as_u16(),
        body: body.chars().take(256).collect(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Ledger
// ═══════════════════════════════════════════════════════════════════════════

/// Ledger submission service reached over HTTP.
///
/// `POST {base}/v1/mint` and `POST {base}/v1/burn` with JSON bodies, both
/// answering `{"signature": "..."}`.
pub struct HttpLedgerClient {
    client: reqwest::Client,
    mint_url: Url,
    burn_url: Url,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HttpClientError> {
        let mut base = parse_endpoint(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| HttpClientError::InvalidEndpoint(format!("{base_url}: {e}")))
        };
        Ok(Self {
            client: build_client(timeout)?,
            mint_url: join("v1/mint")?,
            burn_url: join("v1/burn")?,
        })
    }

    async fn submit<T: Serialize>(
        &self,
        url: &Url,
        body: &T,
    ) -> Result<SubmissionReceipt, HttpClientError> {
        let response = self.client.post(url.clone()).json(body).send().await?;
        let receipt = error_for_status(response).await?.json().await?;
        Ok(receipt)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit_mint(&self, request: &MintRequest) -> Result<SubmissionReceipt, ExternalError> {
        let receipt = self.submit(&self.mint_url, request).await?;
        debug!(signature = %receipt.signature, recipient = %request.recipient, "Mint submitted");
        Ok(receipt)
    }

    async fn submit_burn(&self, request: &BurnRequest) -> Result<SubmissionReceipt, ExternalError> {
        let receipt = self.submit(&self.burn_url, request).await?;
        debug!(signature = %receipt.signature, asset_id = %request.asset_id, "Burn submitted");
        Ok(receipt)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Indexer
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'static str,
    params: &'a P,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetsByOwnerParams<'a> {
    owner_address: &'a str,
    page: u32,
    limit: u32,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct AssetPage {
    #[serde(default)]
    items: Vec<IndexedAsset>,
}

/// Indexer speaking the DAS JSON-RPC method `getAssetsByOwner`.
///
/// Only the first page (100 assets) is read.
pub struct DasIndexer {
    client: reqwest::Client,
    endpoint: Url,
}

impl DasIndexer {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, HttpClientError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
        })
    }

    async fn fetch(&self, owner: &WalletAddress) -> Result<Vec<IndexedAsset>, HttpClientError> {
        let params = AssetsByOwnerParams {
            owner_address: owner.as_str(),
            page: 1,
            limit: ASSETS_PAGE_LIMIT,
        };
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: "certchain",
            method: "getAssetsByOwner",
            params: &params,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;
        let body: RpcResponse<AssetPage> = error_for_status(response).await?.json().await?;
        match (body.result, body.error) {
            (_, Some(error)) => Err(HttpClientError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(page), None) => Ok(page.items),
            (None, None) => Err(HttpClientError::Decode("neither result nor error".into())),
        }
    }
}

#[async_trait]
impl AssetIndexer for DasIndexer {
    async fn assets_by_owner(
        &self,
        owner: &WalletAddress,
    ) -> Result<Vec<IndexedAsset>, ExternalError> {
        Ok(self.fetch(owner).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use certchain_types::{LedgerAssetId, TreeId};
    use serde_json::{json, Value};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn mint_request() -> MintRequest {
        MintRequest {
            metadata_uri: "https://meta/1".into(),
            recipient: WalletAddress::new("w1"),
            tree: TreeId::new("T"),
            authority: WalletAddress::new("auth"),
        }
    }

    #[tokio::test]
    async fn test_ledger_client_posts_camel_case_json() {
        let router = Router::new().route(
            "/v1/mint",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["metadataUri"], "https://meta/1");
                assert_eq!(body["recipient"], "w1");
                Json(json!({ "signature": "sig-remote" }))
            }),
        );
        let base = spawn(router).await;
        let client = HttpLedgerClient::new(&base, Duration::from_secs(5)).unwrap();

        let receipt = client.submit_mint(&mint_request()).await.unwrap();
        assert_eq!(receipt.signature.as_str(), "sig-remote");
    }

    #[tokio::test]
    async fn test_ledger_rejection_maps_to_rejected() {
        let router = Router::new().route(
            "/v1/burn",
            post(|| async { (axum::http::StatusCode::UNPROCESSABLE_ENTITY, "asset already burnt") }),
        );
        let base = spawn(router).await;
        let client = HttpLedgerClient::new(&base, Duration::from_secs(5)).unwrap();

        let err = client
            .submit_burn(&BurnRequest {
                asset_id: LedgerAssetId::new("A1"),
                owner: WalletAddress::new("w1"),
                tree: TreeId::new("T"),
                authority: WalletAddress::new("auth"),
            })
            .await
            .unwrap_err();

        match err {
            ExternalError::Rejected(message) => {
                assert!(message.contains("422"));
                assert!(message.contains("asset already burnt"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_das_indexer_reads_first_page() {
        let router = Router::new().route(
            "/",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["method"], "getAssetsByOwner");
                assert_eq!(body["params"]["ownerAddress"], "w1");
                assert_eq!(body["params"]["page"], 1);
                assert_eq!(body["params"]["limit"], 100);
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": "certchain",
                    "result": {
                        "total": 1,
                        "items": [{
                            "id": "A1",
                            "burnt": false,
                            "compression": { "compressed": true, "tree": "T", "leaf_id": 9 },
                            "content": { "json_uri": "ignored" }
                        }]
                    }
                }))
            }),
        );
        let endpoint = spawn(router).await;
        let indexer = DasIndexer::new(&endpoint, Duration::from_secs(5)).unwrap();

        let assets = indexer.assets_by_owner(&WalletAddress::new("w1")).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert!(assets[0].is_live_in(&TreeId::new("T")));
        assert_eq!(assets[0].compression.leaf_id, Some(9));
    }

    #[tokio::test]
    async fn test_das_rpc_error_is_rejected() {
        let router = Router::new().route(
            "/",
            post(|| async {
                Json(json!({ "jsonrpc": "2.0", "id": "certchain",
                    "error": { "code": -32602, "message": "invalid owner" } }))
            }),
        );
        let endpoint = spawn(router).await;
        let indexer = DasIndexer::new(&endpoint, Duration::from_secs(5)).unwrap();

        let err = indexer
            .assets_by_owner(&WalletAddress::new("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExternalError::Rejected(m) if m.contains("invalid owner")));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected_at_construction() {
        assert!(matches!(
            HttpLedgerClient::new("not a url", Duration::from_secs(1)),
            Err(HttpClientError::InvalidEndpoint(_))
        ));
    }
}
