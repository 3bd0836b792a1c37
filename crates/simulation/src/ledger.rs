//! Scripted ledger.

use crate::ScriptedIndexer;
use async_trait::async_trait;
use certchain_core::{ExternalError, LedgerClient};
use certchain_types::{
    BurnRequest, Compression, IndexedAsset, LedgerAssetId, MintRequest, SubmissionReceipt,
    SubmissionSignature,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ledger whose answers can be scripted per call.
///
/// Unscripted calls succeed with a fresh signature. When linked to a
/// [`ScriptedIndexer`], successful mints become visible as holdings of the
/// recipient and burns mark them burnt, so the pair behaves like a ledger
/// with an instantly-consistent indexer.
#[derive(Default)]
pub struct ScriptedLedger {
    mint_script: Mutex<VecDeque<Result<(), ExternalError>>>,
    burn_script: Mutex<VecDeque<Result<(), ExternalError>>>,
    mints: Mutex<Vec<MintRequest>>,
    burns: Mutex<Vec<BurnRequest>>,
    sequence: AtomicU64,
    latency: Option<Duration>,
    indexer: Option<Arc<ScriptedIndexer>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: delay every submission by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Builder: publish minted assets to `indexer`.
    pub fn with_indexer(mut self, indexer: Arc<ScriptedIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Queue an outcome for the next unanswered mint.
    pub fn script_mint(&self, outcome: Result<(), ExternalError>) {
        self.mint_script.lock().push_back(outcome);
    }

    /// Queue an outcome for the next unanswered burn.
    pub fn script_burn(&self, outcome: Result<(), ExternalError>) {
        self.burn_script.lock().push_back(outcome);
    }

    /// Mint requests that were accepted.
    pub fn mints(&self) -> Vec<MintRequest> {
        self.mints.lock().clone()
    }

    /// Burn requests that were accepted.
    pub fn burns(&self) -> Vec<BurnRequest> {
        self.burns.lock().clone()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn submit_mint(&self, request: &MintRequest) -> Result<SubmissionReceipt, ExternalError> {
        self.delay().await;
        if let Some(outcome) = self.mint_script.lock().pop_front() {
            outcome?;
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.mints.lock().push(request.clone());
        if let Some(indexer) = &self.indexer {
            indexer.hold(
                &request.recipient,
                IndexedAsset {
                    id: LedgerAssetId::new(format!("asset-{n}")),
                    burnt: false,
                    compression: Compression {
                        compressed: true,
                        tree: Some(request.tree.clone()),
                        leaf_id: Some(n - 1),
                    },
                },
            );
        }
        Ok(SubmissionReceipt {
            signature: SubmissionSignature::new(format!("mint-sig-{n}")),
        })
    }

    async fn submit_burn(&self, request: &BurnRequest) -> Result<SubmissionReceipt, ExternalError> {
        self.delay().await;
        if let Some(outcome) = self.burn_script.lock().pop_front() {
            outcome?;
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.burns.lock().push(request.clone());
        if let Some(indexer) = &self.indexer {
            indexer.burn(&request.owner, &request.asset_id);
        }
        Ok(SubmissionReceipt {
            signature: SubmissionSignature::new(format!("burn-sig-{n}")),
        })
    }
}
