//! Scripted asset indexer.

use async_trait::async_trait;
use certchain_core::{AssetIndexer, ExternalError};
use certchain_types::{IndexedAsset, LedgerAssetId, WalletAddress};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Indexer answering from a script first, then from recorded holdings.
///
/// Scripted answers model indexer lag: queue `Ok(vec![])` a few times before
/// the real holding shows up.
#[derive(Default)]
pub struct ScriptedIndexer {
    script: Mutex<VecDeque<Result<Vec<IndexedAsset>, ExternalError>>>,
    holdings: Mutex<HashMap<WalletAddress, Vec<IndexedAsset>>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl ScriptedIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: delay every query by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue the answer for the next query, whatever the owner.
    pub fn script(&self, answer: Result<Vec<IndexedAsset>, ExternalError>) {
        self.script.lock().push_back(answer);
    }

    /// Queue `n` empty answers.
    pub fn lag(&self, n: usize) {
        let mut script = self.script.lock();
        for _ in 0..n {
            script.push_back(Ok(Vec::new()));
        }
    }

    /// Record an asset held by `owner`.
    pub fn hold(&self, owner: &WalletAddress, asset: IndexedAsset) {
        self.holdings
            .lock()
            .entry(owner.clone())
            .or_default()
            .push(asset);
    }

    /// Mark a held asset burnt.
    pub fn burn(&self, owner: &WalletAddress, asset_id: &LedgerAssetId) {
        if let Some(assets) = self.holdings.lock().get_mut(owner) {
            for asset in assets.iter_mut().filter(|a| &a.id == asset_id) {
                asset.burnt = true;
            }
        }
    }

    /// Number of queries received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetIndexer for ScriptedIndexer {
    async fn assets_by_owner(
        &self,
        owner: &WalletAddress,
    ) -> Result<Vec<IndexedAsset>, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(answer) = self.script.lock().pop_front() {
            return answer;
        }
        Ok(self
            .holdings
            .lock()
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }
}
