//! Ledger asset resolution.
//!
//! After a mint is submitted the ledger assigns the asset id asynchronously
//! and the indexer learns about it with some lag. [`LedgerAssetResolver`]
//! polls the indexer for the recipient's holdings with a fixed attempt bound
//! and a fixed delay between attempts.
//!
//! A full run can block for `max_attempts × retry_delay`; call it from
//! background reconciliation only, never inline on a request path.

use certchain_core::{with_timeout, AssetIndexer};
use certchain_types::{IndexedAsset, ResolvedAsset, TreeId, WalletAddress};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Number of indexer queries before giving up.
    pub max_attempts: u32,

    /// Delay between two attempts. No delay follows the final attempt.
    pub retry_delay: Duration,

    /// Deadline for a single indexer query.
    pub query_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
            query_timeout: Duration::from_secs(10),
        }
    }
}

impl ResolverConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }
}

/// Outcome of a resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedAsset),
    /// Every attempt came back empty, failed or timed out.
    NotFound { attempts: u32 },
}

impl Resolution {
    pub fn found(self) -> Option<ResolvedAsset> {
        match self {
            Resolution::Found(asset) => Some(asset),
            Resolution::NotFound { .. } => None,
        }
    }
}

/// Polls the indexer for a recipient's newest credential in a tree.
pub struct LedgerAssetResolver {
    indexer: Arc<dyn AssetIndexer>,
    config: ResolverConfig,
}

impl LedgerAssetResolver {
    pub fn new(indexer: Arc<dyn AssetIndexer>) -> Self {
        Self::with_config(indexer, ResolverConfig::default())
    }

    pub fn with_config(indexer: Arc<dyn AssetIndexer>, config: ResolverConfig) -> Self {
        Self { indexer, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Locate a live, compressed asset of `tree` held by `owner`.
    ///
    /// Never fails: exhaustion is reported as [`Resolution::NotFound`].
    pub async fn resolve(&self, owner: &WalletAddress, tree: &TreeId) -> Resolution {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match with_timeout(self.config.query_timeout, self.indexer.assets_by_owner(owner)).await
            {
                Ok(assets) => {
                    if let Some(resolved) = select(&assets, tree) {
                        info!(
                            owner = %owner,
                            asset_id = %resolved.asset_id,
                            leaf_index = resolved.leaf_index,
                            attempt,
                            "Resolved ledger asset"
                        );
                        return Resolution::Found(resolved);
                    }
                    debug!(owner = %owner, attempt, held = assets.len(), "No matching asset yet");
                }
                Err(e) => {
                    warn!(owner = %owner, attempt, error = %e, "Indexer query failed");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        warn!(owner = %owner, tree = %tree, attempts = max_attempts, "Asset not found after retries");
        Resolution::NotFound {
            attempts: max_attempts,
        }
    }
}

/// First live asset of `tree`, in indexer order.
fn select(assets: &[IndexedAsset], tree: &TreeId) -> Option<ResolvedAsset> {
    assets.iter().find(|a| a.is_live_in(tree)).and_then(|a| {
        Some(ResolvedAsset {
            asset_id: a.id.clone(),
            leaf_index: a.compression.leaf_id?,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::ExternalError;
    use certchain_simulation::ScriptedIndexer;
    use certchain_types::{Compression, LedgerAssetId};
    use tokio::time::Instant;
    use tracing_test::traced_test;

    fn asset(id: &str, tree: &str, leaf: u64, burnt: bool) -> IndexedAsset {
        IndexedAsset {
            id: LedgerAssetId::new(id),
            burnt,
            compression: Compression {
                compressed: true,
                tree: Some(TreeId::new(tree)),
                leaf_id: Some(leaf),
            },
        }
    }

    fn owner() -> WalletAddress {
        WalletAddress::new("w1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_empty_answers() {
        for k in 0..5u32 {
            let indexer = Arc::new(ScriptedIndexer::new());
            indexer.lag(k as usize);
            indexer.hold(&owner(), asset("asset1", "T", 7, false));
            let resolver = LedgerAssetResolver::new(indexer.clone());

            let start = Instant::now();
            let resolution = resolver.resolve(&owner(), &TreeId::new("T")).await;

            assert_eq!(
                resolution,
                Resolution::Found(ResolvedAsset {
                    asset_id: LedgerAssetId::new("asset1"),
                    leaf_index: 7,
                })
            );
            assert_eq!(indexer.calls(), k as usize + 1);
            assert_eq!(start.elapsed(), Duration::from_secs(2) * k);
        }
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_exhaustion_returns_not_found_without_trailing_delay() {
        let indexer = Arc::new(ScriptedIndexer::new());
        let resolver = LedgerAssetResolver::new(indexer.clone());

        let start = Instant::now();
        let resolution = resolver.resolve(&owner(), &TreeId::new("T")).await;

        assert_eq!(resolution, Resolution::NotFound { attempts: 5 });
        assert_eq!(indexer.calls(), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(8));
        assert!(logs_contain("Asset not found after retries"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_errors_and_timeouts_are_retried() {
        let indexer = Arc::new(ScriptedIndexer::new());
        indexer.script(Err(ExternalError::Transport("connection reset".into())));
        indexer.hold(&owner(), asset("asset1", "T", 1, false));
        let resolver = LedgerAssetResolver::new(indexer.clone());
        assert!(resolver.resolve(&owner(), &TreeId::new("T")).await.found().is_some());
        assert_eq!(indexer.calls(), 2);
        assert!(logs_contain("Indexer query failed"));

        let slow = Arc::new(ScriptedIndexer::new().with_latency(Duration::from_secs(30)));
        slow.hold(&owner(), asset("asset1", "T", 1, false));
        let config = ResolverConfig::default()
            .with_max_attempts(2)
            .with_query_timeout(Duration::from_secs(1));
        let resolver = LedgerAssetResolver::with_config(slow.clone(), config);
        assert_eq!(
            resolver.resolve(&owner(), &TreeId::new("T")).await,
            Resolution::NotFound { attempts: 2 }
        );
        assert_eq!(slow.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_burnt_and_foreign_trees_then_takes_first() {
        let indexer = Arc::new(ScriptedIndexer::new());
        indexer.hold(&owner(), asset("burnt", "T", 1, true));
        indexer.hold(&owner(), asset("other-tree", "U", 2, false));
        indexer.hold(&owner(), asset("first", "T", 3, false));
        indexer.hold(&owner(), asset("second", "T", 4, false));
        let resolver = LedgerAssetResolver::new(indexer);

        let found = resolver
            .resolve(&owner(), &TreeId::new("T"))
            .await
            .found()
            .unwrap();
        assert_eq!(found.asset_id, LedgerAssetId::new("first"));
        assert_eq!(found.leaf_index, 3);
    }
}
