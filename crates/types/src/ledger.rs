//! Ledger submission and indexer data transfer types.

use crate::{LedgerAssetId, SubmissionSignature, TreeId, WalletAddress};
use serde::{Deserialize, Serialize};

/// Mint instruction sent to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub metadata_uri: String,
    pub recipient: WalletAddress,
    pub tree: TreeId,
    pub authority: WalletAddress,
}

/// Burn instruction sent to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub asset_id: LedgerAssetId,
    pub owner: WalletAddress,
    pub tree: TreeId,
    pub authority: WalletAddress,
}

/// Ledger acknowledgement of a submitted instruction. Not final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub signature: SubmissionSignature,
}

/// Compression details of an indexed asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub tree: Option<TreeId>,
    #[serde(default)]
    pub leaf_id: Option<u64>,
}

/// One asset as returned by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedAsset {
    pub id: LedgerAssetId,
    #[serde(default)]
    pub burnt: bool,
    #[serde(default)]
    pub compression: Compression,
}

impl IndexedAsset {
    /// Whether this asset is a live, compressed credential in `tree` with a
    /// known leaf position.
    pub fn is_live_in(&self, tree: &TreeId) -> bool {
        !self.burnt
            && self.compression.compressed
            && self.compression.tree.as_ref() == Some(tree)
            && self.compression.leaf_id.is_some()
    }
}

/// A credential located on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAsset {
    pub asset_id: LedgerAssetId,
    pub leaf_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(tree: &str, burnt: bool, leaf: Option<u64>) -> IndexedAsset {
        IndexedAsset {
            id: LedgerAssetId::new("a"),
            burnt,
            compression: Compression {
                compressed: true,
                tree: Some(TreeId::new(tree)),
                leaf_id: leaf,
            },
        }
    }

    #[test]
    fn test_is_live_in_filters() {
        let tree = TreeId::new("T");
        assert!(asset("T", false, Some(3)).is_live_in(&tree));
        assert!(!asset("T", true, Some(3)).is_live_in(&tree));
        assert!(!asset("U", false, Some(3)).is_live_in(&tree));
        assert!(!asset("T", false, None).is_live_in(&tree));
    }

    #[test]
    fn test_indexed_asset_tolerates_missing_fields() {
        let parsed: IndexedAsset = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(!parsed.burnt);
        assert!(!parsed.compression.compressed);
    }
}
