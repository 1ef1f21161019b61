use std::collections::HashMap;

use async_trait::async_trait;
use l2_sync_types::{BlockHeader, BlockLogs, BlockNumber, EncryptedLogBundle, L2Block, Snapshot, TreeId};
use tokio::sync::RwLock;

use crate::client::{LogKind, NodeClient};
use crate::error::NodeClientError;

#[derive(Default)]
struct State {
    blocks: Vec<L2Block>,
    header: BlockHeader,
    encrypted_logs: HashMap<u64, EncryptedLogBundle>,
    unencrypted_logs: HashMap<u64, EncryptedLogBundle>,
    leaves: HashMap<(TreeId, u64), u64>,
}

/// An in-process node fake used by integration tests: the test harness appends blocks/logs
/// directly, and the synchronizer under test observes them through the regular `NodeClient`
/// interface exactly as it would a real node.
#[derive(Clone, Default)]
pub struct InMemoryNodeClient {
    state: std::sync::Arc<RwLock<State>>,
}

impl InMemoryNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_header(&self, header: BlockHeader) {
        self.state.write().await.header = header;
    }

    /// Appends a block and its (possibly empty) encrypted/unencrypted log bundles. Blocks must be
    /// appended in ascending order; the fake does not reorder them.
    pub async fn push_block(
        &self,
        block: L2Block,
        encrypted: EncryptedLogBundle,
        unencrypted: EncryptedLogBundle,
    ) {
        let mut state = self.state.write().await;
        let number = block.number.0;
        state.blocks.push(block);
        state.encrypted_logs.insert(number, encrypted);
        state.unencrypted_logs.insert(number, unencrypted);
    }

    pub async fn set_leaf_index(&self, tree_id: TreeId, leaf: [u8; 32], index: u64) {
        let mut state = self.state.write().await;
        let key = (tree_id, u64::from_le_bytes(leaf[..8].try_into().unwrap()));
        state.leaves.insert(key, index);
    }

    /// Seeds log bundles for `block_number` without a corresponding block, used to make
    /// `get_logs` and `get_blocks` disagree in length the way a real node's two independent RPCs
    /// can momentarily disagree once a block has logs indexed before its body is available.
    pub async fn push_logs_only(
        &self,
        block_number: u64,
        encrypted: EncryptedLogBundle,
        unencrypted: EncryptedLogBundle,
    ) {
        let mut state = self.state.write().await;
        state.encrypted_logs.insert(block_number, encrypted);
        state.unencrypted_logs.insert(block_number, unencrypted);
    }
}

#[async_trait]
impl NodeClient for InMemoryNodeClient {
    async fn get_block_number(&self) -> Result<BlockNumber, NodeClientError> {
        let state = self.state.read().await;
        Ok(state
            .blocks
            .last()
            .map(|b| b.number)
            .unwrap_or(BlockNumber::new(0)))
    }

    async fn get_block_header(&self) -> Result<BlockHeader, NodeClientError> {
        Ok(self.state.read().await.header.clone())
    }

    async fn get_blocks(&self, from: BlockNumber, limit: u32) -> Result<Vec<L2Block>, NodeClientError> {
        let state = self.state.read().await;
        Ok(state
            .blocks
            .iter()
            .filter(|b| b.number.0 >= from.0 && b.number.0 < from.0 + limit as u64)
            .cloned()
            .collect())
    }

    async fn get_logs(
        &self,
        from: BlockNumber,
        limit: u32,
        kind: LogKind,
    ) -> Result<Vec<BlockLogs>, NodeClientError> {
        let state = self.state.read().await;
        let source = match kind {
            LogKind::Encrypted => &state.encrypted_logs,
            LogKind::Unencrypted => &state.unencrypted_logs,
        };
        let mut out: Vec<BlockLogs> = source
            .iter()
            .filter(|(number, _)| **number >= from.0 && **number < from.0 + limit as u64)
            .map(|(number, logs)| BlockLogs {
                block_number: BlockNumber::new(*number),
                logs: logs.clone(),
            })
            .collect();
        out.sort_by_key(|l| l.block_number);
        Ok(out)
    }

    async fn find_leaf_index(
        &self,
        _snapshot: Snapshot,
        tree_id: TreeId,
        leaf: [u8; 32],
    ) -> Result<Option<u64>, NodeClientError> {
        let state = self.state.read().await;
        let key = (tree_id, u64::from_le_bytes(leaf[..8].try_into().unwrap()));
        Ok(state.leaves.get(&key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64) -> L2Block {
        L2Block {
            number: BlockNumber::new(number),
            transactions: Vec::new(),
            data_start_index: 0,
        }
    }

    #[tokio::test]
    async fn get_blocks_respects_the_requested_window() {
        let node = InMemoryNodeClient::new();
        for n in 1..=5 {
            node.push_block(block(n), EncryptedLogBundle::default(), EncryptedLogBundle::default())
                .await;
        }
        let fetched = node.get_blocks(BlockNumber::new(2), 2).await.unwrap();
        assert_eq!(
            fetched.iter().map(|b| b.number.0).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[tokio::test]
    async fn get_block_number_reports_the_latest_pushed_block() {
        let node = InMemoryNodeClient::new();
        assert_eq!(node.get_block_number().await.unwrap(), BlockNumber::new(0));
        node.push_block(block(1), EncryptedLogBundle::default(), EncryptedLogBundle::default())
            .await;
        node.push_block(block(2), EncryptedLogBundle::default(), EncryptedLogBundle::default())
            .await;
        assert_eq!(node.get_block_number().await.unwrap(), BlockNumber::new(2));
    }

    #[tokio::test]
    async fn find_leaf_index_returns_none_for_unknown_leaves() {
        let node = InMemoryNodeClient::new();
        let leaf = [9u8; 32];
        assert_eq!(
            node.find_leaf_index(Snapshot::Latest, TreeId::NoteHash, leaf)
                .await
                .unwrap(),
            None
        );
        node.set_leaf_index(TreeId::NoteHash, leaf, 7).await;
        assert_eq!(
            node.find_leaf_index(Snapshot::Latest, TreeId::NoteHash, leaf)
                .await
                .unwrap(),
            Some(7)
        );
    }
}
