use async_trait::async_trait;
use l2_sync_types::{BlockHeader, BlockLogs, BlockNumber, L2Block, Snapshot, TreeId};

use crate::error::NodeClientError;

/// Which half of a block's logs to fetch: the synchronizer only ever decrypts `Encrypted`
/// payloads, but polls `Unencrypted` too as a second, independent progress signal (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    Encrypted,
    Unencrypted,
}

/// The remote node's external contract, as consumed by the synchronizer's core loop. Both the
/// HTTP and in-memory implementations must honor the node's ordering guarantee: `get_blocks` and
/// `get_logs` return entries in ascending block-number order with no gaps in the prefix covered.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// The latest block height known to the node.
    async fn get_block_number(&self) -> Result<BlockNumber, NodeClientError>;

    /// The node's current tree roots.
    async fn get_block_header(&self) -> Result<BlockHeader, NodeClientError>;

    /// Blocks in `[from, from + limit)` that exist; may return fewer than `limit`.
    async fn get_blocks(&self, from: BlockNumber, limit: u32) -> Result<Vec<L2Block>, NodeClientError>;

    /// Log bundles in `[from, from + limit)`, for the given kind; may return fewer than `limit`.
    async fn get_logs(
        &self,
        from: BlockNumber,
        limit: u32,
        kind: LogKind,
    ) -> Result<Vec<BlockLogs>, NodeClientError>;

    /// The leaf index of `leaf` within `tree_id` as of `snapshot`, if it has been inserted.
    /// `leaf` is a raw 32-byte tree element: a note hash for the note-hash tree, a siloed
    /// nullifier for the nullifier tree, and so on depending on `tree_id`.
    async fn find_leaf_index(
        &self,
        snapshot: Snapshot,
        tree_id: TreeId,
        leaf: [u8; 32],
    ) -> Result<Option<u64>, NodeClientError>;
}
