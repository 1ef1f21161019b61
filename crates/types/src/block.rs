use serde::{Deserialize, Serialize};

use crate::primitives::{BlockNumber, NoteHash, SiloedNullifier, TreeRoot, TxHash};

/// Mirror of the remote node's latest tree roots, as maintained locally by the synchronizer.
///
/// Stored once per block number; downstream query/simulation components read this to get a
/// consistent view of the world at a given block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub note_hash_tree_root: TreeRoot,
    pub nullifier_tree_root: TreeRoot,
    pub contract_tree_root: TreeRoot,
    pub l1_to_l2_messages_tree_root: TreeRoot,
    pub archive_tree_root: TreeRoot,
    pub public_data_tree_root: TreeRoot,
    pub global_variables_hash: TreeRoot,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            note_hash_tree_root: TreeRoot::zero(),
            nullifier_tree_root: TreeRoot::zero(),
            contract_tree_root: TreeRoot::zero(),
            l1_to_l2_messages_tree_root: TreeRoot::zero(),
            archive_tree_root: TreeRoot::zero(),
            public_data_tree_root: TreeRoot::zero(),
            global_variables_hash: TreeRoot::zero(),
        }
    }
}

/// A single encrypted log payload emitted by a transaction, addressed to some recipient's
/// public key. Decryption is attempted by the note processor; this type only carries the
/// opaque ciphertext plus its on-chain coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedLog {
    pub tx_index: u32,
    pub log_index_in_tx: u32,
    #[serde(with = "crate::primitives::hex_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Flat list of encrypted logs for all transactions within one block, as returned by
/// `NodeClient::get_logs`. Logs are ordered by `(tx_index, log_index_in_tx)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedLogBundle {
    pub logs: Vec<EncryptedLog>,
}

impl EncryptedLogBundle {
    /// Logs belonging to transaction `tx_index`, in on-chain order.
    pub fn for_tx(&self, tx_index: u32) -> impl Iterator<Item = &EncryptedLog> {
        self.logs
            .iter()
            .filter(move |log| log.tx_index == tx_index)
    }
}

/// The encrypted-log bundle for one block, as returned by `NodeClient::get_logs`. Used for both
/// `ENCRYPTED` and `UNENCRYPTED` log kinds; the synchronizer treats unencrypted payloads as
/// opaque presence markers and never decrypts them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLogs {
    pub block_number: BlockNumber,
    pub logs: EncryptedLogBundle,
}

/// A single on-chain transaction, as relevant to note scanning: its hash, the nullifier it
/// consumed, and the note-hash commitments it inserted into the note-hash tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub tx_hash: TxHash,
    pub tx_nullifier: SiloedNullifier,
    pub new_commitments: Vec<NoteHash>,
}

/// An L2 block as seen by the synchronizer: its number, the transactions it contains, and the
/// position of its first note-hash leaf within the global note-hash tree (`data_start_index`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2Block {
    pub number: BlockNumber,
    pub transactions: Vec<Transaction>,
    /// Cumulative count of note-hash leaves inserted by all blocks strictly before this one.
    pub data_start_index: u64,
}

/// Transient per-batch wrapper around an `L2Block`, carrying the cumulative note-hash index
/// needed to compute persisted `leaf_index`es without re-deriving it from scratch per tx.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L2BlockContext {
    pub block: L2Block,
    pub block_number: BlockNumber,
    pub first_note_hash_index: u64,
}

impl L2BlockContext {
    pub fn new(block: L2Block) -> Self {
        let block_number = block.number;
        let first_note_hash_index = block.data_start_index;
        Self {
            block,
            block_number,
            first_note_hash_index,
        }
    }
}
