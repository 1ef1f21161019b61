//! Data model shared by every crate in the L2 client synchronizer.
//!
//! This crate is deliberately free of any I/O: it only defines the entities the synchronizer
//! reasons about (blocks, notes, tree roots) and their wire format, so that `l2_sync_node_client`
//! and `l2_sync_db` can depend on it without pulling in either side's transport concerns.

mod block;
mod note;
mod primitives;
pub mod wire;

pub use block::{
    BlockHeader, BlockLogs, EncryptedLog, EncryptedLogBundle, L2Block, L2BlockContext, Transaction,
};
pub use note::{CompleteAddress, DeferredNoteDao, NoteDao, NoteProcessorStats};
pub use primitives::{
    BlockNumber, ContractAddress, NoteHash, PartialAddress, PublicKey, Snapshot, SiloedNullifier,
    StorageSlot, TreeId, TreeRoot, TxHash,
};
