use async_trait::async_trait;
use l2_sync_types::{
    BlockHeader, BlockNumber, CompleteAddress, ContractAddress, DeferredNoteDao, NoteDao,
    PublicKey, SiloedNullifier,
};

use crate::error::DatabaseError;

/// The synchronizer's local persistence contract. Every method is atomic with respect to every
/// other: callers never observe a partial write from a concurrent call.
#[async_trait]
pub trait Database: Send + Sync {
    /// The block number the global cursor last wrote data for, if any.
    async fn get_block_number(&self) -> Result<Option<BlockNumber>, DatabaseError>;

    /// Records the node's tree roots as of `block_number`, advancing the global cursor.
    async fn set_block_data(
        &self,
        block_number: BlockNumber,
        header: BlockHeader,
    ) -> Result<(), DatabaseError>;

    /// Persists newly decrypted, fully interpreted notes.
    async fn add_notes(&self, notes: Vec<NoteDao>) -> Result<(), DatabaseError>;

    /// Removes and returns every note owned by `public_key` whose nullifier appears in
    /// `nullifiers`.
    async fn remove_nullified_notes(
        &self,
        nullifiers: Vec<SiloedNullifier>,
        public_key: PublicKey,
    ) -> Result<Vec<NoteDao>, DatabaseError>;

    /// Persists notes whose owning contract's code was not locally available at decode time.
    async fn add_deferred_notes(&self, notes: Vec<DeferredNoteDao>) -> Result<(), DatabaseError>;

    /// All deferred notes currently stored for `contract_address`, without removing them.
    async fn get_deferred_notes_by_contract(
        &self,
        contract_address: ContractAddress,
    ) -> Result<Vec<DeferredNoteDao>, DatabaseError>;

    /// Removes and returns every deferred note stored for `contract_address`.
    async fn remove_deferred_notes_by_contract(
        &self,
        contract_address: ContractAddress,
    ) -> Result<Vec<DeferredNoteDao>, DatabaseError>;

    /// The registered complete address for `public_key`, if the account is known.
    async fn get_complete_address(
        &self,
        public_key: PublicKey,
    ) -> Result<Option<CompleteAddress>, DatabaseError>;

    /// Approximate on-disk size, in bytes. Observability only; never load-bearing for sync logic.
    async fn estimate_size(&self) -> Result<u64, DatabaseError>;
}
