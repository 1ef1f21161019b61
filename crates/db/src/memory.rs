use std::collections::HashMap;

use async_trait::async_trait;
use l2_sync_types::wire::ToBuffer;
use l2_sync_types::{
    BlockHeader, BlockNumber, CompleteAddress, ContractAddress, DeferredNoteDao, NoteDao, NoteHash,
    PublicKey, SiloedNullifier, StorageSlot, TxHash,
};
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::facade::Database;

/// The serialized size of a `NoteDao`: its fixed-width fields (`public_key`, `contract_address`,
/// `storage_slot`, `note_hash`, `siloed_nullifier`, `tx_hash`, `leaf_index`) plus the raw `note`
/// payload's actual length. `NoteDao` has no `ToBuffer` impl (only `DeferredNoteDao` does, per
/// §6's documented database wire format), so this mirrors that format's field widths by hand.
fn note_byte_size(note: &NoteDao) -> usize {
    PublicKey::LEN
        + ContractAddress::LEN
        + StorageSlot::LEN
        + note.note.len()
        + NoteHash::LEN
        + SiloedNullifier::LEN
        + TxHash::LEN
        + std::mem::size_of::<u64>()
}

#[derive(Default)]
struct State {
    block_number: Option<BlockNumber>,
    header: Option<BlockHeader>,
    notes: Vec<NoteDao>,
    deferred_notes: HashMap<ContractAddress, Vec<DeferredNoteDao>>,
    complete_addresses: HashMap<PublicKey, CompleteAddress>,
}

/// An in-memory `Database` behind a single `RwLock`, used by tests and as a reference
/// implementation; every method takes the lock for the duration of its operation, which is
/// what makes each call atomic with respect to the others.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    state: std::sync::Arc<RwLock<State>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap helper: there is no external-contract operation for registering an
    /// account's complete address, so callers seed it directly before exercising the facade.
    pub async fn register_complete_address(&self, public_key: PublicKey, address: CompleteAddress) {
        self.state
            .write()
            .await
            .complete_addresses
            .insert(public_key, address);
    }

    pub async fn notes(&self) -> Vec<NoteDao> {
        self.state.read().await.notes.clone()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn get_block_number(&self) -> Result<Option<BlockNumber>, DatabaseError> {
        Ok(self.state.read().await.block_number)
    }

    async fn set_block_data(
        &self,
        block_number: BlockNumber,
        header: BlockHeader,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state.block_number = Some(block_number);
        state.header = Some(header);
        tracing::debug!(%block_number, "global cursor advanced");
        Ok(())
    }

    async fn add_notes(&self, notes: Vec<NoteDao>) -> Result<(), DatabaseError> {
        self.state.write().await.notes.extend(notes);
        Ok(())
    }

    async fn remove_nullified_notes(
        &self,
        nullifiers: Vec<SiloedNullifier>,
        public_key: PublicKey,
    ) -> Result<Vec<NoteDao>, DatabaseError> {
        let mut state = self.state.write().await;
        let mut removed = Vec::new();
        state.notes.retain(|note| {
            let matches = note.public_key == public_key && nullifiers.contains(&note.siloed_nullifier);
            if matches {
                removed.push(note.clone());
            }
            !matches
        });
        if !removed.is_empty() {
            tracing::debug!(%public_key, removed = removed.len(), "pruned nullified notes");
        }
        Ok(removed)
    }

    async fn add_deferred_notes(&self, notes: Vec<DeferredNoteDao>) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        for note in notes {
            state
                .deferred_notes
                .entry(note.contract_address)
                .or_default()
                .push(note);
        }
        Ok(())
    }

    async fn get_deferred_notes_by_contract(
        &self,
        contract_address: ContractAddress,
    ) -> Result<Vec<DeferredNoteDao>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .deferred_notes
            .get(&contract_address)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_deferred_notes_by_contract(
        &self,
        contract_address: ContractAddress,
    ) -> Result<Vec<DeferredNoteDao>, DatabaseError> {
        Ok(self
            .state
            .write()
            .await
            .deferred_notes
            .remove(&contract_address)
            .unwrap_or_default())
    }

    async fn get_complete_address(
        &self,
        public_key: PublicKey,
    ) -> Result<Option<CompleteAddress>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .complete_addresses
            .get(&public_key)
            .cloned())
    }

    async fn estimate_size(&self) -> Result<u64, DatabaseError> {
        let state = self.state.read().await;
        let notes_bytes: usize = state.notes.iter().map(note_byte_size).sum();
        let deferred_bytes: usize = state
            .deferred_notes
            .values()
            .flat_map(|v| v.iter())
            .map(|d| d.to_buffer().len())
            .sum();
        Ok((notes_bytes + deferred_bytes) as u64)
    }
}
