use crate::primitives::{
    ContractAddress, NoteHash, PartialAddress, PublicKey, SiloedNullifier, StorageSlot, TxHash,
};

/// A decrypted and fully interpreted private note, ready for persistence.
///
/// Created only after a successful decrypt + "compute note hash and nullifier" round-trip;
/// deleted once its `siloed_nullifier` is observed in the node's nullifier tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteDao {
    pub public_key: PublicKey,
    pub contract_address: ContractAddress,
    pub storage_slot: StorageSlot,
    pub note: Vec<u8>,
    pub note_hash: NoteHash,
    pub siloed_nullifier: SiloedNullifier,
    pub tx_hash: TxHash,
    pub leaf_index: u64,
}

/// A note that decrypted successfully but whose contract code was not yet known locally.
///
/// Carries enough of the originating transaction's context (`new_commitments`, `tx_nullifier`,
/// `data_start_index_for_tx`) to be re-interpreted later via
/// [`crate::note::NoteDao`]-producing decode, once the contract registers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredNoteDao {
    pub public_key: PublicKey,
    pub note: Vec<u8>,
    pub contract_address: ContractAddress,
    pub storage_slot: StorageSlot,
    pub tx_hash: TxHash,
    pub tx_nullifier: SiloedNullifier,
    pub new_commitments: Vec<NoteHash>,
    pub data_start_index_for_tx: u64,
}

/// The public information required to nullify/derive from a registered account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompleteAddress {
    pub public_key: PublicKey,
    pub partial_address: PartialAddress,
}

/// Per-tick counters for a single `NoteProcessor`, surfaced through
/// `note-processor-caught-up` events and `getSyncStatus`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoteProcessorStats {
    /// Encrypted logs addressed to this account that were attempted.
    pub seen: u64,
    /// Logs that decrypted successfully.
    pub decrypted: u64,
    /// Decrypted notes whose contract code was not yet locally available.
    pub deferred: u64,
    /// Decrypted notes that failed interpretation, were spoofed, or had a mismatched note hash.
    pub failed: u64,
}

impl NoteProcessorStats {
    pub fn merge(&mut self, other: NoteProcessorStats) {
        self.seen += other.seen;
        self.decrypted += other.decrypted;
        self.deferred += other.deferred;
        self.failed += other.failed;
    }
}
