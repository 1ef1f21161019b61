//! The per-account decryption and note-commitment capability injected into every
//! [`crate::note_processor::NoteProcessor`]. Decryption keys and contract ABIs never need to
//! cross the synchronizer boundary; only this trait does.

use async_trait::async_trait;
use l2_sync_types::{ContractAddress, NoteHash, PublicKey, SiloedNullifier, StorageSlot};

#[derive(thiserror::Error, Debug)]
pub enum InterpretError {
    #[error("note did not decrypt under this account's key")]
    NotAddressed,
    #[error("contract code required to interpret this note is not available locally")]
    ContractUnavailable,
    #[error("note failed interpretation")]
    Malformed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A note that decrypted successfully, before its hash and nullifier have been recomputed and
/// checked against the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedNote {
    pub contract_address: ContractAddress,
    pub storage_slot: StorageSlot,
    pub note: Vec<u8>,
}

/// The note-hash/nullifier pair an account's interpreter derives from a decrypted note's plaintext
/// contents, to be checked against the commitments a transaction actually inserted on-chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedNote {
    pub note_hash: NoteHash,
    pub siloed_nullifier: SiloedNullifier,
}

/// Per-account decryption and note-commitment capability. A real implementation wraps the
/// account's viewing key and a contract-ABI registry; [`crate::note_processor::NoteProcessor`]
/// never sees either directly.
#[async_trait]
pub trait NoteInterpreter: Send + Sync {
    fn public_key(&self) -> PublicKey;

    /// Attempts to decrypt `ciphertext` under this account's viewing key.
    async fn decrypt_note(&self, ciphertext: &[u8]) -> Result<DecryptedNote, InterpretError>;

    /// Whether `contract_address`'s ABI is locally available for note-hash/nullifier derivation.
    async fn has_contract_code(&self, contract_address: ContractAddress) -> bool;

    /// Recomputes the note hash and siloed nullifier a decrypted note's plaintext should produce,
    /// given the contract's ABI. Returns [`InterpretError::ContractUnavailable`] if the contract's
    /// code is not locally known, and [`InterpretError::Malformed`] if the note's contents don't
    /// parse under the contract's note layout.
    async fn compute_note_hash_and_nullifier(
        &self,
        note: &DecryptedNote,
    ) -> Result<ComputedNote, InterpretError>;
}
