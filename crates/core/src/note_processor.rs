//! Per-account state machine: turns batches of `(block, encrypted-log-bundle)` pairs into
//! persisted notes, deferring what it can't yet interpret and advancing its own cursor strictly
//! forward.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use l2_sync_db::Database;
use l2_sync_node_client::NodeClient;
use l2_sync_types::{
    BlockLogs, BlockNumber, ContractAddress, DeferredNoteDao, NoteDao, NoteProcessorStats, PublicKey,
};

use crate::note_interpreter::{DecryptedNote, NoteInterpreter};

/// Upper bound on note-hash leaves a single transaction may insert. Mirrors the protocol
/// constant the node enforces when assigning `dataStartIndex`es to transactions within a block.
pub const MAX_NOTE_HASHES_PER_TX: u64 = 64;

#[derive(thiserror::Error, Debug)]
pub enum NoteProcessorError {
    #[error("process() called with no block contexts")]
    EmptyBatch,
    #[error("block/log batch length mismatch: {blocks} blocks, {logs} log bundles")]
    MismatchedBatch { blocks: usize, logs: usize },
    #[error(transparent)]
    Database(#[from] l2_sync_db::DatabaseError),
    #[error(transparent)]
    Node(#[from] l2_sync_node_client::NodeClientError),
}

/// Per-account cursor plus decryption capability. Owns its own `synced_to_block`; never reads or
/// writes another processor's state.
pub struct NoteProcessor {
    interpreter: Arc<dyn NoteInterpreter>,
    db: Arc<dyn Database>,
    node: Arc<dyn NodeClient>,
    synced_to_block: AtomicU64,
    stats: std::sync::Mutex<NoteProcessorStats>,
    /// Started when this processor is first placed on the synchronizer's catch-up list; read
    /// when it is promoted to active, to report `duration_ms` on the `note-processor-caught-up`
    /// event. `None` once read, so a processor re-added after removal (not currently possible,
    /// but kept defensive) doesn't report a stale duration.
    catch_up_started_at: std::sync::Mutex<Option<Instant>>,
}

impl NoteProcessor {
    /// `starting_block` is the first block this processor has not yet synced; its cursor starts
    /// one below that.
    pub fn new(
        interpreter: Arc<dyn NoteInterpreter>,
        db: Arc<dyn Database>,
        node: Arc<dyn NodeClient>,
        starting_block: BlockNumber,
    ) -> Self {
        let synced_to_block = starting_block.0.saturating_sub(1);
        Self {
            interpreter,
            db,
            node,
            synced_to_block: AtomicU64::new(synced_to_block),
            stats: std::sync::Mutex::new(NoteProcessorStats::default()),
            catch_up_started_at: std::sync::Mutex::new(None),
        }
    }

    /// Marks the moment this processor entered the synchronizer's catch-up list. Call once, at
    /// registration time; `take_catch_up_duration` reports the elapsed time since this call.
    pub fn mark_catch_up_started(&self) {
        *self.catch_up_started_at.lock().unwrap() = Some(Instant::now());
    }

    /// Returns the time elapsed since `mark_catch_up_started`, if it was ever called, and clears
    /// it so the duration is only reported once.
    pub fn take_catch_up_duration(&self) -> Option<std::time::Duration> {
        self.catch_up_started_at
            .lock()
            .unwrap()
            .take()
            .map(|start| start.elapsed())
    }

    pub fn public_key(&self) -> PublicKey {
        self.interpreter.public_key()
    }

    pub fn synced_to_block(&self) -> BlockNumber {
        BlockNumber::new(self.synced_to_block.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> NoteProcessorStats {
        *self.stats.lock().unwrap()
    }

    pub async fn is_synchronized(&self) -> Result<bool, NoteProcessorError> {
        let latest = self.node.get_block_number().await?;
        Ok(self.synced_to_block() >= latest)
    }

    /// Decrypts, interprets, and persists every block in `contexts`, in order. `encrypted_logs[i]`
    /// must correspond to `contexts[i]`. Advances `synced_to_block` one block at a time, after
    /// that block's writes commit; a database failure aborts the whole call and leaves the
    /// cursor at the last block that was successfully persisted.
    pub async fn process(
        &self,
        contexts: &[l2_sync_types::L2BlockContext],
        encrypted_logs: &[BlockLogs],
    ) -> Result<(), NoteProcessorError> {
        if contexts.is_empty() {
            return Err(NoteProcessorError::EmptyBatch);
        }
        if contexts.len() != encrypted_logs.len() {
            return Err(NoteProcessorError::MismatchedBatch {
                blocks: contexts.len(),
                logs: encrypted_logs.len(),
            });
        }

        for (ctx, logs) in contexts.iter().zip(encrypted_logs.iter()) {
            let mut new_notes = Vec::new();
            let mut deferred = Vec::new();

            for (tx_index, tx) in ctx.block.transactions.iter().enumerate() {
                let first_note_hash_index =
                    ctx.first_note_hash_index + (tx_index as u64) * MAX_NOTE_HASHES_PER_TX;

                for log in logs.logs.for_tx(tx_index as u32) {
                    let mut stats = self.stats.lock().unwrap();
                    stats.seen += 1;
                    drop(stats);

                    let decrypted = match self.interpreter.decrypt_note(&log.ciphertext).await {
                        Ok(note) => note,
                        Err(err) => {
                            tracing::debug!(
                                tx_hash = %tx.tx_hash,
                                error = %err,
                                "failed to decrypt log"
                            );
                            self.stats.lock().unwrap().failed += 1;
                            continue;
                        }
                    };
                    self.stats.lock().unwrap().decrypted += 1;

                    if !self
                        .interpreter
                        .has_contract_code(decrypted.contract_address)
                        .await
                    {
                        self.stats.lock().unwrap().deferred += 1;
                        deferred.push(defer(&decrypted, tx, first_note_hash_index, self.public_key()));
                        continue;
                    }

                    match self.interpreter.compute_note_hash_and_nullifier(&decrypted).await {
                        Ok(computed) => {
                            let position = tx
                                .new_commitments
                                .iter()
                                .position(|c| *c == computed.note_hash);
                            match position {
                                Some(j) => new_notes.push(NoteDao {
                                    public_key: self.public_key(),
                                    contract_address: decrypted.contract_address,
                                    storage_slot: decrypted.storage_slot,
                                    note: decrypted.note,
                                    note_hash: computed.note_hash,
                                    siloed_nullifier: computed.siloed_nullifier,
                                    tx_hash: tx.tx_hash,
                                    leaf_index: first_note_hash_index + j as u64,
                                }),
                                None => {
                                    tracing::debug!(
                                        tx_hash = %tx.tx_hash,
                                        "decrypted note's commitment not found among tx's new commitments; discarding"
                                    );
                                    self.stats.lock().unwrap().failed += 1;
                                }
                            }
                        }
                        Err(_) => {
                            self.stats.lock().unwrap().failed += 1;
                        }
                    }
                }
            }

            if !new_notes.is_empty() {
                self.db.add_notes(new_notes).await?;
            }
            if !deferred.is_empty() {
                self.db.add_deferred_notes(deferred).await?;
            }
            self.synced_to_block
                .store(ctx.block_number.0, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Re-derives notes from previously deferred entries now that their contract's code is
    /// available. Identical to `process`'s per-log interpretation step, minus the
    /// has-contract-code check. Entries that still fail to interpret are dropped.
    pub async fn decode_deferred_notes(&self, deferred: &[DeferredNoteDao]) -> Vec<NoteDao> {
        let mut out = Vec::new();
        for d in deferred {
            let decrypted = DecryptedNote {
                contract_address: d.contract_address,
                storage_slot: d.storage_slot,
                note: d.note.clone(),
            };
            let computed = match self.interpreter.compute_note_hash_and_nullifier(&decrypted).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            let position = d.new_commitments.iter().position(|c| *c == computed.note_hash);
            if let Some(j) = position {
                out.push(NoteDao {
                    public_key: d.public_key,
                    contract_address: d.contract_address,
                    storage_slot: d.storage_slot,
                    note: d.note.clone(),
                    note_hash: computed.note_hash,
                    siloed_nullifier: computed.siloed_nullifier,
                    tx_hash: d.tx_hash,
                    leaf_index: d.data_start_index_for_tx + j as u64,
                });
            }
        }
        out
    }
}

fn defer(
    decrypted: &DecryptedNote,
    tx: &l2_sync_types::Transaction,
    data_start_index_for_tx: u64,
    public_key: PublicKey,
) -> DeferredNoteDao {
    DeferredNoteDao {
        public_key,
        note: decrypted.note.clone(),
        contract_address: decrypted.contract_address,
        storage_slot: decrypted.storage_slot,
        tx_hash: tx.tx_hash,
        tx_nullifier: tx.tx_nullifier,
        new_commitments: tx.new_commitments.clone(),
        data_start_index_for_tx,
    }
}
