//! The top-level control loop: drives the global cursor forward, prioritizes per-account
//! catch-up over forward progress, and re-drives deferred notes when a contract registers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use l2_sync_db::Database;
use l2_sync_node_client::{LogKind, NodeClient};
use l2_sync_types::{
    BlockNumber, ContractAddress, L2BlockContext, PublicKey, TreeId, Snapshot,
};
use tokio::sync::RwLock;

use crate::note_interpreter::NoteInterpreter;
use crate::note_processor::NoteProcessor;
use crate::periodic_ticker::PeriodicTicker;
use crate::serial_queue::{SerialQueue, SerialQueueHandle};

#[derive(thiserror::Error, Debug)]
pub enum SynchronizerError {
    #[error("account is not registered")]
    UnregisteredAccount,
    #[error("account is registered as a note recipient but has no active note processor")]
    RecipientOnlyAccount,
    #[error("catch-up batch requested a non-positive limit")]
    NonPositiveLimit,
    #[error("catch-up fetch returned no blocks or logs while behind the global cursor")]
    EmptyCatchUpFetch,
    #[error(transparent)]
    Node(#[from] l2_sync_node_client::NodeClientError),
    #[error(transparent)]
    Database(#[from] l2_sync_db::DatabaseError),
    #[error(transparent)]
    NoteProcessor(#[from] crate::note_processor::NoteProcessorError),
    #[error("serial queue is no longer accepting work")]
    QueueClosed,
}

impl From<crate::serial_queue::SerialQueueClosed> for SynchronizerError {
    fn from(_: crate::serial_queue::SerialQueueClosed) -> Self {
        SynchronizerError::QueueClosed
    }
}

/// Point-in-time sync progress: the global cursor plus each account's `synced_to_block`.
#[derive(Clone, Debug, Default)]
pub struct SyncStatus {
    pub blocks: u64,
    pub notes: std::collections::HashMap<PublicKey, u64>,
}

struct SynchronizerState {
    active: Vec<Arc<NoteProcessor>>,
    catch_up: VecDeque<Arc<NoteProcessor>>,
    initial_sync_block_number: Option<BlockNumber>,
}

/// Composes the serial queue, ticker, node client, and database into the synchronizer's control
/// loop. Adapted from the original's single-fiber design: Rust has no equivalent to "only the
/// queue's worker ever touches this state," so the two processor lists and
/// `initial_sync_block_number` live behind an `RwLock` instead.
pub struct Synchronizer {
    node: Arc<dyn NodeClient>,
    db: Arc<dyn Database>,
    state: RwLock<SynchronizerState>,
    queue: SerialQueueHandle,
    ticker: PeriodicTicker,
    running: std::sync::atomic::AtomicBool,
    /// Distinguishes this synchronizer's spans/logs from a sibling's in a multi-instance
    /// deployment (e.g. one per registered account keystore). `None` renders as `"default"`.
    instance: Option<String>,
}

impl Synchronizer {
    pub fn new(node: Arc<dyn NodeClient>, db: Arc<dyn Database>, retry_interval: Duration) -> Arc<Self> {
        Self::new_with_instance(node, db, retry_interval, None)
    }

    pub fn new_with_instance(
        node: Arc<dyn NodeClient>,
        db: Arc<dyn Database>,
        retry_interval: Duration,
        instance: Option<String>,
    ) -> Arc<Self> {
        let (queue, handle) = SerialQueue::new();
        tokio::spawn(queue.run());
        Arc::new(Self {
            node,
            db,
            state: RwLock::new(SynchronizerState {
                active: Vec::new(),
                catch_up: VecDeque::new(),
                initial_sync_block_number: None,
            }),
            queue: handle,
            ticker: PeriodicTicker::new(retry_interval),
            running: std::sync::atomic::AtomicBool::new(false),
            instance,
        })
    }

    fn instance_label(&self) -> &str {
        self.instance.as_deref().unwrap_or("default")
    }

    /// Idempotent: submits `initial_sync`, awaits it, then starts the periodic driving loop.
    /// Calling `start` again while already running is a no-op.
    pub async fn start(self: &Arc<Self>, limit: u32) -> Result<(), SynchronizerError> {
        if self.ticker.is_running().await {
            return Ok(());
        }
        self.running.store(true, std::sync::atomic::Ordering::SeqCst);
        let this = self.clone();
        self.queue.submit(async move { this.initial_sync().await }).await??;

        let this = self.clone();
        self.ticker
            .start(move || {
                let this = this.clone();
                async move {
                    if let Err(err) = this.sync(limit).await {
                        tracing::warn!(error = %err, "synchronizer tick failed");
                    }
                }
            })
            .await;
        Ok(())
    }

    /// Stops the ticker first, then drains the serial queue. This ordering matters: a task
    /// (e.g. `reprocess_deferred_notes_for_contract`) submitted just before `stop()` is called
    /// must still run to completion; draining the queue before the ticker would let a live tick
    /// get silently abandoned instead.
    pub async fn stop(&self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        self.ticker.stop().await;
        let _ = self.queue.end().await;
    }

    async fn initial_sync(&self) -> Result<(), SynchronizerError> {
        let latest = self.node.get_block_number().await?;
        let header = self.node.get_block_header().await?;
        self.db.set_block_data(latest, header).await?;
        self.state.write().await.initial_sync_block_number = Some(latest);
        Ok(())
    }

    /// Submitted as the ticker's body. Drives `work`/`work_note_processor_catch_up` one
    /// iteration at a time, re-taking the queue between iterations so foreground tasks can
    /// interleave.
    #[tracing::instrument(name = "synchronizer", skip(self, limit), fields(instance = self.instance_label()))]
    async fn sync(self: &Arc<Self>, limit: u32) -> Result<(), SynchronizerError> {
        tracing::debug!(target: "synchronizer", instance = self.instance_label(), limit, "tick starting");
        loop {
            if !self.running.load(std::sync::atomic::Ordering::SeqCst) {
                return Ok(());
            }
            let has_catch_up = !self.state.read().await.catch_up.is_empty();
            let this = self.clone();
            let made_progress = if has_catch_up {
                self.queue
                    .submit(async move { this.work_note_processor_catch_up(limit).await })
                    .await?
            } else {
                let this2 = self.clone();
                self.queue.submit(async move { this2.work(limit).await }).await?
            }?;
            if !made_progress {
                return Ok(());
            }
        }
    }

    /// Forward mode: fetches the next window of logs and blocks, feeds every active processor,
    /// and advances the global cursor. Returns `Ok(false)` once there is nothing new to fetch, or
    /// whenever a transient node error is caught, logged, and treated as "no progress this
    /// tick." A `SynchronizerError::Database` is not transient (§7) and propagates instead.
    #[tracing::instrument(name = "synchronizer", skip(self, limit), fields(instance = self.instance_label()))]
    async fn work(&self, limit: u32) -> Result<bool, SynchronizerError> {
        match self.work_inner(limit).await {
            Ok(progressed) => Ok(progressed),
            Err(err @ SynchronizerError::Node(_)) => {
                tracing::warn!(target: "synchronizer", instance = self.instance_label(), error = %err, "work() failed; will retry next tick");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn work_inner(&self, limit: u32) -> Result<bool, SynchronizerError> {
        let from = match self.db.get_block_number().await? {
            Some(n) => n.next(),
            None => {
                let initial = self
                    .state
                    .read()
                    .await
                    .initial_sync_block_number
                    .unwrap_or(BlockNumber::new(0));
                initial.next()
            }
        };

        let enc_logs = self.node.get_logs(from, limit, LogKind::Encrypted).await?;
        if enc_logs.is_empty() {
            return Ok(false);
        }
        let un_logs = self.node.get_logs(from, limit, LogKind::Unencrypted).await?;
        if un_logs.is_empty() {
            return Ok(false);
        }
        let blocks = self.node.get_blocks(from, enc_logs.len() as u32).await?;
        if blocks.is_empty() {
            return Ok(false);
        }

        let n = blocks.len();
        let enc_logs = &enc_logs[..n];
        let initial_sync_block_number = self
            .state
            .read()
            .await
            .initial_sync_block_number
            .unwrap_or(BlockNumber::new(0));

        let mut contexts = Vec::with_capacity(n);
        let mut kept_logs = Vec::with_capacity(n);
        for (block, logs) in blocks.into_iter().zip(enc_logs.iter()) {
            if block.number < from {
                continue;
            }
            contexts.push(L2BlockContext::new(block));
            kept_logs.push(logs.clone());
        }
        if contexts.is_empty() {
            return Ok(false);
        }

        let last_block_number = contexts.last().unwrap().block_number;
        if last_block_number >= initial_sync_block_number {
            let header = self.node.get_block_header().await?;
            self.db.set_block_data(last_block_number, header).await?;
        }

        let active = self.state.read().await.active.clone();
        for processor in &active {
            processor.process(&contexts, &kept_logs).await?;
        }

        Ok(true)
    }

    /// Catch-up mode: advances the processor at the head of the catch-up queue, promoting it to
    /// active once it reaches the global cursor. Operates on the popped processor outside the
    /// lock so a slow fetch doesn't hold a write guard across awaits.
    #[tracing::instrument(name = "synchronizer", skip(self, limit), fields(instance = self.instance_label()))]
    async fn work_note_processor_catch_up(&self, limit: u32) -> Result<bool, SynchronizerError> {
        tracing::debug!(target: "synchronizer", instance = self.instance_label(), "catch-up tick starting");
        let processor = {
            let mut state = self.state.write().await;
            match state.catch_up.pop_front() {
                Some(p) => p,
                None => return Ok(false),
            }
        };

        match self.catch_up_one(&processor, limit).await {
            Ok(caught_up) => {
                if caught_up {
                    let duration_ms = processor
                        .take_catch_up_duration()
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0);
                    let db_size = self.db.estimate_size().await.unwrap_or(0);
                    let stats = processor.stats();
                    tracing::info!(
                        public_key = %l2_sync_common::short_hex(processor.public_key().as_bytes(), 4),
                        duration_ms,
                        db_size,
                        seen = stats.seen,
                        decrypted = stats.decrypted,
                        deferred = stats.deferred,
                        failed = stats.failed,
                        "note-processor-caught-up"
                    );
                    self.state.write().await.active.push(processor);
                } else {
                    self.state.write().await.catch_up.push_front(processor);
                }
                Ok(true)
            }
            Err(err) => {
                // restore the processor before propagating so its progress isn't silently lost.
                self.state.write().await.catch_up.push_front(processor);
                Err(err)
            }
        }
    }

    /// Returns `Ok(true)` if `processor` reached the global cursor during this call.
    async fn catch_up_one(
        &self,
        processor: &Arc<NoteProcessor>,
        limit: u32,
    ) -> Result<bool, SynchronizerError> {
        let to = match self.db.get_block_number().await? {
            Some(n) => n,
            None => return Ok(false),
        };
        if processor.synced_to_block() >= to {
            return Ok(true);
        }

        let from = processor.synced_to_block().next();
        let span = to.0.saturating_sub(from.0) + 1;
        let effective_limit = (limit as u64).min(span);
        if effective_limit < 1 {
            return Err(SynchronizerError::NonPositiveLimit);
        }

        let enc_logs = self
            .node
            .get_logs(from, effective_limit as u32, LogKind::Encrypted)
            .await?;
        let blocks = self
            .node
            .get_blocks(from, effective_limit as u32)
            .await?;
        if enc_logs.is_empty() || blocks.is_empty() {
            return Err(SynchronizerError::EmptyCatchUpFetch);
        }

        let n = blocks.len().min(enc_logs.len());
        let contexts: Vec<_> = blocks
            .into_iter()
            .take(n)
            .map(L2BlockContext::new)
            .collect();
        let kept_logs: Vec<_> = enc_logs.into_iter().take(n).collect();

        processor.process(&contexts, &kept_logs).await?;
        Ok(processor.synced_to_block() >= to)
    }

    /// Idempotent across both lists; never suspends beyond a brief lock acquisition.
    pub async fn add_account(
        &self,
        interpreter: Arc<dyn NoteInterpreter>,
        starting_block: BlockNumber,
    ) {
        let public_key = interpreter.public_key();
        let mut state = self.state.write().await;
        let already_known = state.active.iter().any(|p| p.public_key() == public_key)
            || state.catch_up.iter().any(|p| p.public_key() == public_key);
        if already_known {
            return;
        }
        let processor = Arc::new(NoteProcessor::new(
            interpreter,
            self.db.clone(),
            self.node.clone(),
            starting_block,
        ));
        processor.mark_catch_up_started();
        state.catch_up.push_back(processor);
    }

    pub async fn reprocess_deferred_notes_for_contract(
        self: &Arc<Self>,
        contract_address: ContractAddress,
    ) -> Result<(), SynchronizerError> {
        let this = self.clone();
        self.queue
            .submit(async move { this.reprocess_deferred_notes_inner(contract_address).await })
            .await??;
        Ok(())
    }

    async fn reprocess_deferred_notes_inner(
        &self,
        contract_address: ContractAddress,
    ) -> Result<(), SynchronizerError> {
        let deferred = self
            .db
            .get_deferred_notes_by_contract(contract_address)
            .await?;
        if deferred.is_empty() {
            return Ok(());
        }

        let active = self.state.read().await.active.clone();
        let mut new_notes = Vec::new();
        for processor in &active {
            let public_key = processor.public_key();
            let owned: Vec<_> = deferred
                .iter()
                .filter(|d| d.public_key == public_key)
                .cloned()
                .collect();
            if owned.is_empty() {
                continue;
            }
            new_notes.extend(processor.decode_deferred_notes(&owned).await);
        }

        self.db
            .remove_deferred_notes_by_contract(contract_address)
            .await?;
        if new_notes.is_empty() {
            return Ok(());
        }
        self.db.add_notes(new_notes.clone()).await?;

        let mut by_account: std::collections::HashMap<PublicKey, Vec<_>> = std::collections::HashMap::new();
        for note in &new_notes {
            by_account
                .entry(note.public_key)
                .or_default()
                .push(note.siloed_nullifier);
        }
        for (public_key, nullifiers) in by_account {
            let mut relevant = Vec::new();
            for nullifier in nullifiers {
                if self
                    .node
                    .find_leaf_index(Snapshot::Latest, TreeId::Nullifier, nullifier.0)
                    .await?
                    .is_some()
                {
                    relevant.push(nullifier);
                }
            }
            if !relevant.is_empty() {
                self.db.remove_nullified_notes(relevant, public_key).await?;
            }
        }

        Ok(())
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatus, SynchronizerError> {
        let blocks = self.db.get_block_number().await?.map(|n| n.0).unwrap_or(0);
        let state = self.state.read().await;
        let mut notes = std::collections::HashMap::new();
        for processor in state.active.iter().chain(state.catch_up.iter()) {
            notes.insert(processor.public_key(), processor.synced_to_block().0);
        }
        Ok(SyncStatus { blocks, notes })
    }

    pub async fn is_global_state_synchronized(&self) -> Result<bool, SynchronizerError> {
        let synced = self.db.get_block_number().await?;
        let latest = self.node.get_block_number().await?;
        Ok(synced.map(|n| n >= latest).unwrap_or(false))
    }

    /// Raises [`SynchronizerError::UnregisteredAccount`] if `public_key` has no registered
    /// `CompleteAddress` at all, and [`SynchronizerError::RecipientOnlyAccount`] if it is known
    /// only as a note recipient (registered in the database, e.g. by a wallet operation) but has
    /// never been given a `NoteProcessor` via `add_account`.
    pub async fn is_account_state_synchronized(
        &self,
        public_key: PublicKey,
    ) -> Result<bool, SynchronizerError> {
        let state = self.state.read().await;
        if let Some(processor) = state.active.iter().find(|p| p.public_key() == public_key) {
            return Ok(processor.is_synchronized().await?);
        }
        if state.catch_up.iter().any(|p| p.public_key() == public_key) {
            return Ok(false);
        }
        drop(state);
        if self.db.get_complete_address(public_key).await?.is_some() {
            return Err(SynchronizerError::RecipientOnlyAccount);
        }
        Err(SynchronizerError::UnregisteredAccount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use l2_sync_db::InMemoryDatabase;
    use l2_sync_node_client::InMemoryNodeClient;
    use l2_sync_types::{
        EncryptedLog, EncryptedLogBundle, L2Block, NoteHash, SiloedNullifier, StorageSlot, Transaction,
        TxHash,
    };
    use std::sync::atomic::AtomicBool;

    use crate::note_interpreter::{ComputedNote, DecryptedNote, InterpretError};
    use crate::note_processor::MAX_NOTE_HASHES_PER_TX;

    /// A stub per-account interpreter whose `has_contract_code` can be flipped after
    /// construction, to model a contract that registers locally after some notes from it have
    /// already been seen and deferred.
    struct StubInterpreter {
        public_key: PublicKey,
        contract_address: ContractAddress,
        has_code: AtomicBool,
    }

    #[async_trait]
    impl NoteInterpreter for StubInterpreter {
        fn public_key(&self) -> PublicKey {
            self.public_key
        }

        async fn decrypt_note(&self, ciphertext: &[u8]) -> Result<DecryptedNote, InterpretError> {
            Ok(DecryptedNote {
                contract_address: self.contract_address,
                storage_slot: StorageSlot([1u8; 32]),
                note: ciphertext.to_vec(),
            })
        }

        async fn has_contract_code(&self, _contract_address: ContractAddress) -> bool {
            self.has_code.load(std::sync::atomic::Ordering::SeqCst)
        }

        async fn compute_note_hash_and_nullifier(
            &self,
            note: &DecryptedNote,
        ) -> Result<ComputedNote, InterpretError> {
            let mut hash = [0u8; 32];
            hash[..note.note.len().min(32)].copy_from_slice(&note.note[..note.note.len().min(32)]);
            Ok(ComputedNote {
                note_hash: NoteHash(hash),
                siloed_nullifier: SiloedNullifier(hash),
            })
        }
    }

    /// Wraps an [`InMemoryNodeClient`] and fails the first `get_logs(.., Encrypted)` call with a
    /// simulated transient error, then delegates every subsequent call normally.
    struct FlakyNodeClient {
        inner: InMemoryNodeClient,
        failed_once: AtomicBool,
    }

    impl FlakyNodeClient {
        fn new(inner: InMemoryNodeClient) -> Self {
            Self {
                inner,
                failed_once: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl NodeClient for FlakyNodeClient {
        async fn get_block_number(&self) -> Result<BlockNumber, l2_sync_node_client::NodeClientError> {
            self.inner.get_block_number().await
        }

        async fn get_block_header(&self) -> Result<l2_sync_types::BlockHeader, l2_sync_node_client::NodeClientError> {
            self.inner.get_block_header().await
        }

        async fn get_blocks(
            &self,
            from: BlockNumber,
            limit: u32,
        ) -> Result<Vec<L2Block>, l2_sync_node_client::NodeClientError> {
            self.inner.get_blocks(from, limit).await
        }

        async fn get_logs(
            &self,
            from: BlockNumber,
            limit: u32,
            kind: LogKind,
        ) -> Result<Vec<l2_sync_types::BlockLogs>, l2_sync_node_client::NodeClientError> {
            if kind == LogKind::Encrypted && !self.failed_once.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(l2_sync_node_client::NodeClientError::MalformedResponse(
                    "simulated transient failure".into(),
                ));
            }
            self.inner.get_logs(from, limit, kind).await
        }

        async fn find_leaf_index(
            &self,
            snapshot: Snapshot,
            tree_id: TreeId,
            leaf: [u8; 32],
        ) -> Result<Option<u64>, l2_sync_node_client::NodeClientError> {
            self.inner.find_leaf_index(snapshot, tree_id, leaf).await
        }
    }

    fn empty_block(number: u64) -> L2Block {
        L2Block {
            number: BlockNumber::new(number),
            transactions: Vec::new(),
            data_start_index: 0,
        }
    }

    /// A block with a single transaction emitting one encrypted log whose plaintext commitment
    /// matches `commitment` (so `StubInterpreter::compute_note_hash_and_nullifier` agrees with
    /// the transaction's own `new_commitments`).
    fn block_with_one_note(number: u64, commitment: NoteHash) -> (L2Block, EncryptedLogBundle) {
        let tx = Transaction {
            tx_hash: TxHash([number as u8; 32]),
            tx_nullifier: SiloedNullifier([number as u8; 32]),
            new_commitments: vec![commitment],
        };
        let block = L2Block {
            number: BlockNumber::new(number),
            transactions: vec![tx],
            data_start_index: (number - 1) * MAX_NOTE_HASHES_PER_TX,
        };
        let logs = EncryptedLogBundle {
            logs: vec![EncryptedLog {
                tx_index: 0,
                log_index_in_tx: 0,
                ciphertext: vec![commitment.0[0]; 32],
            }],
        };
        (block, logs)
    }

    #[tokio::test]
    async fn add_account_is_idempotent() {
        let node = Arc::new(InMemoryNodeClient::new());
        let db = Arc::new(InMemoryDatabase::new());
        let sync = Synchronizer::new(node, db, Duration::from_secs(60));
        let public_key = PublicKey([1u8; 64]);
        let interpreter = Arc::new(StubInterpreter {
            public_key,
            contract_address: ContractAddress::zero(),
            has_code: AtomicBool::new(true),
        });

        sync.add_account(interpreter.clone(), BlockNumber::new(1)).await;
        sync.add_account(interpreter, BlockNumber::new(5)).await;

        let state = sync.state.read().await;
        assert_eq!(state.catch_up.len(), 1);
        // The second call must not have replaced the processor's starting block either.
        assert_eq!(state.catch_up[0].synced_to_block(), BlockNumber::new(0));
    }

    #[tokio::test]
    async fn is_account_state_synchronized_distinguishes_unregistered_and_recipient_only() {
        let node = Arc::new(InMemoryNodeClient::new());
        let db = Arc::new(InMemoryDatabase::new());
        let sync = Synchronizer::new(node, db.clone(), Duration::from_secs(60));
        let public_key = PublicKey([2u8; 64]);

        let err = sync.is_account_state_synchronized(public_key).await.unwrap_err();
        assert!(matches!(err, SynchronizerError::UnregisteredAccount));

        db.register_complete_address(
            public_key,
            l2_sync_types::CompleteAddress {
                public_key,
                partial_address: l2_sync_types::PartialAddress::zero(),
            },
        )
        .await;
        let err = sync.is_account_state_synchronized(public_key).await.unwrap_err();
        assert!(matches!(err, SynchronizerError::RecipientOnlyAccount));
    }

    /// S1: single account, linear sync over three pre-existing blocks.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn s1_single_account_linear_sync() {
        let node = InMemoryNodeClient::new();
        let public_key = PublicKey([3u8; 64]);
        let contract_address = ContractAddress([9u8; 32]);
        for n in 1..=3u64 {
            let (block, logs) = block_with_one_note(n, NoteHash([n as u8; 32]));
            node.push_block(block, logs, EncryptedLogBundle::default()).await;
        }

        let db = Arc::new(InMemoryDatabase::new());
        let sync = Synchronizer::new(Arc::new(node), db.clone(), Duration::from_millis(10));
        let interpreter = Arc::new(StubInterpreter {
            public_key,
            contract_address,
            has_code: AtomicBool::new(true),
        });
        sync.add_account(interpreter, BlockNumber::new(1)).await;
        sync.start(1).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let status = sync.get_sync_status().await.unwrap();
            if status.blocks == 3 && status.notes.get(&public_key) == Some(&3) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "sync did not converge in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sync.stop().await;

        let notes = db.notes().await;
        assert_eq!(notes.len(), 3);
        let mut leaf_indices: Vec<u64> = notes.iter().map(|n| n.leaf_index).collect();
        leaf_indices.sort_unstable();
        assert_eq!(leaf_indices, vec![0, MAX_NOTE_HASHES_PER_TX, 2 * MAX_NOTE_HASHES_PER_TX]);
    }

    /// S2: an account registered when the global cursor is already far ahead catches up before
    /// being promoted to active, without the synchronizer raising along the way.
    #[tokio::test]
    async fn s2_late_registered_account_catches_up_and_promotes() {
        let node = InMemoryNodeClient::new();
        for n in 1..=5u64 {
            node.push_block(empty_block(n), EncryptedLogBundle::default(), EncryptedLogBundle::default())
                .await;
        }
        let db = Arc::new(InMemoryDatabase::new());
        let sync = Synchronizer::new(Arc::new(node), db.clone(), Duration::from_secs(60));
        sync.initial_sync().await.unwrap();
        assert_eq!(db.get_block_number().await.unwrap(), Some(BlockNumber::new(5)));

        let public_key = PublicKey([4u8; 64]);
        let interpreter = Arc::new(StubInterpreter {
            public_key,
            contract_address: ContractAddress::zero(),
            has_code: AtomicBool::new(true),
        });
        sync.add_account(interpreter, BlockNumber::new(2)).await;

        let mut promoted = false;
        for _ in 0..10 {
            if sync.work_note_processor_catch_up(1).await.unwrap() {
                let state = sync.state.read().await;
                if state.active.iter().any(|p| p.public_key() == public_key) {
                    promoted = true;
                    break;
                }
            }
        }
        assert!(promoted, "processor was never promoted to active");

        let state = sync.state.read().await;
        assert!(state.catch_up.is_empty());
        let processor = state.active.iter().find(|p| p.public_key() == public_key).unwrap();
        assert_eq!(processor.synced_to_block(), BlockNumber::new(5));
        // Promotion consumes the catch-up timer; a second read reports nothing left to report.
        assert!(processor.take_catch_up_duration().is_none());
    }

    /// S3: a note whose contract isn't known locally is deferred, then resolved into exactly one
    /// persisted note once the contract registers.
    #[tokio::test]
    async fn s3_deferred_note_then_resolved() {
        let contract_address = ContractAddress([5u8; 32]);
        let public_key = PublicKey([6u8; 64]);
        let node = Arc::new(InMemoryNodeClient::new());
        let db = Arc::new(InMemoryDatabase::new());

        let interpreter = Arc::new(StubInterpreter {
            public_key,
            contract_address,
            has_code: AtomicBool::new(false),
        });
        let processor = Arc::new(NoteProcessor::new(
            interpreter.clone(),
            db.clone() as Arc<dyn Database>,
            node.clone() as Arc<dyn NodeClient>,
            BlockNumber::new(1),
        ));
        let (block, logs) = block_with_one_note(1, NoteHash([7u8; 32]));
        processor
            .process(
                &[l2_sync_types::L2BlockContext::new(block)],
                &[l2_sync_types::BlockLogs {
                    block_number: BlockNumber::new(1),
                    logs,
                }],
            )
            .await
            .unwrap();
        assert_eq!(processor.stats().deferred, 1);
        assert_eq!(
            db.get_deferred_notes_by_contract(contract_address).await.unwrap().len(),
            1
        );

        let sync = Synchronizer::new(node, db.clone(), Duration::from_secs(60));
        sync.state.write().await.active.push(processor);
        interpreter.has_code.store(true, std::sync::atomic::Ordering::SeqCst);

        sync.reprocess_deferred_notes_for_contract(contract_address)
            .await
            .unwrap();

        assert!(db
            .get_deferred_notes_by_contract(contract_address)
            .await
            .unwrap()
            .is_empty());
        let notes = db.notes().await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].public_key, public_key);
        assert_eq!(notes[0].contract_address, contract_address);
    }

    /// S4: same as S3, but the note's nullifier is already visible on-chain by the time
    /// reprocessing runs, so the decoded note is inserted and then immediately removed.
    #[tokio::test]
    async fn s4_deferred_note_then_nullified() {
        let contract_address = ContractAddress([8u8; 32]);
        let public_key = PublicKey([9u8; 64]);
        let node = Arc::new(InMemoryNodeClient::new());
        let db = Arc::new(InMemoryDatabase::new());

        let interpreter = Arc::new(StubInterpreter {
            public_key,
            contract_address,
            has_code: AtomicBool::new(false),
        });
        let processor = Arc::new(NoteProcessor::new(
            interpreter.clone(),
            db.clone() as Arc<dyn Database>,
            node.clone() as Arc<dyn NodeClient>,
            BlockNumber::new(1),
        ));
        let commitment = NoteHash([11u8; 32]);
        let (block, logs) = block_with_one_note(1, commitment);
        processor
            .process(
                &[l2_sync_types::L2BlockContext::new(block)],
                &[l2_sync_types::BlockLogs {
                    block_number: BlockNumber::new(1),
                    logs,
                }],
            )
            .await
            .unwrap();

        // The computed siloed nullifier equals the note-hash bytes under this stub interpreter
        // (see `StubInterpreter::compute_note_hash_and_nullifier`).
        node.set_leaf_index(TreeId::Nullifier, commitment.0, 42).await;

        let sync = Synchronizer::new(node.clone(), db.clone(), Duration::from_secs(60));
        sync.state.write().await.active.push(processor);
        interpreter.has_code.store(true, std::sync::atomic::Ordering::SeqCst);

        sync.reprocess_deferred_notes_for_contract(contract_address)
            .await
            .unwrap();

        assert!(db
            .get_deferred_notes_by_contract(contract_address)
            .await
            .unwrap()
            .is_empty());
        assert!(db.notes().await.is_empty());
    }

    /// S5: a transient node failure makes one tick return "no progress"; the following tick
    /// retries from the same cursor and succeeds, without ever advancing past the failed block.
    #[tokio::test]
    async fn s5_transient_node_failure_retries_from_the_same_cursor() {
        let inner = InMemoryNodeClient::new();
        inner
            .push_block(empty_block(1), EncryptedLogBundle::default(), EncryptedLogBundle::default())
            .await;
        let node = Arc::new(FlakyNodeClient::new(inner.clone()));
        let db = Arc::new(InMemoryDatabase::new());
        let sync = Synchronizer::new(node, db.clone(), Duration::from_secs(60));

        sync.initial_sync().await.unwrap();
        assert_eq!(db.get_block_number().await.unwrap(), Some(BlockNumber::new(1)));

        inner
            .push_block(empty_block(2), EncryptedLogBundle::default(), EncryptedLogBundle::default())
            .await;

        assert_eq!(sync.work(1).await.unwrap(), false, "the scripted failure should report no progress");
        assert_eq!(db.get_block_number().await.unwrap(), Some(BlockNumber::new(1)));

        assert_eq!(sync.work(1).await.unwrap(), true, "the retry should succeed");
        assert_eq!(db.get_block_number().await.unwrap(), Some(BlockNumber::new(2)));
    }

    /// S6: the node reports more logs than blocks; the synchronizer truncates to the shorter
    /// list and leaves the rest for the next tick instead of raising.
    #[tokio::test]
    async fn s6_mismatched_log_and_block_counts_truncates_to_the_shorter_list() {
        let node = InMemoryNodeClient::new();
        for n in 1..=3u64 {
            node.push_block(empty_block(n), EncryptedLogBundle::default(), EncryptedLogBundle::default())
                .await;
        }
        // Blocks 4 and 5 have logs indexed but no block body yet.
        for n in 4..=5u64 {
            node.push_logs_only(n, EncryptedLogBundle::default(), EncryptedLogBundle::default())
                .await;
        }

        let db = Arc::new(InMemoryDatabase::new());
        // Seed the cursor one below the first block so `work` treats all five as new, the way
        // `initial_sync` would if it ran before any of this data existed.
        let sync = Synchronizer::new(Arc::new(node), db.clone(), Duration::from_secs(60));
        db.set_block_data(BlockNumber::new(0), l2_sync_types::BlockHeader::default())
            .await
            .unwrap();

        assert_eq!(sync.work(5).await.unwrap(), true);
        // Only the 3 real blocks could be processed; the cursor stops there instead of skipping
        // ahead to the logs-only entries.
        assert_eq!(db.get_block_number().await.unwrap(), Some(BlockNumber::new(3)));

        // The next tick picks up exactly where the truncated one left off.
        assert_eq!(sync.work(5).await.unwrap(), false);
    }

    /// Graceful shutdown: a task submitted just before `stop()` still runs to completion, and
    /// `start()` called twice behaves the same as calling it once.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_drains_in_flight_work_and_start_is_idempotent() {
        let node = Arc::new(InMemoryNodeClient::new());
        let db = Arc::new(InMemoryDatabase::new());
        let sync = Synchronizer::new(node, db.clone(), Duration::from_millis(5));

        sync.start(1).await.unwrap();
        sync.start(1).await.unwrap(); // idempotent: must not spawn a second ticker loop.

        let contract_address = ContractAddress([0xAAu8; 32]);
        let sync2 = sync.clone();
        let submitted = tokio::spawn(async move {
            sync2.reprocess_deferred_notes_for_contract(contract_address).await
        });
        // Give the spawned submission a moment to reach the queue before `stop()` closes it, so
        // this exercises "drains in-flight work" rather than a race against the closed flag.
        tokio::time::sleep(Duration::from_millis(5)).await;

        sync.stop().await;
        submitted.await.unwrap().unwrap();

        // The queue is closed after `stop`; further submissions are refused.
        assert!(sync
            .reprocess_deferred_notes_for_contract(contract_address)
            .await
            .is_err());
    }
}
