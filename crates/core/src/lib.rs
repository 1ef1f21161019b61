//! l2-sync-core
//!
//! The synchronizer control plane for a privacy-preserving L2 client: scans blocks emitted by a
//! remote node, decrypts and interprets encrypted logs into private notes on behalf of every
//! registered account, and keeps a local mirror of the node's tree roots consistent for
//! downstream query and simulation components.
//!
//! ## Overview
//!
//! - **SerialQueue**: serializes every database-touching operation, background ticks and
//!   foreground work alike, so at most one task ever mutates the database at a time.
//! - **PeriodicTicker**: drives the background sync loop at a fixed, cancellable cadence.
//! - **NoteProcessor**: per-account state machine that turns block/log batches into persisted
//!   notes, deferring what it can't yet interpret.
//! - **Synchronizer**: composes the above into the control loop — global cursor, per-account
//!   catch-up, and deferred-note reprocessing.
//!
//! ## Limitations
//!
//! - No historical re-sync of arbitrary ranges on demand.
//! - No multi-node failover; a single `NodeClient` is assumed reachable or transiently down.

pub mod note_interpreter;
pub mod note_processor;
pub mod observability;
pub mod periodic_ticker;
pub mod serial_queue;
pub mod synchronizer;

pub use note_interpreter::{ComputedNote, DecryptedNote, InterpretError, NoteInterpreter};
pub use note_processor::{NoteProcessor, NoteProcessorError, MAX_NOTE_HASHES_PER_TX};
pub use periodic_ticker::PeriodicTicker;
pub use serial_queue::{SerialQueue, SerialQueueClosed, SerialQueueHandle};
pub use synchronizer::{SyncStatus, Synchronizer, SynchronizerError};
