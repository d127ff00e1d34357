//! Resumable, cancellable bulk sweeps over a snapshotted document queue.
//!
//! - `state`: job kinds, persisted keys, queue snapshot and lease record
//! - `store`: the key-value store seam and its in-memory implementation
//! - `lease`: compare-and-swap lock with expiry
//! - `controller`: the step state machine

mod controller;
mod error;
mod lease;
mod state;
mod store;

pub use controller::{
    BulkJobController, BulkJobStatus, ControllerConfig, GenerationCallback, GenerationResult,
    StepReport, StepStatus, StopAck, STOPPED_PERCENTAGE,
};
pub use error::BulkError;
pub use lease::LeaseOutcome;
pub use state::{BulkJobState, JobKind, JobLease, StateKeys};
pub use store::{KeyValueStore, MemoryStore, StoreError};
