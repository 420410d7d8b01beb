//! Token-offset coordination.
//!
//! One short-lived worker per in-flight token looks the token's offset up in
//! the store, waits for a writer to push it when it is not there yet, answers
//! every subscriber once and exits. The coordinator owns the token to worker
//! mapping and reaps workers when they exit.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod worker;

pub use config::{CoordinatorConfig, DEFAULT_WORKER_TIMEOUT};
pub use coordinator::{OffsetCoordinator, OffsetReceiver};
pub use error::OffsetError;
pub use worker::{OffsetReply, OffsetResult, WorkerCommand, WorkerExit, WorkerState};
