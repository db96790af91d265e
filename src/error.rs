//! Error types for token-ring
//!
//! This module defines the error hierarchy for a ring run:
//! - Configuration errors (rejected before any worker exists)
//! - Worker errors (spawn failures, stalled waits, broken links)
//! - Liveness failures observed by the coordinator
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Keep liveness failures distinguishable from a normal win
//! - Map every fatal error to a stable process exit code

use crate::ring::{WorkerId, WorkerState};
use std::time::Duration;
use thiserror::Error;

/// Exit code for a declared winner
pub const EXIT_WINNER: u8 = 0;

/// Exit code for bad arguments and spawn failures
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for a stalled ring
pub const EXIT_LIVENESS: u8 = 2;

/// Exit code for a run interrupted by Ctrl-C
pub const EXIT_INTERRUPTED: u8 = 130;

/// Top-level error type for a ring run
#[derive(Error, Debug)]
pub enum RingError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker lifecycle errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// No event arrived within the wait bound
    #[error("Liveness failure during {phase}: no progress for {waited:?}")]
    Liveness {
        phase: &'static str,
        waited: Duration,
        worker: Option<WorkerId>,
    },

    /// The last member retired without a winner being declared
    #[error("Ring emptied without a winner")]
    EmptyRing,

    /// A member's inbox was gone when the coordinator had to reach it
    #[error("Liveness failure during {phase}: {worker} is no longer reachable")]
    Unreachable { phase: &'static str, worker: WorkerId },

    /// Channel closed unexpectedly
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl RingError {
    /// Check if this error means the ring stopped making progress
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            RingError::Liveness { .. }
                | RingError::Unreachable { .. }
                | RingError::Worker(WorkerError::WaitTimeout { .. })
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        if self.is_liveness() {
            EXIT_LIVENESS
        } else {
            EXIT_FAILURE
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be greater than 1")]
    InvalidWorkerCount { count: i64 },

    /// Invalid max decrement
    #[error("Invalid max decrement {value}: must be greater than 0")]
    InvalidMaxDecrement { value: i64 },

    /// Invalid initial token
    #[error("Invalid initial token {value}: must be greater than 0")]
    InvalidInitialToken { value: i64 },

    /// A zero max decrement never retires anyone
    #[error("A max decrement of 0 requires a forward limit")]
    MissingForwardLimit,

    /// Wait timeout of zero
    #[error("Invalid wait timeout: must be at least 1 second")]
    InvalidWaitTimeout,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker could not be created
    #[error("Failed to spawn worker {index}: {reason}")]
    SpawnFailed { index: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: WorkerId, message: String },

    /// Worker waited too long for its next event
    #[error("Worker {id} stalled in {state:?} after {waited:?}")]
    WaitTimeout {
        id: WorkerId,
        state: WorkerState,
        waited: Duration,
    },

    /// Coordinator mailbox is gone
    #[error("Worker {id} could not reach the coordinator")]
    CoordinatorUnreachable { id: WorkerId },

    /// A token arrived before any successor was assigned
    #[error("Worker {id} received a token before its successor")]
    TokenBeforeSuccessor { id: WorkerId },
}

/// Result type alias for RingError
pub type Result<T> = std::result::Result<T, RingError>;
