//! Token ring: membership, circulation and lifecycle
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!                  │         Coordinator          │
//!                  │  - owns Ring + RingConfig    │
//!                  │  - bounded inbox, one reader │
//!                  └──┬───────────────────────▲───┘
//!   SuccessorAssigned │                       │ SuccessorAcknowledged
//!   TokenArrived      │                       │ TokenForwarded
//!   Shutdown          │                       │ WorkerRetired
//!        ┌────────────┼────────────┐          │ WorkerStalled
//!  ┌─────▼─────┐ ┌────▼──────┐ ┌───▼───────┐  │
//!  │ Worker 0  ├─► Worker 1  ├─► Worker N  ├──┘
//!  │  inbox    │ │  inbox    │ │  inbox    │
//!  └─────▲─────┘ └───────────┘ └─────┬─────┘
//!        └──────── TokenArrived ─────┘
//! ```

pub mod channel;
pub mod coordinator;
pub mod membership;
pub mod token;
pub mod worker;

use std::fmt;

pub use channel::{bounded_channel, channel, CoordinatorEvent, Inbox, Mailbox, Peer, WaitError, WorkerEvent};
pub use coordinator::{Coordinator, RingEvent, RunOutcome, RunResult};
pub use membership::{RepairResult, Ring};
pub use token::{DecrementSource, SeededDraw};
pub use worker::{Launcher, ThreadLauncher, Worker, WorkerHandle, WorkerReport, WorkerState, WorkerStats};

/// Identity of a ring member, assigned in spawn order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Create an id from a spawn index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Spawn index of this worker
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}
