//! token-ring - Token Passing Ring Simulation
//!
//! A ring of worker threads passes a single integer token from each member
//! to its successor. Every holder subtracts a random amount in `[0, M]`.
//! A holder that drives the token negative retires; the coordinator
//! repairs the ring around it and re-injects the starting token at the
//! head. The last worker standing is the winner.
//!
//! # Features
//!
//! - **Single-consumer event loops**: the coordinator and every worker own
//!   exactly one inbox and handle one event at a time.
//!
//! - **Acknowledged topology**: token injection waits until every worker
//!   has confirmed its successor.
//!
//! - **Bounded waits**: a ring that stops making progress is reported as a
//!   liveness failure instead of hanging.
//!
//! - **Reproducible runs**: each worker's draws come from a `StdRng`
//!   derived from the run seed.
//!
//! # Example
//!
//! ```bash
//! # Five workers, decrement in [0, 3], starting token 50
//! token-ring -p 5 -M 3 -t 50
//!
//! # Replay a run
//! token-ring -p 5 -M 3 -t 50 --seed 1234
//! ```

pub mod config;
pub mod error;
pub mod report;
pub mod ring;

pub use config::{CliArgs, RingConfig};
pub use error::{Result, RingError};
pub use ring::{Coordinator, RingEvent, RunOutcome, RunResult, WorkerId};
