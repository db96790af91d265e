//! Configuration types for token-ring
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use clap::Parser;
use std::time::Duration;

/// Default bound on every blocking wait
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 30;

/// Token ring simulation
#[derive(Parser, Debug, Clone)]
#[command(
    name = "token-ring",
    version,
    about = "Pass a decrementing token around a ring of workers until one survives",
    long_about = "Spawns a ring of workers that pass an integer token to their successor.\n\n\
                  Each holder subtracts a random amount in [0, M]. A worker whose token goes\n\
                  negative retires, the ring is repaired, and the starting token is re-injected\n\
                  at the head of the ring. The last worker standing wins.",
    after_help = "EXAMPLES:\n    \
        token-ring -p 5 -M 3 -t 50\n    \
        token-ring -p 8 -M 10 -t 100 --seed 42\n    \
        token-ring -p 3 -M 2 -t 10 -q",
    allow_negative_numbers = true
)]
pub struct CliArgs {
    /// Number of workers in the ring (must be > 1)
    #[arg(short = 'p', value_name = "NUM")]
    pub processes: i64,

    /// Maximum decrement per hop (must be > 0)
    #[arg(short = 'M', value_name = "NUM")]
    pub max_decrement: i64,

    /// Starting token value (must be > 0)
    #[arg(short = 't', value_name = "NUM")]
    pub token: i64,

    /// Seed for the decrement draws (random if not set)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Seconds to wait for any event before declaring the ring stalled
    #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT_SECS, value_name = "SECS")]
    pub timeout: u64,

    /// Quiet mode - suppress per-forward lines
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of workers spawned into the ring
    pub worker_count: usize,

    /// Upper bound (inclusive) of each decrement draw
    pub max_decrement: u64,

    /// Canonical starting token, re-injected after every repair
    pub initial_token: i64,

    /// Run seed for the decrement draws
    pub seed: u64,

    /// Bound on every blocking wait
    pub wait_timeout: Duration,

    /// Stop after this many forwards
    pub forward_limit: Option<u64>,

    /// Print a line per forward
    pub show_forwards: bool,
}

impl RingConfig {
    /// Create a validated configuration with a random seed
    pub fn new(worker_count: i64, max_decrement: i64, initial_token: i64) -> Result<Self, ConfigError> {
        let worker_count = validate_worker_count(worker_count)?;

        if max_decrement <= 0 {
            return Err(ConfigError::InvalidMaxDecrement {
                value: max_decrement,
            });
        }

        if initial_token <= 0 {
            return Err(ConfigError::InvalidInitialToken {
                value: initial_token,
            });
        }

        Ok(Self {
            worker_count,
            max_decrement: max_decrement.unsigned_abs(),
            initial_token,
            seed: rand::random(),
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            forward_limit: None,
            show_forwards: true,
        })
    }

    /// Configuration with a max decrement of 0
    ///
    /// Nobody ever retires, so the token circulates unchanged until
    /// `forward_limit` forwards have happened.
    pub fn fixed_point(worker_count: i64, initial_token: i64, forward_limit: u64) -> Result<Self, ConfigError> {
        let mut config = Self::new(worker_count, 1, initial_token)?;
        config.max_decrement = 0;
        config.forward_limit = Some(forward_limit);
        config.validate()?;
        Ok(config)
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::new(args.processes, args.max_decrement, args.token)?;

        if args.timeout == 0 {
            return Err(ConfigError::InvalidWaitTimeout);
        }

        if let Some(seed) = args.seed {
            config.seed = seed;
        }
        config.wait_timeout = Duration::from_secs(args.timeout);
        config.show_forwards = !args.quiet;

        Ok(config)
    }

    /// Set the run seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the bound on blocking waits
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Stop the run after `limit` forwards
    pub fn with_forward_limit(mut self, limit: u64) -> Self {
        self.forward_limit = Some(limit);
        self
    }

    /// Re-check invariants that builder methods can break
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count < 2 {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count as i64,
            });
        }

        if self.initial_token <= 0 {
            return Err(ConfigError::InvalidInitialToken {
                value: self.initial_token,
            });
        }

        if self.max_decrement == 0 && self.forward_limit.is_none() {
            return Err(ConfigError::MissingForwardLimit);
        }

        if self.wait_timeout.is_zero() {
            return Err(ConfigError::InvalidWaitTimeout);
        }

        Ok(())
    }
}

fn validate_worker_count(count: i64) -> Result<usize, ConfigError> {
    match usize::try_from(count) {
        Ok(n) if n >= 2 => Ok(n),
        _ => Err(ConfigError::InvalidWorkerCount { count }),
    }
}
