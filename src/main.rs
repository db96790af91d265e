//! token-ring - Token Passing Ring Simulation
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use token_ring::config::{CliArgs, RingConfig};
use token_ring::error::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_WINNER};
use token_ring::report::{print_event, print_header, print_summary};
use token_ring::ring::{Coordinator, RunOutcome};
use token_ring::RingError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Parse errors exit with 1, not clap's default 2
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<RingError>()
                .map(RingError::exit_code)
                .unwrap_or(EXIT_FAILURE);
            ExitCode::from(code)
        }
    }
}

fn run(args: CliArgs) -> Result<u8> {
    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = RingConfig::from_args(args)
        .map_err(RingError::from)
        .context("Invalid configuration")?;

    let show_forwards = config.show_forwards;
    print_header(
        config.worker_count,
        config.max_decrement,
        config.initial_token,
        config.seed,
    );

    let coordinator = Coordinator::new(config)
        .context("Failed to initialize ring")?
        .on_event(move |event| print_event(event, show_forwards));

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let result = coordinator.run().context("Ring run failed")?;

    print_summary(&result);

    match result.outcome {
        RunOutcome::Winner(id) => {
            info!(winner = %id, "Ring finished with a winner");
            Ok(EXIT_WINNER)
        }
        RunOutcome::ForwardLimitReached => Ok(EXIT_WINNER),
        RunOutcome::Interrupted => {
            info!("Ring was interrupted before a winner was found");
            Ok(EXIT_INTERRUPTED)
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("token_ring=debug,warn")
    } else {
        EnvFilter::new("token_ring=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
