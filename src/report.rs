//! Terminal output for a ring run
//!
//! One line per forward, one per retirement and a final winner line,
//! styled with console. Structured logs go through tracing instead.

use crate::ring::{RingEvent, RunOutcome, RunResult};
use console::style;

/// Render a single event as a progress line
pub fn format_event(event: &RingEvent) -> String {
    match *event {
        RingEvent::TokenInjected { to, value } => {
            format!("[coordinator] injecting token {} into {}", value, to)
        }
        RingEvent::TokenForwarded {
            from,
            to,
            received,
            draw,
            value,
        } => format!(
            "{} received {}, drew {}, passes {} -> {}",
            from, received, draw, value, to
        ),
        RingEvent::WorkerRetired {
            worker,
            token,
            remaining,
        } => format!(
            "{} retired with token {} ({} remaining)",
            worker, token, remaining
        ),
        RingEvent::TopologyRepaired {
            predecessor,
            successor,
        } => format!("[coordinator] {} now passes to {}", predecessor, successor),
        RingEvent::WinnerDeclared { worker } => format!("{} is the winner", worker),
    }
}

/// Print an event line; forwards are skipped unless `show_forwards`
pub fn print_event(event: &RingEvent, show_forwards: bool) {
    let line = format_event(event);
    match event {
        RingEvent::TokenForwarded { .. } if !show_forwards => {}
        RingEvent::TokenForwarded { .. } => println!("  {}", line),
        RingEvent::TokenInjected { .. } | RingEvent::TopologyRepaired { .. } => {
            println!("{}", style(line).dim())
        }
        RingEvent::WorkerRetired { .. } => println!("{}", style(line).yellow()),
        RingEvent::WinnerDeclared { .. } => println!("{}", style(line).green().bold()),
    }
}

/// Print a header at the start of the run
pub fn print_header(workers: usize, max_decrement: u64, token: i64, seed: u64) {
    println!();
    println!(
        "{} {}",
        style("token-ring").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} [0, {}]", style("Decrement:").bold(), max_decrement);
    println!("  {} {}", style("Token:").bold(), token);
    println!("  {} {}", style("Seed:").bold(), seed);
    println!();
}

/// Short label for an outcome
pub fn outcome_label(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Winner(id) => format!("{} won", id),
        RunOutcome::ForwardLimitReached => "forward limit reached".to_string(),
        RunOutcome::Interrupted => "interrupted".to_string(),
    }
}

/// Print a summary of the run
pub fn print_summary(result: &RunResult) {
    let title = match result.outcome {
        RunOutcome::Winner(_) => style("Ring Complete").green().bold(),
        _ => style("Ring Stopped").yellow().bold(),
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Outcome:").bold(), outcome_label(result.outcome));
    println!("  {} {}", style("Forwards:").bold(), result.forwards);
    println!("  {} {}", style("Retirements:").bold(), result.repairs);
    println!("  {} {}", style("Seed:").bold(), result.seed);
    println!(
        "  {} {:.3}s",
        style("Duration:").bold(),
        result.duration.as_secs_f64()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::WorkerId;

    #[test]
    fn test_format_event() {
        let forward = RingEvent::TokenForwarded {
            from: WorkerId::new(1),
            to: WorkerId::new(2),
            received: 3,
            draw: 3,
            value: 0,
        };
        assert_eq!(
            format_event(&forward),
            "worker-1 received 3, drew 3, passes 0 -> worker-2"
        );

        let retired = RingEvent::WorkerRetired {
            worker: WorkerId::new(3),
            token: -2,
            remaining: 4,
        };
        assert_eq!(format_event(&retired), "worker-3 retired with token -2 (4 remaining)");

        let winner = RingEvent::WinnerDeclared {
            worker: WorkerId::new(0),
        };
        assert_eq!(format_event(&winner), "worker-0 is the winner");
    }

    #[test]
    fn test_outcome_label() {
        assert_eq!(outcome_label(RunOutcome::Winner(WorkerId::new(5))), "worker-5 won");
        assert_eq!(outcome_label(RunOutcome::Interrupted), "interrupted");
    }
}
