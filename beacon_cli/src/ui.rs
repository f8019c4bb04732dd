// UI utility functions for terminal output
use beacon_metrics::{ShutdownOutcome, StatsSnapshot};
use colored::Colorize;

pub fn print_header(text: &str) {
    println!("\n{}", text.bold().cyan());
    println!("{}", "=".repeat(text.len()).cyan());
}

pub fn print_success(text: &str) {
    println!("{} {}", "✓".green().bold(), text.green());
}

pub fn print_error(text: &str) {
    println!("{} {}", "✗".red().bold(), text.red());
}

pub fn print_warning(text: &str) {
    println!("{} {}", "⚠".yellow().bold(), text.yellow());
}

pub fn print_outcome(outcome: ShutdownOutcome) {
    match outcome {
        ShutdownOutcome::Drained => print_success("Metrics drained"),
        ShutdownOutcome::TimedOut => print_warning("Shutdown deadline exceeded, buffered metrics discarded"),
        ShutdownOutcome::WorkerFailed => print_error("Flush worker failed"),
        ShutdownOutcome::AlreadyStopped => print_warning("Pipeline was already stopped"),
    }
}

pub fn print_stats(stats: &StatsSnapshot) {
    println!("\n{}", "Pipeline Stats:".bold());
    println!("  Recorded: {}", stats.recorded);
    println!("  Dropped: {} ({:.2}%)", stats.dropped, stats.drop_rate * 100.0);
    println!("  Batches Flushed: {}", stats.batches_flushed);
    println!("  Events Emitted: {}", stats.events_emitted);
    println!("  Emit Failures: {}", stats.emit_failures);
    println!("  Events Discarded: {}", stats.events_discarded);
}
