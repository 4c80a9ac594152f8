//! Cleanup command implementation.

use super::{require_entity, OpenOptions};
use std::error::Error;

/// Runs the cleanup command.
pub fn run(options: &OpenOptions, entity: &str, older_than_days: u32) -> Result<(), Box<dyn Error>> {
    let engine = options.open()?;
    require_entity(&engine, entity)?;

    let report = engine.cleanup_older_than_days(entity, older_than_days)?;
    println!(
        "Removed {} segments of {entity} older than {older_than_days} days.",
        report.removed.len()
    );
    for id in &report.failed {
        println!("  could not remove {id}");
    }
    engine.shutdown()?;

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} segments could not be removed", report.failed.len()).into())
    }
}
