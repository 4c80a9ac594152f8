//! Compact command implementation.

use super::{require_entity, OpenOptions};
use segdb_core::segment::plan_batches;
use segdb_core::SegmentId;
use std::error::Error;

/// Runs the compact command.
pub fn run(options: &OpenOptions, entity: &str, dry_run: bool) -> Result<(), Box<dyn Error>> {
    let engine = options.open()?;
    require_entity(&engine, entity)?;

    println!("Compacting {entity} in {}", options.root.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    if dry_run {
        let meta = engine.metadata(entity)?;
        let batches = plan_batches(&meta.segments, engine.config().max_segment_size);
        if batches.is_empty() {
            println!("Nothing to compact.");
        }
        for batch in &batches {
            println!("  would merge {}", join_ids(batch));
        }
        engine.shutdown()?;
        return Ok(());
    }

    let report = engine.compact(entity)?;
    for batch in &report.batches {
        println!(
            "  merged {} into {} ({} records kept, {} dropped)",
            join_ids(&batch.sources),
            batch.created,
            batch.records_written,
            batch.records_dropped
        );
    }
    for batch in &report.failed_batches {
        println!("  failed to merge {}", join_ids(batch));
    }
    println!();
    println!(
        "Merged {} segments into {}.",
        report.segments_merged(),
        report.segments_created()
    );
    engine.shutdown()?;

    if report.failed_batches.is_empty() {
        Ok(())
    } else {
        Err(format!("{} batches failed", report.failed_batches.len()).into())
    }
}

fn join_ids(ids: &[SegmentId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
