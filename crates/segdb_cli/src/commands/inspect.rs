//! Inspect command implementation.

use super::{format_size, OpenOptions};
use segdb_core::{CoreResult, GlobalStats, PropertyStats, SegmentId, StorageEngine, Timestamp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;

/// Inspection result for a data root.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    /// Data root path.
    pub root: String,
    /// Storage totals across entities.
    pub totals: GlobalStats,
    /// Per-entity details.
    pub entities: Vec<EntityReport>,
}

/// Details of one entity.
#[derive(Debug, Serialize)]
pub struct EntityReport {
    /// Entity name.
    pub name: String,
    /// Number of segments.
    pub segment_count: usize,
    /// Current active segment.
    pub active_segment: Option<SegmentId>,
    /// Records physically stored.
    pub records: u64,
    /// Records marked deleted.
    pub deleted: u64,
    /// Bytes on disk.
    pub size_bytes: u64,
    /// Entities this one is required by.
    pub dependents: Vec<String>,
    /// Index statistics per property.
    pub index: BTreeMap<String, PropertyStats>,
    /// Per-segment details, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentReport>>,
}

/// Details of one segment.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    /// Segment ID.
    pub id: SegmentId,
    /// File name.
    pub file_name: String,
    /// Records stored.
    pub records: u64,
    /// Records marked deleted.
    pub deleted: usize,
    /// Bytes on disk.
    pub size_bytes: u64,
    /// Whether the segment receives appends.
    pub active: bool,
    /// Whether the file is compressed.
    pub compressed: bool,
    /// Whether the file is encrypted.
    pub encrypted: bool,
    /// Last modification time.
    pub modified_at: Timestamp,
}

/// Collects the inspection report.
pub fn collect(engine: &StorageEngine, show_segments: bool) -> CoreResult<InspectReport> {
    let mut entities = Vec::new();
    for name in engine.entity_names() {
        let meta = engine.metadata(&name)?;
        let segments = show_segments.then(|| {
            meta.segments
                .iter()
                .map(|s| SegmentReport {
                    id: s.id,
                    file_name: s.file_name.clone(),
                    records: s.record_count,
                    deleted: s.deleted_ids.len(),
                    size_bytes: s.size_bytes,
                    active: s.active,
                    compressed: s.compressed,
                    encrypted: s.encrypted,
                    modified_at: s.modified_at,
                })
                .collect()
        });
        entities.push(EntityReport {
            segment_count: meta.segments.len(),
            active_segment: meta.active_segment().map(|s| s.id),
            records: meta.total_records(),
            deleted: meta.total_deleted(),
            size_bytes: meta.total_size_bytes(),
            dependents: engine.dependents_of(&name),
            index: engine.index_stats(&name)?,
            segments,
            name,
        });
    }

    Ok(InspectReport {
        root: engine.config().data_root.display().to_string(),
        totals: engine.global_stats()?,
        entities,
    })
}

/// Runs the inspect command.
pub fn run(options: &OpenOptions, show_segments: bool, format: &str) -> Result<(), Box<dyn Error>> {
    let engine = options.open()?;
    let report = collect(&engine, show_segments)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    engine.shutdown()?;
    Ok(())
}

fn print_text(report: &InspectReport) {
    println!("segdb Data Root Inspection");
    println!("==========================");
    println!();
    println!("Root: {}", report.root);
    println!();
    println!("Totals:");
    println!("  Entities:         {}", report.totals.entity_count);
    println!(
        "  Segments:         {} ({} active)",
        report.totals.total_segments, report.totals.active_segments
    );
    println!("  Records:          {}", report.totals.total_records);
    println!("  Size:             {}", format_size(report.totals.total_size_bytes));
    println!(
        "  Avg segment size: {}",
        format_size(report.totals.average_segment_size as u64)
    );
    println!("  Fragmentation:    {:.1}%", report.totals.fragmentation * 100.0);

    for entity in &report.entities {
        println!();
        println!("Entity {}:", entity.name);
        println!("  Segments: {}", entity.segment_count);
        if let Some(active) = entity.active_segment {
            println!("  Active:   {active}");
        }
        println!("  Records:  {} ({} deleted)", entity.records, entity.deleted);
        println!("  Size:     {}", format_size(entity.size_bytes));
        if !entity.dependents.is_empty() {
            println!("  Required by: {}", entity.dependents.join(", "));
        }
        for (property, stats) in &entity.index {
            println!(
                "  Index {property}: {} live, {} deleted, {} distinct",
                stats.live_entries, stats.deleted_entries, stats.unique_values
            );
        }
        if let Some(segments) = &entity.segments {
            for s in segments {
                println!(
                    "    {} {:<28} {:>6} records {:>4} deleted {:>10}{}{}{}",
                    s.id,
                    s.file_name,
                    s.records,
                    s.deleted,
                    format_size(s.size_bytes),
                    if s.active { " active" } else { "" },
                    if s.compressed { " gz" } else { "" },
                    if s.encrypted { " enc" } else { "" },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[test]
    fn report_lists_seeded_entity() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path(), 3);

        let engine = testing::options(dir.path()).open().unwrap();
        let report = collect(&engine, true).unwrap();

        assert_eq!(report.entities.len(), 1);
        let entity = &report.entities[0];
        assert_eq!(entity.name, "event");
        assert_eq!(entity.records, 3);
        assert_eq!(entity.segment_count, 3);
        assert_eq!(entity.segments.as_ref().unwrap().len(), 3);
        assert_eq!(entity.index["kind"].live_entries, 3);
        assert_eq!(report.totals.total_records, 3);
    }

    #[test]
    fn report_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path(), 1);

        let engine = testing::options(dir.path()).open().unwrap();
        let report = collect(&engine, false).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entities"][0]["name"], "event");
        assert!(json["entities"][0].get("segments").is_none());
    }
}
