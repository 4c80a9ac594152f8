//! Verify command implementation.

use super::{require_entity, OpenOptions};
use segdb_core::{CoreResult, IntegrityReport, StorageEngine};
use std::error::Error;

/// Verifies one entity, or every registered entity when `entity` is `None`.
pub fn check(engine: &StorageEngine, entity: Option<&str>) -> CoreResult<Vec<IntegrityReport>> {
    let names = match entity {
        Some(name) => vec![name.to_string()],
        None => engine.entity_names(),
    };
    names.iter().map(|name| engine.verify(name)).collect()
}

/// Runs the verify command.
pub fn run(options: &OpenOptions, entity: Option<&str>) -> Result<(), Box<dyn Error>> {
    let engine = options.open()?;
    if let Some(name) = entity {
        require_entity(&engine, name)?;
    }

    println!("Verifying {}", options.root.display());
    println!();
    let reports = check(&engine, entity)?;
    for report in &reports {
        if report.is_clean() {
            println!("  {}: {} segments intact", report.entity, report.intact.len());
        } else {
            let corrupted: Vec<String> = report.corrupted.iter().map(ToString::to_string).collect();
            println!(
                "  {}: {} intact, corrupted: {}",
                report.entity,
                report.intact.len(),
                corrupted.join(", ")
            );
        }
    }
    engine.shutdown()?;

    println!();
    if reports.iter().all(IntegrityReport::is_clean) {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed");
        Err("verification failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use segdb_core::{SegmentId, StorageLayout};

    #[test]
    fn clean_root_passes() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path(), 2);

        let engine = testing::options(dir.path()).open().unwrap();
        let reports = check(&engine, None).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_clean());
        assert_eq!(reports[0].intact.len(), 2);
    }

    #[test]
    fn flipped_byte_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path(), 2);

        let path = StorageLayout::new(dir.path()).segment_path("event", SegmentId::new(1));
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let engine = testing::options(dir.path()).open().unwrap();
        let reports = check(&engine, Some("event")).unwrap();
        assert_eq!(reports[0].corrupted, vec![SegmentId::new(1)]);
        assert_eq!(reports[0].intact, vec![SegmentId::new(2)]);
    }
}
