//! Drop command implementation.

use super::{require_entity, OpenOptions};
use std::error::Error;

/// Runs the drop command.
pub fn run(options: &OpenOptions, entity: &str) -> Result<(), Box<dyn Error>> {
    let engine = options.open()?;
    require_entity(&engine, entity)?;

    let segments = engine.metadata(entity)?.segments.len();
    engine.drop_entity(entity)?;
    engine.shutdown()?;
    println!("Dropped {entity} ({segments} segments).");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[test]
    fn dropped_entity_disappears() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path(), 2);
        let options = testing::options(dir.path());

        run(&options, "event").unwrap();
        let engine = options.open().unwrap();
        assert!(engine.entity_names().is_empty());
        assert!(!dir.path().join("event").join("event.metadata").exists());
    }
}
