//! Cross-entity registry.
//!
//! The global index maps every known entity to its directory, records
//! dependency edges between entities, and keeps a storage rollup. It is
//! persisted as `global.index` at the data root.

use crate::error::{CoreError, CoreResult};
use crate::metadata::EntityMetadata;
use crate::types::Timestamp;
use segdb_storage::FileAccess;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Storage rollup across all entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Registered entities.
    pub entity_count: usize,
    /// Segments across all entities.
    pub total_segments: usize,
    /// Active segments across all entities.
    pub active_segments: usize,
    /// Records physically stored.
    pub total_records: u64,
    /// Bytes on disk.
    pub total_size_bytes: u64,
    /// Mean segment size in bytes.
    pub average_segment_size: f64,
    /// Share of sealed segments smaller than a quarter of the maximum size.
    pub fragmentation: f64,
    /// When the rollup was computed.
    pub refreshed_at: Timestamp,
}

/// Registry of entities and their dependencies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalIndex {
    entities: BTreeMap<String, PathBuf>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    stats: GlobalStats,
}

impl GlobalIndex {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity. Returns true if it was new.
    pub fn register(&mut self, entity: &str, dir: PathBuf) -> bool {
        self.entities.insert(entity.to_string(), dir).is_none()
    }

    /// Returns true if `entity` is registered.
    #[must_use]
    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// Returns the directory of an entity.
    #[must_use]
    pub fn directory(&self, entity: &str) -> Option<&Path> {
        self.entities.get(entity).map(PathBuf::as_path)
    }

    /// Returns all registered entity names, sorted.
    #[must_use]
    pub fn entities(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Removes an entity and every dependency edge touching it.
    pub fn remove(&mut self, entity: &str) -> bool {
        self.dependencies.remove(entity);
        for targets in self.dependencies.values_mut() {
            targets.remove(entity);
        }
        self.dependencies.retain(|_, targets| !targets.is_empty());
        self.entities.remove(entity).is_some()
    }

    /// Records that `entity` depends on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if either entity is
    /// unregistered, or if the edge would create a cycle.
    pub fn add_dependency(&mut self, entity: &str, target: &str) -> CoreResult<()> {
        for name in [entity, target] {
            if !self.contains(name) {
                return Err(CoreError::invalid_operation(format!(
                    "entity {name:?} is not registered"
                )));
            }
        }
        if entity == target || self.depends_on(target, entity) {
            return Err(CoreError::invalid_operation(format!(
                "dependency {entity} -> {target} would create a cycle"
            )));
        }
        self.dependencies
            .entry(entity.to_string())
            .or_default()
            .insert(target.to_string());
        Ok(())
    }

    /// Returns true if `from` reaches `to` through dependency edges.
    fn depends_on(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(targets) = self.dependencies.get(current) {
                stack.extend(targets.iter().map(String::as_str));
            }
        }
        false
    }

    /// Returns the entities `entity` depends on.
    #[must_use]
    pub fn dependencies_of(&self, entity: &str) -> Vec<String> {
        self.dependencies
            .get(entity)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the entities that depend on `entity`.
    #[must_use]
    pub fn dependents_of(&self, entity: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|(_, targets)| targets.contains(entity))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Recomputes the rollup from entity metadata.
    pub fn refresh(&mut self, metadata: &[EntityMetadata], max_segment_size: u64) -> &GlobalStats {
        let segments = metadata.iter().flat_map(|m| m.segments.iter());
        let total_segments = segments.clone().count();
        let sealed = segments.clone().filter(|s| !s.active).count();
        let small = segments
            .clone()
            .filter(|s| !s.active && s.size_bytes < max_segment_size / 4)
            .count();
        let total_size_bytes: u64 = metadata.iter().map(EntityMetadata::total_size_bytes).sum();

        self.stats = GlobalStats {
            entity_count: self.entities.len(),
            total_segments,
            active_segments: total_segments - sealed,
            total_records: metadata.iter().map(EntityMetadata::total_records).sum(),
            total_size_bytes,
            average_segment_size: if total_segments == 0 {
                0.0
            } else {
                total_size_bytes as f64 / total_segments as f64
            },
            fragmentation: if sealed == 0 {
                0.0
            } else {
                small as f64 / sealed as f64
            },
            refreshed_at: Timestamp::now(),
        };
        &self.stats
    }

    /// Returns the last computed rollup.
    #[must_use]
    pub fn stats(&self) -> &GlobalStats {
        &self.stats
    }

    /// Loads the registry, or returns an empty one if the file is missing
    /// or unreadable.
    pub fn load(access: &dyn FileAccess, path: &Path) -> Self {
        if !access.exists(path) {
            return Self::new();
        }
        let loaded = access
            .read_all_bytes(path)
            .map_err(CoreError::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(CoreError::from));
        match loaded {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "global index unreadable, starting empty");
                Self::new()
            }
        }
    }

    /// Writes the registry durably.
    pub fn save(&self, access: &dyn FileAccess, path: &Path) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        access.write_durable(path, &bytes)?;
        Ok(())
    }
}
