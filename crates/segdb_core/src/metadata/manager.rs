//! Loading, caching, and durable saving of entity metadata.

use super::{EntityMetadata, PropertySchema, SegmentInfo};
use crate::dir::StorageLayout;
use crate::error::{CoreError, CoreResult};
use crate::types::{SegmentId, Timestamp};
use parking_lot::RwLock;
use segdb_storage::{backup_path, FileAccess};
use std::collections::HashMap;
use std::sync::Arc;

/// Keeps entity metadata cached in memory and persisted as JSON.
///
/// Every change is applied to a copy, written with
/// [`FileAccess::write_durable_with_backup`], and only then published to the
/// cache, so the in-memory state never runs ahead of disk.
pub struct EntityMetadataManager {
    access: Arc<dyn FileAccess>,
    layout: StorageLayout,
    cache: RwLock<HashMap<String, EntityMetadata>>,
}

impl EntityMetadataManager {
    /// Creates a manager over the given file access.
    pub fn new(access: Arc<dyn FileAccess>, layout: StorageLayout) -> Self {
        Self {
            access,
            layout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the metadata of `entity`, loading it on first access.
    ///
    /// An entity with no metadata file gets a fresh, unsaved record.
    pub fn get_metadata(&self, entity: &str) -> CoreResult<EntityMetadata> {
        if let Some(meta) = self.cache.read().get(entity) {
            return Ok(meta.clone());
        }

        let mut cache = self.cache.write();
        if let Some(meta) = cache.get(entity) {
            return Ok(meta.clone());
        }
        let meta = self
            .load_metadata(entity)?
            .unwrap_or_else(|| EntityMetadata::new(entity));
        cache.insert(entity.to_string(), meta.clone());
        Ok(meta)
    }

    /// Reads metadata from disk, bypassing the cache.
    ///
    /// Returns `None` if no metadata file exists.
    pub fn load_metadata(&self, entity: &str) -> CoreResult<Option<EntityMetadata>> {
        let path = self.layout.metadata_path(entity);
        if !self.access.exists(&path) {
            return Ok(None);
        }
        let bytes = self.access.read_all_bytes(&path)?;
        let meta: EntityMetadata = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(entity, path = %path.display(), error = %e, "metadata undecodable");
            CoreError::integrity(format!(
                "metadata {} undecodable ({e}); previous version is at {}",
                path.display(),
                backup_path(&path).display()
            ))
        })?;
        if meta.entity != entity {
            return Err(CoreError::integrity(format!(
                "metadata {} belongs to entity {:?}",
                path.display(),
                meta.entity
            )));
        }
        Ok(Some(meta))
    }

    /// Writes metadata to disk and publishes it to the cache.
    pub fn save_metadata(&self, meta: &EntityMetadata) -> CoreResult<()> {
        let mut cache = self.cache.write();
        self.persist(meta)?;
        cache.insert(meta.entity.clone(), meta.clone());
        Ok(())
    }

    fn persist(&self, meta: &EntityMetadata) -> CoreResult<()> {
        let path = self.layout.metadata_path(&meta.entity);
        let json = serde_json::to_vec_pretty(meta)?;
        self.access
            .ensure_directory(&self.layout.entity_dir(&meta.entity))?;
        self.access.write_durable_with_backup(&path, &json)?;
        Ok(())
    }

    /// Applies `change` to the metadata of `entity` and saves the result.
    ///
    /// Every change advances `write_sequence`. If saving fails the cached
    /// metadata is left as it was.
    pub fn update<T>(
        &self,
        entity: &str,
        change: impl FnOnce(&mut EntityMetadata) -> T,
    ) -> CoreResult<T> {
        let mut cache = self.cache.write();
        let mut meta = match cache.get(entity) {
            Some(meta) => meta.clone(),
            None => self
                .load_metadata(entity)?
                .unwrap_or_else(|| EntityMetadata::new(entity)),
        };

        let out = change(&mut meta);
        meta.modified_at = Timestamp::now();
        meta.write_sequence += 1;

        self.persist(&meta)?;
        cache.insert(entity.to_string(), meta);
        Ok(out)
    }

    /// Appends a segment description.
    pub fn add_segment(&self, entity: &str, info: SegmentInfo) -> CoreResult<()> {
        self.update(entity, |meta| meta.segments.push(info))
    }

    /// Removes a segment description by file name.
    pub fn remove_segment(&self, entity: &str, file_name: &str) -> CoreResult<Option<SegmentInfo>> {
        self.update(entity, |meta| meta.remove_segment(file_name))
    }

    /// Records `keys` as soft-deleted in a segment.
    ///
    /// Returns how many keys were newly marked.
    pub fn mark_deleted(
        &self,
        entity: &str,
        segment: SegmentId,
        keys: &[String],
    ) -> CoreResult<usize> {
        self.update(entity, |meta| match meta.segment_mut(segment) {
            Some(info) => keys
                .iter()
                .filter(|k| info.deleted_ids.insert((*k).clone()))
                .count(),
            None => 0,
        })
    }

    /// Stores the declared schema if it differs from the saved one.
    ///
    /// Returns true if the schema changed.
    pub fn set_schema(&self, entity: &str, schema: Vec<PropertySchema>) -> CoreResult<bool> {
        if self.get_metadata(entity)?.schema == schema {
            return Ok(false);
        }
        self.update(entity, |meta| meta.schema = schema)?;
        Ok(true)
    }

    /// Returns the names of entities currently cached.
    pub fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Forgets an entity and deletes its metadata files.
    pub fn drop_entity(&self, entity: &str) -> CoreResult<()> {
        let mut cache = self.cache.write();
        let path = self.layout.metadata_path(entity);
        self.access.delete(&path)?;
        self.access.delete(&backup_path(&path))?;
        cache.remove(entity);
        Ok(())
    }
}

impl std::fmt::Debug for EntityMetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMetadataManager")
            .field("root", &self.layout.root())
            .field("cached", &self.cache.read().len())
            .finish()
    }
}
