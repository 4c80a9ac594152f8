//! Storage engine facade.
//!
//! [`StorageEngine`] wires the file access stack, metadata manager,
//! segment manager, per-entity indexes, and global index together and owns
//! the auto-flush worker. Typed access goes through [`EntityStore`].

mod flush;
mod store;

pub use store::EntityStore;

use crate::config::{EncryptionConfig, EngineConfig};
use crate::dir::{validate_entity_name, DataDir, StorageLayout};
use crate::error::{CoreError, CoreResult};
use crate::global::{GlobalIndex, GlobalStats};
use crate::index::{load_index, save_index, EntityIndex, PropertyStats, QueryCache};
use crate::metadata::{EntityMetadata, EntityMetadataManager};
use crate::record::Record;
use crate::segment::{CleanupReport, CompactionReport, SegmentHeader, SegmentManager};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::types::{Cancellation, SegmentId, Timestamp};
use flush::FlushWorker;
use parking_lot::{Mutex, RwLock};
use segdb_storage::{
    generate_salt, CipherService, EncryptedFileAccess, FileAccess, InMemoryFileAccess,
    PlainFileAccess,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Result of verifying every segment of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Entity verified.
    pub entity: String,
    /// Segments whose checksum matched.
    pub intact: Vec<SegmentId>,
    /// Segments whose checksum did not match.
    pub corrupted: Vec<SegmentId>,
}

impl IntegrityReport {
    /// Returns true if no segment failed verification.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.corrupted.is_empty()
    }
}

/// In-memory state of one entity.
pub(crate) struct EntityState {
    pub(crate) name: String,
    pub(crate) index: RwLock<EntityIndex>,
    /// Serializes writers and maintenance of this entity.
    pub(crate) writer: Mutex<()>,
    dirty: AtomicBool,
    pub(crate) needs_rebuild: AtomicBool,
    dropped: AtomicBool,
}

impl EntityState {
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }
}

/// Shared engine internals.
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) layout: StorageLayout,
    pub(crate) access: Arc<dyn FileAccess>,
    pub(crate) metadata: Arc<EntityMetadataManager>,
    pub(crate) segments: SegmentManager,
    pub(crate) stats: Arc<EngineStats>,
    global: RwLock<GlobalIndex>,
    global_dirty: AtomicBool,
    entities: RwLock<HashMap<String, Arc<EntityState>>>,
    cancel: Cancellation,
    closed: AtomicBool,
    _dir: Option<DataDir>,
}

impl EngineInner {
    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CoreError::EngineClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn new_cache(&self) -> QueryCache {
        QueryCache::new(
            self.config.cache_enabled,
            self.config.cache_size,
            self.config.cache_ttl,
        )
    }

    pub(crate) fn mark_global_dirty(&self) {
        self.global_dirty.store(true, Ordering::Release);
    }

    /// Returns the state of `entity`, loading its index on first use.
    ///
    /// A missing or corrupt index, or one saved at a different metadata
    /// write sequence, is replaced by an empty index flagged for rebuild.
    pub(crate) fn entity_state(&self, entity: &str) -> CoreResult<Arc<EntityState>> {
        validate_entity_name(entity)?;
        if let Some(state) = self.entities.read().get(entity) {
            return Ok(Arc::clone(state));
        }

        let mut entities = self.entities.write();
        if let Some(state) = entities.get(entity) {
            return Ok(Arc::clone(state));
        }

        let meta = self.metadata.get_metadata(entity)?;
        let path = self.layout.index_path(entity);
        let (index, needs_rebuild) =
            match load_index(&*self.access, &path, entity, self.new_cache()) {
                Some(index) if index.synced_sequence() == meta.write_sequence => (index, false),
                Some(index) => {
                    warn!(
                        entity,
                        index_sequence = index.synced_sequence(),
                        metadata_sequence = meta.write_sequence,
                        "index is stale, rebuild pending"
                    );
                    (EntityIndex::new(entity, self.new_cache()), true)
                }
                None => (
                    EntityIndex::new(entity, self.new_cache()),
                    meta.total_records() > 0,
                ),
            };

        let state = Arc::new(EntityState {
            name: entity.to_string(),
            index: RwLock::new(index),
            writer: Mutex::new(()),
            dirty: AtomicBool::new(false),
            needs_rebuild: AtomicBool::new(needs_rebuild),
            dropped: AtomicBool::new(false),
        });
        entities.insert(entity.to_string(), Arc::clone(&state));

        if self
            .global
            .write()
            .register(entity, self.layout.entity_dir(entity))
        {
            self.mark_global_dirty();
            debug!(entity, "entity registered");
        }
        Ok(state)
    }

    /// Persists every dirty index and the global index.
    ///
    /// Indexes awaiting a rebuild are skipped. Every dirty entity is
    /// attempted; the first failure is returned.
    pub(crate) fn flush(&self) -> CoreResult<()> {
        let states: Vec<Arc<EntityState>> = self.entities.read().values().cloned().collect();
        let mut first_error = None;

        for state in states {
            if state.is_dropped() || state.needs_rebuild.load(Ordering::Acquire) {
                continue;
            }
            if !state.dirty.swap(false, Ordering::AcqRel) {
                continue;
            }
            if let Err(e) = self.persist_index(&state) {
                warn!(entity = %state.name, error = %e, "index flush failed");
                state.mark_dirty();
                self.stats.record_error();
                first_error.get_or_insert(e);
            }
        }

        if self.global_dirty.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.persist_global() {
                warn!(error = %e, "global index flush failed");
                self.mark_global_dirty();
                self.stats.record_error();
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn persist_index(&self, state: &EntityState) -> CoreResult<()> {
        let _writer = state.writer.lock();
        let sequence = self.metadata.get_metadata(&state.name)?.write_sequence;
        let mut index = state.index.write();
        index.set_synced_sequence(sequence);
        save_index(&*self.access, &self.layout.index_path(&state.name), &index)?;
        self.stats.record_index_flush();
        debug!(entity = %state.name, sequence, records = index.len(), "index flushed");
        Ok(())
    }

    fn refresh_global(&self) -> GlobalStats {
        let names = self.global.read().entities();
        let metadata: Vec<EntityMetadata> = names
            .iter()
            .filter_map(|name| match self.metadata.get_metadata(name) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!(entity = %name, error = %e, "skipping entity in global rollup");
                    None
                }
            })
            .collect();
        self.global
            .write()
            .refresh(&metadata, self.config.max_segment_size)
            .clone()
    }

    fn persist_global(&self) -> CoreResult<()> {
        self.refresh_global();
        self.global
            .read()
            .save(&*self.access, &self.layout.global_index_path())
    }
}

/// The storage engine.
///
/// # Example
///
/// ```rust,ignore
/// use segdb_core::{EngineConfig, StorageEngine};
///
/// let engine = StorageEngine::open(EngineConfig::new("data").compression(true))?;
/// let people = engine.store::<Person>()?;
/// people.save(&[alice, bob])?;
/// let adults = people.find_by_range("age", &18.into(), &120.into())?;
/// engine.shutdown()?;
/// ```
pub struct StorageEngine {
    inner: Arc<EngineInner>,
    flusher: Mutex<Option<FlushWorker>>,
}

impl StorageEngine {
    /// Opens an engine over the data root named in `config`.
    ///
    /// The root is created if missing and locked for exclusive use. With
    /// encryption enabled and no explicit salt, the salt is read from (or
    /// generated into) the data root.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] for invalid settings and
    /// [`CoreError::DataDirLocked`] if another process holds the root.
    pub fn open(config: EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        let dir = DataDir::open(&config.data_root, true)?;
        let access: Arc<dyn FileAccess> = match &config.encryption {
            Some(encryption) => {
                let salt = match &encryption.salt {
                    Some(salt) => salt.clone(),
                    None => dir.load_or_create_salt()?,
                };
                Arc::new(encrypted_access(
                    Box::new(PlainFileAccess::new()),
                    encryption,
                    &salt,
                    config.compression,
                )?)
            }
            None => Arc::new(PlainFileAccess::new().with_compression(config.compression)),
        };
        Self::build(config, Some(dir), access)
    }

    /// Opens a non-persistent engine backed by memory.
    pub fn open_in_memory(config: EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        let access: Arc<dyn FileAccess> = match &config.encryption {
            Some(encryption) => {
                let salt = encryption.salt.clone().unwrap_or_else(generate_salt);
                Arc::new(encrypted_access(
                    Box::new(InMemoryFileAccess::new()),
                    encryption,
                    &salt,
                    config.compression,
                )?)
            }
            None => Arc::new(InMemoryFileAccess::new().with_compression(config.compression)),
        };
        Self::build(config, None, access)
    }

    /// Opens an engine over a caller-supplied file access stack.
    ///
    /// The encryption and compression settings of `config` are ignored;
    /// `access` decides how bytes are stored.
    pub fn open_with_access(config: EngineConfig, access: Arc<dyn FileAccess>) -> CoreResult<Self> {
        config.validate()?;
        Self::build(config, None, access)
    }

    fn build(
        config: EngineConfig,
        dir: Option<DataDir>,
        access: Arc<dyn FileAccess>,
    ) -> CoreResult<Self> {
        let layout = StorageLayout::new(&config.data_root);
        let stats = Arc::new(EngineStats::new());
        let metadata = Arc::new(EntityMetadataManager::new(
            Arc::clone(&access),
            layout.clone(),
        ));
        let segments = SegmentManager::new(
            Arc::clone(&access),
            layout.clone(),
            Arc::clone(&metadata),
            Arc::clone(&stats),
            config.max_segment_size,
            config.max_records_per_segment,
        );

        let mut global = GlobalIndex::load(&*access, &layout.global_index_path());
        let mut global_dirty = false;
        for entity in discover_entities(dir.as_ref(), &*access, &layout) {
            if global.register(&entity, layout.entity_dir(&entity)) {
                debug!(entity = %entity, "found unregistered entity on disk");
                global_dirty = true;
            }
        }
        let entity_count = global.entities().len();

        let inner = Arc::new(EngineInner {
            layout,
            access,
            metadata,
            segments,
            stats,
            global: RwLock::new(global),
            global_dirty: AtomicBool::new(global_dirty),
            entities: RwLock::new(HashMap::new()),
            cancel: Cancellation::new(),
            closed: AtomicBool::new(false),
            _dir: dir,
            config,
        });
        let flusher = FlushWorker::spawn(&inner, inner.config.auto_flush_interval)?;

        info!(
            root = %inner.layout.root().display(),
            encrypted = inner.access.is_encrypted(),
            compressed = inner.access.is_compressed(),
            entities = entity_count,
            "storage engine opened"
        );
        Ok(Self {
            inner,
            flusher: Mutex::new(flusher),
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns true once the engine has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the typed store of record type `R`.
    ///
    /// The first call per entity loads its index and rebuilds it from the
    /// segments if it is missing, corrupt, or stale.
    pub fn store<R: Record>(&self) -> CoreResult<EntityStore<R>> {
        EntityStore::open(Arc::clone(&self.inner))
    }

    /// Returns the names of all registered entities, sorted.
    #[must_use]
    pub fn entity_names(&self) -> Vec<String> {
        self.inner.global.read().entities()
    }

    /// Returns the metadata of an entity.
    pub fn metadata(&self, entity: &str) -> CoreResult<EntityMetadata> {
        self.inner.ensure_open()?;
        validate_entity_name(entity)?;
        self.inner.metadata.get_metadata(entity)
    }

    /// Reads the header of one segment file.
    pub fn segment_header(&self, entity: &str, id: SegmentId) -> CoreResult<Option<SegmentHeader>> {
        self.inner.ensure_open()?;
        validate_entity_name(entity)?;
        self.inner.segments.read_header(entity, id)
    }

    /// Returns per-property index statistics of an entity.
    pub fn index_stats(&self, entity: &str) -> CoreResult<BTreeMap<String, PropertyStats>> {
        self.inner.ensure_open()?;
        let state = self.inner.entity_state(entity)?;
        let stats = state.index.read().stats();
        Ok(stats)
    }

    /// Merges small sealed segments of an entity.
    ///
    /// Merged segments are built without blocking writers; writers wait
    /// only while each batch is switched in. Readers never wait. Shutting
    /// the engine down cancels the pass between batches.
    pub fn compact(&self, entity: &str) -> CoreResult<CompactionReport> {
        self.compact_with(entity, &self.inner.cancel)
    }

    /// Merges small sealed segments, observing a caller-supplied token.
    pub fn compact_with(&self, entity: &str, cancel: &Cancellation) -> CoreResult<CompactionReport> {
        self.inner.ensure_open()?;
        let state = self.inner.entity_state(entity)?;

        let report = self
            .inner
            .segments
            .compact_with(entity, cancel, &state.writer, |batch| {
                state
                    .index
                    .write()
                    .relocate(&batch.sources, batch.created, &batch.relocations);
                state.mark_dirty();
            })?;
        if !report.batches.is_empty() {
            self.inner.mark_global_dirty();
        }
        Ok(report)
    }

    /// Deletes sealed segments of an entity last modified before `cutoff`.
    ///
    /// Records held only by removed segments disappear, and their index
    /// entries with them.
    pub fn cleanup_older_than(&self, entity: &str, cutoff: Timestamp) -> CoreResult<CleanupReport> {
        self.inner.ensure_open()?;
        let state = self.inner.entity_state(entity)?;
        let _writer = state.writer.lock();

        let report = self
            .inner
            .segments
            .cleanup_older_than(entity, cutoff, &self.inner.cancel)?;
        if !report.removed.is_empty() {
            let forgotten = state.index.write().forget_segments(&report.removed);
            debug!(entity, records = forgotten, "index entries of removed segments dropped");
            state.mark_dirty();
            self.inner.mark_global_dirty();
        }
        Ok(report)
    }

    /// Deletes sealed segments older than `days` days.
    pub fn cleanup_older_than_days(&self, entity: &str, days: u32) -> CoreResult<CleanupReport> {
        let age = Duration::from_secs(u64::from(days) * SECONDS_PER_DAY);
        self.cleanup_older_than(entity, Timestamp::now().saturating_sub(age))
    }

    /// Checks the stored checksum of one segment against its file.
    pub fn verify_segment(&self, entity: &str, id: SegmentId) -> CoreResult<bool> {
        self.inner.ensure_open()?;
        validate_entity_name(entity)?;
        self.inner.segments.verify_integrity(entity, id)
    }

    /// Checks every segment of an entity.
    pub fn verify(&self, entity: &str) -> CoreResult<IntegrityReport> {
        self.inner.ensure_open()?;
        validate_entity_name(entity)?;
        let meta = self.inner.metadata.get_metadata(entity)?;

        let mut report = IntegrityReport {
            entity: entity.to_string(),
            ..IntegrityReport::default()
        };
        for info in &meta.segments {
            match self.inner.segments.verify_integrity(entity, info.id) {
                Ok(true) => report.intact.push(info.id),
                Ok(false) => report.corrupted.push(info.id),
                // Removed by concurrent maintenance.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        if !report.is_clean() {
            warn!(entity, corrupted = ?report.corrupted, "integrity verification failed");
        }
        Ok(report)
    }

    /// Declares that `entity` depends on `target`.
    ///
    /// An entity with dependents cannot be dropped.
    pub fn add_dependency(&self, entity: &str, target: &str) -> CoreResult<()> {
        self.inner.ensure_open()?;
        self.inner.entity_state(entity)?;
        self.inner.entity_state(target)?;
        self.inner.global.write().add_dependency(entity, target)?;
        self.inner.mark_global_dirty();
        Ok(())
    }

    /// Returns the entities that depend on `entity`.
    #[must_use]
    pub fn dependents_of(&self, entity: &str) -> Vec<String> {
        self.inner.global.read().dependents_of(entity)
    }

    /// Removes an entity with all its segments, metadata, and index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if other entities depend on
    /// it.
    pub fn drop_entity(&self, entity: &str) -> CoreResult<()> {
        self.inner.ensure_open()?;
        validate_entity_name(entity)?;
        let dependents = self.dependents_of(entity);
        if !dependents.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "entity {entity} is required by {}",
                dependents.join(", ")
            )));
        }

        let state = self.inner.entity_state(entity)?;
        let _writer = state.writer.lock();
        let meta = self.inner.metadata.get_metadata(entity)?;
        self.inner.segments.delete_files(&meta)?;
        self.inner.access.delete(&self.inner.layout.index_path(entity))?;
        self.inner.metadata.drop_entity(entity)?;

        state.dropped.store(true, Ordering::Release);
        self.inner.entities.write().remove(entity);
        self.inner.global.write().remove(entity);
        self.inner.mark_global_dirty();
        info!(entity, segments = meta.segments.len(), "entity dropped");
        Ok(())
    }

    /// Returns the storage rollup across all entities, freshly computed.
    pub fn global_stats(&self) -> CoreResult<GlobalStats> {
        self.inner.ensure_open()?;
        Ok(self.inner.refresh_global())
    }

    /// Returns a snapshot of engine counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Persists all dirty indexes and the global index now.
    pub fn flush(&self) -> CoreResult<()> {
        self.inner.ensure_open()?;
        self.inner.flush()
    }

    /// Stops background work and flushes.
    ///
    /// Running maintenance is cancelled between batches, the auto-flush
    /// worker is given the configured grace period, and a final flush runs.
    /// Later calls return immediately.
    pub fn shutdown(&self) -> CoreResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.cancel.cancel();

        if let Some(worker) = self.flusher.lock().take() {
            if !worker.stop(self.inner.config.shutdown_grace) {
                warn!(
                    grace = ?self.inner.config.shutdown_grace,
                    "flush worker still busy after grace period"
                );
            }
        }

        let result = self.inner.flush();
        info!(root = %self.inner.layout.root().display(), "storage engine shut down");
        result
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("root", &self.inner.layout.root())
            .field("closed", &self.is_closed())
            .field("entities", &self.entity_names())
            .finish_non_exhaustive()
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "flush during drop failed");
        }
    }
}

fn encrypted_access(
    inner: Box<dyn FileAccess>,
    encryption: &EncryptionConfig,
    salt: &[u8],
    compression: bool,
) -> CoreResult<EncryptedFileAccess> {
    let cipher = CipherService::from_passphrase(
        encryption.passphrase.as_bytes(),
        salt,
        encryption.iterations,
        encryption.algorithm,
    )?
    .with_compression(compression)
    .with_integrity_check(encryption.integrity_check);
    Ok(EncryptedFileAccess::new(inner, cipher))
}

/// Lists entity directories under the data root that hold metadata.
fn discover_entities(
    dir: Option<&DataDir>,
    access: &dyn FileAccess,
    layout: &StorageLayout,
) -> Vec<String> {
    if dir.is_none() {
        return Vec::new();
    }
    let entries = match std::fs::read_dir(layout.root()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %layout.root().display(), error = %e, "could not scan data root");
            return Vec::new();
        }
    };

    let mut found: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| validate_entity_name(name).is_ok())
        .filter(|name| access.exists(&layout.metadata_path(name)))
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexValue;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        body: String,
    }

    impl Record for Note {
        const ENTITY: &'static str = "note";

        fn key(&self) -> String {
            self.id.clone()
        }

        fn last_modified(&self) -> Timestamp {
            Timestamp(1)
        }

        fn index_values(&self) -> Vec<(String, IndexValue)> {
            vec![("body".into(), IndexValue::from(self.body.as_str()))]
        }
    }

    fn note(id: &str, body: &str) -> Note {
        Note {
            id: id.into(),
            body: body.into(),
        }
    }

    fn memory_engine() -> StorageEngine {
        StorageEngine::open_in_memory(EngineConfig::new("/mem").auto_flush_interval(Duration::ZERO))
            .unwrap()
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let engine = memory_engine();
        let notes = engine.store::<Note>().unwrap();
        engine.shutdown().unwrap();

        assert!(engine.is_closed());
        assert!(matches!(engine.store::<Note>(), Err(CoreError::EngineClosed)));
        assert!(matches!(notes.load(), Err(CoreError::EngineClosed)));
        assert!(engine.shutdown().is_ok());
    }

    #[test]
    fn entities_register_on_first_use() {
        let engine = memory_engine();
        assert!(engine.entity_names().is_empty());
        engine.store::<Note>().unwrap();
        assert_eq!(engine.entity_names(), vec!["note".to_string()]);
    }

    #[test]
    fn invalid_entity_name_rejected() {
        let engine = memory_engine();
        assert!(matches!(
            engine.metadata("../etc"),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn drop_entity_refused_while_depended_on() {
        let engine = memory_engine();
        engine.store::<Note>().unwrap().save(&[note("a", "x")]).unwrap();
        engine.metadata("folder").unwrap();
        engine.add_dependency("folder", "note").unwrap();

        let err = engine.drop_entity("note").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        engine.drop_entity("folder").unwrap();
        engine.drop_entity("note").unwrap();
        assert!(engine.entity_names().is_empty());
        assert!(engine.metadata("note").unwrap().segments.is_empty());
    }

    #[test]
    fn dropped_store_handle_is_unusable() {
        let engine = memory_engine();
        let notes = engine.store::<Note>().unwrap();
        notes.save(&[note("a", "x")]).unwrap();
        engine.drop_entity("note").unwrap();

        assert!(matches!(
            notes.save(&[note("b", "y")]),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(engine.store::<Note>().unwrap().load().unwrap().is_empty());
    }

    #[test]
    fn flush_persists_index_at_current_sequence() {
        let engine = memory_engine();
        let notes = engine.store::<Note>().unwrap();
        notes.save(&[note("a", "x")]).unwrap();
        engine.flush().unwrap();

        let sequence = engine.metadata("note").unwrap().write_sequence;
        let bytes = engine
            .inner
            .access
            .read_all_bytes(&engine.inner.layout.index_path("note"))
            .unwrap();
        let index = crate::index::decode_index(&bytes, QueryCache::disabled()).unwrap();
        assert_eq!(index.synced_sequence(), sequence);
        assert_eq!(index.len(), 1);
        assert_eq!(engine.stats().index_flushes, 1);
    }

    #[test]
    fn global_stats_cover_all_entities() {
        let engine = memory_engine();
        engine
            .store::<Note>()
            .unwrap()
            .save(&[note("a", "x"), note("b", "y")])
            .unwrap();

        let stats = engine.global_stats().unwrap();
        assert_eq!(stats.entity_count, 1);
        assert_eq!(stats.total_segments, 1);
        assert_eq!(stats.active_segments, 1);
        assert_eq!(stats.total_records, 2);
    }

    #[test]
    fn verify_reports_each_segment() {
        let engine = StorageEngine::open_in_memory(
            EngineConfig::new("/mem")
                .max_records_per_segment(1)
                .auto_flush_interval(Duration::ZERO),
        )
        .unwrap();
        engine
            .store::<Note>()
            .unwrap()
            .save(&[note("a", "x"), note("b", "y")])
            .unwrap();

        let report = engine.verify("note").unwrap();
        assert!(report.is_clean());
        assert_eq!(report.intact.len(), 2);
    }

    #[test]
    fn flush_worker_runs_on_interval() {
        let engine = StorageEngine::open_in_memory(
            EngineConfig::new("/mem").auto_flush_interval(Duration::from_millis(10)),
        )
        .unwrap();
        engine.store::<Note>().unwrap().save(&[note("a", "x")]).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.stats().index_flushes == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(engine.stats().index_flushes >= 1);
        engine.shutdown().unwrap();
    }
}
