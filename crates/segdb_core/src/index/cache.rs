//! Query result cache.

use super::value::IndexValue;
use crate::types::SegmentId;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Shape of a cacheable query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryShape {
    /// Equality on one property.
    Equals {
        /// Property name.
        property: String,
        /// Value searched for.
        value: IndexValue,
    },
    /// Inclusive range on one property.
    Range {
        /// Property name.
        property: String,
        /// Lower bound.
        min: IndexValue,
        /// Upper bound.
        max: IndexValue,
    },
}

impl QueryShape {
    /// Returns the property the query filters on.
    #[must_use]
    pub fn property(&self) -> &str {
        match self {
            Self::Equals { property, .. } | Self::Range { property, .. } => property,
        }
    }

    /// Returns the cache key of this shape.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// A live entry was found.
    Hit(Vec<SegmentId>),
    /// No entry.
    Miss,
    /// An entry was found past its expiry and evicted.
    Expired,
}

#[derive(Debug, Clone)]
struct CachedQuery {
    property: String,
    segments: Vec<SegmentId>,
    expires_at: Instant,
}

/// Caches candidate segment lists of recent queries.
///
/// Entries expire after the configured time-to-live; an expired entry is a
/// miss, never a stale hit. When full, the entry closest to expiry is
/// evicted.
#[derive(Debug, Clone)]
pub struct QueryCache {
    entries: HashMap<u64, CachedQuery>,
    capacity: usize,
    ttl: Duration,
    enabled: bool,
}

impl QueryCache {
    /// Creates a cache.
    #[must_use]
    pub fn new(enabled: bool, capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            ttl,
            enabled: enabled && capacity > 0,
        }
    }

    /// Creates a cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false, 0, Duration::ZERO)
    }

    /// Looks up a query shape.
    pub fn get(&mut self, shape: &QueryShape) -> CacheLookup {
        self.get_at(shape, Instant::now())
    }

    fn get_at(&mut self, shape: &QueryShape, now: Instant) -> CacheLookup {
        if !self.enabled {
            return CacheLookup::Miss;
        }
        let key = shape.fingerprint();
        match self.entries.get(&key) {
            None => return CacheLookup::Miss,
            Some(cached) if cached.expires_at > now => {
                return CacheLookup::Hit(cached.segments.clone())
            }
            Some(_) => {}
        }
        self.entries.remove(&key);
        CacheLookup::Expired
    }

    /// Stores the candidate segments of a query shape.
    pub fn insert(&mut self, shape: &QueryShape, segments: Vec<SegmentId>) {
        self.insert_at(shape, segments, Instant::now());
    }

    fn insert_at(&mut self, shape: &QueryShape, segments: Vec<SegmentId>, now: Instant) {
        if !self.enabled {
            return;
        }
        let key = shape.fingerprint();
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.retain(|_, cached| cached.expires_at > now);
            if self.entries.len() >= self.capacity {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, cached)| cached.expires_at)
                    .map(|(k, _)| *k);
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(
            key,
            CachedQuery {
                property: shape.property().to_string(),
                segments,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drops cached queries on `property`.
    pub fn invalidate_property(&mut self, property: &str) {
        self.entries.retain(|_, cached| cached.property != property);
    }

    /// Drops cached queries that reference any of `segments`.
    pub fn invalidate_segments(&mut self, segments: &[SegmentId]) {
        self.entries
            .retain(|_, cached| !cached.segments.iter().any(|s| segments.contains(s)));
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of cached queries, including expired ones not yet
    /// evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(value: i64) -> QueryShape {
        QueryShape::Equals {
            property: "age".into(),
            value: IndexValue::from(value),
        }
    }

    #[test]
    fn hit_after_insert() {
        let mut cache = QueryCache::new(true, 4, Duration::from_secs(60));
        assert_eq!(cache.get(&shape(1)), CacheLookup::Miss);
        cache.insert(&shape(1), vec![SegmentId::new(3)]);
        assert_eq!(cache.get(&shape(1)), CacheLookup::Hit(vec![SegmentId::new(3)]));
        assert_eq!(cache.get(&shape(2)), CacheLookup::Miss);
    }

    #[test]
    fn expired_entry_is_a_miss_and_evicted() {
        let mut cache = QueryCache::new(true, 4, Duration::from_secs(10));
        let start = Instant::now();
        cache.insert_at(&shape(1), vec![SegmentId::new(1)], start);

        let later = start + Duration::from_secs(11);
        assert_eq!(cache.get_at(&shape(1), later), CacheLookup::Expired);
        assert_eq!(cache.get_at(&shape(1), later), CacheLookup::Miss);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_bounded() {
        let mut cache = QueryCache::new(true, 2, Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at(&shape(1), vec![], start);
        cache.insert_at(&shape(2), vec![], start + Duration::from_secs(1));
        cache.insert_at(&shape(3), vec![], start + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        let now = start + Duration::from_secs(3);
        assert_eq!(cache.get_at(&shape(1), now), CacheLookup::Miss);
        assert!(matches!(cache.get_at(&shape(3), now), CacheLookup::Hit(_)));
    }

    #[test]
    fn invalidation() {
        let mut cache = QueryCache::new(true, 8, Duration::from_secs(60));
        cache.insert(&shape(1), vec![SegmentId::new(1)]);
        cache.insert(&shape(2), vec![SegmentId::new(2)]);
        cache.insert(
            &QueryShape::Equals {
                property: "name".into(),
                value: IndexValue::from("x"),
            },
            vec![SegmentId::new(2)],
        );

        cache.invalidate_segments(&[SegmentId::new(1)]);
        assert_eq!(cache.len(), 2);

        cache.invalidate_property("age");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disabled_cache_never_hits() {
        let mut cache = QueryCache::disabled();
        cache.insert(&shape(1), vec![SegmentId::new(1)]);
        assert_eq!(cache.get(&shape(1)), CacheLookup::Miss);
    }
}
