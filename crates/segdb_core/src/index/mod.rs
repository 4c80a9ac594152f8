//! Secondary indexes.
//!
//! Each entity has an [`EntityIndex`] made of one [`PropertyIndex`] per
//! indexed property, a primary-key map from record key to segment, and a
//! [`QueryCache`] of candidate segment lists.

mod cache;
mod entity;
mod entry;
mod persistence;
mod property;
mod value;

pub use cache::{CacheLookup, QueryCache, QueryShape};
pub use entity::{EntityIndex, StorageFlags};
pub use entry::IndexEntry;
pub use persistence::{decode_index, encode_index, load_index, save_index};
pub use property::{PropertyIndex, PropertyStats};
pub use value::{IndexValue, ValueKind};
