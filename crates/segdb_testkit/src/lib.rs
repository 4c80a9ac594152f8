//! # segdb Testkit
//!
//! Test utilities for segdb.
//!
//! This crate provides:
//! - Temporary engines over a scratch data root
//! - Sample record types with secondary indexes
//! - Property-based test generators using proptest
//! - A reference model for checking operation sequences
//!
//! ## Usage
//!
//! ```rust,ignore
//! use segdb_testkit::prelude::*;
//!
//! #[test]
//! fn saves_people() {
//!     with_temp_engine(|engine| {
//!         let people = engine.store::<Person>().unwrap();
//!         people.save(&sample_people()).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
