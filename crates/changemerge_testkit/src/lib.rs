//! # changemerge Testkit
//!
//! Test utilities for changemerge.
//!
//! This crate provides:
//! - Fixture briefcases with a shared schema and an in-memory changeset [`Hub`]
//! - [`ScriptedStore`], a row store that raises conflicts from a script
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```
//! use changemerge_testkit::prelude::*;
//!
//! let mut hub = Hub::new();
//! let mut briefcase = new_briefcase();
//! briefcase
//!     .local(|txn| txn.insert("Element", element(1, "E1", "first")))
//!     .unwrap();
//! assert!(hub.push(&mut briefcase).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
}

pub use fixtures::*;
pub use generators::*;
pub use scripted::*;
