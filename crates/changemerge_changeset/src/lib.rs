//! # changemerge Changeset
//!
//! Value types shared by every changemerge crate.
//!
//! This crate provides:
//! - [`Value`] and [`ChangeRecord`] for row-level mutations
//! - [`Changeset`] for an ordered, content-addressed revision
//! - [`ConflictCause`], [`ConflictOccurrence`] and [`Resolution`] for apply-time conflicts
//! - The [`RowStore`] and [`ConflictHandler`] traits that form the boundary between the
//!   merge engine and the relational storage engine
//!
//! This is a pure types crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changeset;
mod conflict;
mod error;
mod record;
mod store;
mod value;

pub use changeset::Changeset;
pub use conflict::{ConflictCause, ConflictOccurrence, Resolution};
pub use error::{StoreError, StoreResult};
pub use record::{ChangeRecord, DbOpcode};
pub use store::{ApplyStatus, ConflictHandler, RowStore};
pub use value::Value;
