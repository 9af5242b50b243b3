//! # changemerge Store
//!
//! In-memory relational store used by changemerge tests, tools and benchmarks.
//!
//! This crate provides:
//! - [`MemoryDatabase`], a [`RowStore`](changemerge_changeset::RowStore) with tables,
//!   primary keys, unique indexes and foreign keys
//! - [`LocalTransaction`] for journaled local edits that can be exported as a changeset
//! - Changeset replay that reports conflicts the way an SQLite session extension does,
//!   including a deferred foreign-key check at the end of each changeset
//!
//! Every changeset apply runs inside a snapshot scope; an abort or a store error
//! leaves the database exactly as it was.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod database;
mod schema;
mod table;

pub use database::{LocalTransaction, MemoryDatabase, Violation};
pub use schema::{ColumnDef, ForeignKeyDef, OnDelete, TableSchema};
