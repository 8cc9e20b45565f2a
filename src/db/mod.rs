//! Database module for the write journal.
//!
//! This module provides:
//! - Database initialization and schema
//! - The `Repository` over the `write_journal` table

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{JournalEntry, JournalStatus, NewJournalEntry, Repository};
