//! The message record store.
//!
//! A thin SQLite layer: one `messages` table, simple reads and writes, and a
//! fingerprint-group bulk update with field-if-absent semantics. The engine
//! treats this as an external collaborator; no storage cleverness lives
//! here.

pub mod sqlite;

pub use sqlite::{SqliteStore, StoreStats};
