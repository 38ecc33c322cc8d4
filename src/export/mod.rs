//! Decision exports: CSV for spreadsheets, JSONL for the streaming run log.

pub mod csv;
pub mod jsonl;
