//! `mailtriage`: local email triage for Gmail Takeout archives.
//!
//! This crate provides the core library for ingesting MBOX archives into a
//! local store and deciding a disposition (keep/archive/delete) plus topical
//! labels for every message, combining deterministic heuristics, an optional
//! local LLM oracle, and user-authored override rules.

pub mod apply;
pub mod config;
pub mod decide;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod ingest;
pub mod model;
pub mod oracle;
pub mod rules;
pub mod store;
