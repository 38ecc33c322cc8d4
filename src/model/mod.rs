//! Core data types: messages, decisions, classification records.

pub mod message;

pub use message::{ClassificationRecord, Decision, Message, NewMessage};
