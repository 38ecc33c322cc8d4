//! The external classification oracle: request building, transport, and
//! tolerant response parsing.
//!
//! The oracle's output format is untrusted. Transport and parse outcomes are
//! explicit enums rather than errors: a failed call and an unsalvageable
//! response both degrade to the resolver's fallback decision, never abort a
//! batch.

pub mod client;
pub mod prompt;
pub mod salvage;

pub use client::{OllamaClient, RetryPolicy};
pub use salvage::{ParseOutcome, SalvagedFields};

/// Outcome of one oracle call, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The raw response text (which may still be malformed).
    Success(String),
    /// The endpoint was unreachable or returned a transport-level error.
    TransportFailure(String),
    /// The per-call timeout expired.
    Timeout,
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// A classification oracle. The single production implementation is
/// [`OllamaClient`]; tests substitute scripted fakes so the decision loop
/// runs without a network.
pub trait Oracle {
    /// Classify one rendered prompt. Never panics; failures are outcomes.
    fn classify(&self, prompt: &str) -> CallOutcome;

    /// Cheap ping to get the model loaded before a batch. Failure is
    /// reported but not fatal.
    fn warm_up(&self) -> CallOutcome {
        CallOutcome::Success(String::new())
    }
}
