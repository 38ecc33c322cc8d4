//! The decision resolver: one message in, one final classification out.
//!
//! Combines the oracle's (possibly partial, possibly absent) output with the
//! heuristic labels, applies the confidence gate, and gives the override
//! rules the final word. Pure (no store, no network, no clock), so every
//! path is unit-testable.

use tracing::debug;

use crate::model::message::{clip_chars, REASON_MAX_CHARS, SUMMARY_MAX_CHARS};
use crate::model::{ClassificationRecord, Decision};
use crate::oracle::ParseOutcome;
use crate::rules::{overrides, RuleSet};

/// Maximum length of the implied-category digest fed to the override engine.
const CATEGORY_MAX_CHARS: usize = 120;

/// Resolver settings, owned by the caller (no globals).
#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    /// Minimum confidence for a `delete` to stand; below it the decision is
    /// downgraded to `archive`. 0 disables the gate.
    pub min_conf_delete: f64,
    /// Maximum labels on the final record.
    pub label_cap: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            min_conf_delete: 0.0,
            label_cap: 5,
        }
    }
}

/// Resolve the final classification for one message.
///
/// `oracle` is `None` when no call was made (oracle disabled, or the
/// transport gave up); a call whose response salvaged nothing is treated
/// identically. State machine per message:
/// `unset → {fallback | oracle-decision} → confidence-gated → overridden → final`.
pub fn resolve(
    rules: &RuleSet,
    opts: &ResolverOptions,
    sender: &str,
    subject: &str,
    heuristic_labels: &[String],
    oracle: Option<&ParseOutcome>,
) -> ClassificationRecord {
    // Defaults when nothing usable comes back.
    let mut decision = Decision::Archive;
    let mut confidence = 0.5;
    let mut reason = "fallback".to_string();
    let mut summary = None;
    let mut oracle_labels: Vec<String> = Vec::new();

    if let Some(fields) = oracle.and_then(ParseOutcome::fields) {
        // Out-of-enum decisions are coerced, not rejected.
        decision = fields
            .decision
            .as_deref()
            .and_then(Decision::parse)
            .unwrap_or(Decision::Archive);
        confidence = fields.confidence.unwrap_or(0.5);
        reason = match fields.reason.as_deref() {
            Some(r) if !r.trim().is_empty() => clip_chars(r, REASON_MAX_CHARS),
            _ => "fallback".to_string(),
        };
        summary = fields
            .summary
            .as_deref()
            .map(|s| clip_chars(s, SUMMARY_MAX_CHARS));
        oracle_labels = fields.category.clone();
    }

    // Confidence gate: low-confidence deletions are never trusted.
    if decision == Decision::Delete && confidence < opts.min_conf_delete {
        decision = Decision::Archive;
        reason = format!("{reason} | downgraded: conf<{}", opts.min_conf_delete)
            .trim()
            .to_string();
        debug!(confidence, threshold = opts.min_conf_delete, "Delete downgraded to archive");
    }

    // Oracle labels win when present; heuristics only fill a void.
    let labels = if oracle_labels.is_empty() {
        dedup_capped(heuristic_labels, opts.label_cap)
    } else {
        dedup_capped(&oracle_labels, opts.label_cap)
    };

    // The implied category comes from the oracle's recovered categories
    // only; a heuristic-only run leaves it empty.
    let implied_category = if oracle_labels.is_empty() {
        None
    } else {
        Some(clip_chars(&oracle_labels.join(", "), CATEGORY_MAX_CHARS))
    };

    if let Some(out) = overrides::apply(rules, sender, subject, implied_category.as_deref()) {
        if out.decision != decision {
            decision = out.decision;
            reason = format!("{reason} | {}", out.reason)
                .trim_matches(&[' ', '|'][..])
                .to_string();
        }
    }

    ClassificationRecord {
        decision,
        reason,
        confidence,
        labels,
        summary,
    }
}

/// Deduplicate preserving first occurrence, cap the length.
fn dedup_capped(labels: &[String], cap: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if out.len() >= cap {
            break;
        }
        if !out.iter().any(|l| l == label) {
            out.push(label.clone());
        }
    }
    out
}
