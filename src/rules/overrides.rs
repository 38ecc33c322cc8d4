//! User override rules: the final word on a decision.
//!
//! Overrides run after the oracle and the confidence gate, and can overturn
//! both. Evaluation order:
//!
//! 1. If the implied category mentions a newsletter/promotion token, force
//!    `delete` unconditionally. This short-circuit outranks the whole rule
//!    list, including rules written to keep specific promotional senders.
//! 2. Otherwise scan the ordered rule list; the first rule whose sender AND
//!    subject patterns both match wins.
//! 3. No match leaves the decision untouched.
//!
//! Patterns use search semantics (match anywhere) unless anchored.

use crate::model::Decision;
use crate::rules::RuleSet;

/// The result of a matching override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideOutcome {
    pub decision: Decision,
    pub reason: String,
}

/// Reason attached by the category short-circuit.
pub const CATEGORY_OVERRIDE_REASON: &str = "rule: category promo/newsletter";

/// Apply the override rules to a decided message.
///
/// `implied_category` is an explicit, caller-produced digest of what the
/// upstream signals thought the message was (typically the oracle's
/// recovered category labels joined). `None` skips the short-circuit.
///
/// Returns `Some` when a rule fired (even if it confirms the current
/// decision), `None` when nothing matched.
pub fn apply(
    rules: &RuleSet,
    sender: &str,
    subject: &str,
    implied_category: Option<&str>,
) -> Option<OverrideOutcome> {
    if let Some(category) = implied_category {
        let category = category.to_lowercase();
        if category.contains("newsletter")
            || category.contains("promotion")
            || category.contains("promotions")
        {
            return Some(OverrideOutcome {
                decision: Decision::Delete,
                reason: CATEGORY_OVERRIDE_REASON.to_string(),
            });
        }
    }

    let sender = sender.to_lowercase();
    let subject = subject.to_lowercase();
    for rule in &rules.overrides {
        if rule.sender.is_match(&sender) && rule.subject.is_match(&subject) {
            return Some(OverrideOutcome {
                decision: rule.decision,
                reason: rule.reason.clone(),
            });
        }
    }

    None
}
