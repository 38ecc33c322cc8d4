//! Rule tables: heuristic label matching and user override rules.
//!
//! Patterns are authored as strings in the configuration and compiled once
//! into a [`RuleSet`] here. Compilation is the only place a rule can fail;
//! after it, every rule is a total function over (sender, subject).

pub mod heuristics;
pub mod overrides;

use regex::{Regex, RegexBuilder};

use crate::config::RulesConfig;
use crate::error::{Result, TriageError};
use crate::model::Decision;

/// A compiled heuristic table entry.
#[derive(Debug)]
pub struct LabelRule {
    pub pattern: Regex,
    pub labels: Vec<String>,
}

/// A compiled override rule.
#[derive(Debug)]
pub struct OverrideRule {
    /// Tested against the lowercased sender address, search semantics.
    pub sender: Regex,
    /// Tested against the lowercased subject, case-insensitive.
    pub subject: Regex,
    pub decision: Decision,
    pub reason: String,
}

/// All compiled rules, passed explicitly into the matcher and the resolver.
#[derive(Debug, Default)]
pub struct RuleSet {
    pub domain_rules: Vec<LabelRule>,
    pub subject_rules: Vec<LabelRule>,
    pub overrides: Vec<OverrideRule>,
}

impl RuleSet {
    /// Compile a configuration's rule tables.
    ///
    /// Order is preserved throughout: heuristic tables accumulate labels in
    /// table order, and the override list is first-match-wins.
    pub fn compile(cfg: &RulesConfig) -> Result<Self> {
        let mut domain_rules = Vec::with_capacity(cfg.domain.len());
        for rule in &cfg.domain {
            domain_rules.push(LabelRule {
                pattern: compile_pattern(&rule.pattern, false)?,
                labels: rule.labels.clone(),
            });
        }

        let mut subject_rules = Vec::with_capacity(cfg.subject.len());
        for rule in &cfg.subject {
            subject_rules.push(LabelRule {
                pattern: compile_pattern(&rule.pattern, true)?,
                labels: rule.labels.clone(),
            });
        }

        let mut overrides = Vec::with_capacity(cfg.overrides.len());
        for rule in &cfg.overrides {
            let decision = Decision::parse(&rule.decision).ok_or_else(|| {
                TriageError::InvalidRule {
                    pattern: rule.decision.clone(),
                    reason: "decision must be keep, archive or delete".to_string(),
                }
            })?;
            overrides.push(OverrideRule {
                sender: compile_pattern(&rule.sender, false)?,
                subject: compile_pattern(&rule.subject, true)?,
                decision,
                reason: rule.reason.clone(),
            });
        }

        Ok(Self {
            domain_rules,
            subject_rules,
            overrides,
        })
    }
}

fn compile_pattern(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| TriageError::InvalidRule {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
