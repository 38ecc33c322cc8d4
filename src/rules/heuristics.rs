//! Heuristic label matcher.
//!
//! Two ordered tables are evaluated independently and their hits unioned in
//! first-seen order: domain/address rules against the extracted sender
//! address (and its domain), subject rules against the normalized subject.
//! Pure and never failing: unmatched input yields an empty list, which is
//! a valid result, not an error.

use crate::fingerprint::{address_domain, extract_address, normalize_subject};
use crate::rules::RuleSet;

/// Match a message's sender and subject against the heuristic tables.
///
/// Labels are deduplicated preserving insertion order and capped at `cap`.
pub fn match_labels(rules: &RuleSet, sender: &str, subject: &str, cap: usize) -> Vec<String> {
    let address = extract_address(sender);
    let domain = address_domain(&address);
    let subject_norm = normalize_subject(subject);

    let mut labels: Vec<String> = Vec::new();

    for rule in &rules.domain_rules {
        if rule.pattern.is_match(&address) || (!domain.is_empty() && rule.pattern.is_match(domain))
        {
            push_labels(&mut labels, &rule.labels, cap);
        }
    }

    for rule in &rules.subject_rules {
        if rule.pattern.is_match(&subject_norm) {
            push_labels(&mut labels, &rule.labels, cap);
        }
    }

    labels
}

fn push_labels(acc: &mut Vec<String>, labels: &[String], cap: usize) {
    for label in labels {
        if acc.len() >= cap {
            return;
        }
        if !acc.iter().any(|l| l == label) {
            acc.push(label.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LabelRuleConfig, RulesConfig};

    fn rules(domain: &[(&str, &[&str])], subject: &[(&str, &[&str])]) -> RuleSet {
        let table = |entries: &[(&str, &[&str])]| {
            entries
                .iter()
                .map(|(p, ls)| LabelRuleConfig {
                    pattern: (*p).to_string(),
                    labels: ls.iter().map(|l| (*l).to_string()).collect(),
                })
                .collect()
        };
        let cfg = RulesConfig {
            domain: table(domain),
            subject: table(subject),
            overrides: vec![],
        };
        RuleSet::compile(&cfg).expect("test rules compile")
    }

    #[test]
    fn test_domain_rule_matches_address_and_domain() {
        let rs = rules(&[("newsletter", &["Newsletter"])], &[]);
        assert_eq!(
            match_labels(&rs, "promo@newsletter.example.com", "hi", 3),
            vec!["Newsletter"]
        );
        // Pattern also matches when only the local part carries the token
        assert_eq!(
            match_labels(&rs, "newsletter@shop.example", "hi", 3),
            vec!["Newsletter"]
        );
    }

    #[test]
    fn test_subject_rule_matches_normalized_subject() {
        let rs = rules(&[], &[("flash sale|% off", &["Promotions"])]);
        // Whitespace collapses and case folds before matching
        assert_eq!(
            match_labels(&rs, "a@b.example", "FLASH   Sale now", 3),
            vec!["Promotions"]
        );
    }

    #[test]
    fn test_union_preserves_first_seen_order_and_dedups() {
        let rs = rules(
            &[("shop", &["Shopping", "Promotions"])],
            &[("sale", &["Promotions", "Newsletter"])],
        );
        assert_eq!(
            match_labels(&rs, "noreply@shop.example", "big sale", 3),
            vec!["Shopping", "Promotions", "Newsletter"]
        );
    }

    #[test]
    fn test_cap_applies_across_tables() {
        let rs = rules(
            &[("x", &["A", "B"])],
            &[("y", &["C", "D"])],
        );
        assert_eq!(match_labels(&rs, "x@x.example", "y", 3), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let rs = rules(&[("zzz", &["Z"])], &[]);
        assert!(match_labels(&rs, "a@b.example", "hello", 3).is_empty());
        assert!(match_labels(&rs, "", "", 3).is_empty());
    }
}
