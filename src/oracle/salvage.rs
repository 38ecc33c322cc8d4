//! Tolerant parsing of oracle responses ("salvage").
//!
//! The oracle is asked for a single strict-JSON object, but real responses
//! are routinely truncated, wrapped in prose, or otherwise malformed. This
//! module recovers as much of {decision, confidence, reason, category,
//! summary} as possible:
//!
//! 1. Strict parse of the whole response.
//! 2. Take everything from the first `{`, close any unbalanced braces, and
//!    retry the strict parse.
//! 3. Independent per-field pattern extraction.
//!
//! It never fails: zero recovered fields is [`ParseOutcome::NothingRecovered`],
//! which the resolver treats exactly like a dropped call. Decision values are
//! reported as extracted; validity filtering is the resolver's job.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

/// Fields recovered from a response. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalvagedFields {
    /// Lowercased, but NOT validated against the decision enum.
    pub decision: Option<String>,
    pub confidence: Option<f64>,
    pub reason: Option<String>,
    pub category: Vec<String>,
    pub summary: Option<String>,
}

impl SalvagedFields {
    fn is_empty(&self) -> bool {
        self.decision.is_none()
            && self.confidence.is_none()
            && self.reason.is_none()
            && self.category.is_empty()
            && self.summary.is_none()
    }
}

/// Outcome of parsing one response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The full response was valid structured data.
    FullyParsed(SalvagedFields),
    /// Something was recovered, but only by repair or pattern extraction.
    PartiallyRecovered(SalvagedFields),
    /// Not a single field could be extracted.
    NothingRecovered,
}

impl ParseOutcome {
    /// The recovered fields, if any.
    pub fn fields(&self) -> Option<&SalvagedFields> {
        match self {
            Self::FullyParsed(f) | Self::PartiallyRecovered(f) => Some(f),
            Self::NothingRecovered => None,
        }
    }
}

struct FieldPatterns {
    decision: Regex,
    confidence: Regex,
    reason: Regex,
    summary: Regex,
    category: Regex,
    quoted_item: Regex,
}

fn patterns() -> &'static FieldPatterns {
    static PATTERNS: OnceLock<FieldPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let ci = |p: &str| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .dot_matches_new_line(true)
                .build()
                .expect("valid pattern")
        };
        FieldPatterns {
            decision: ci(r#""decision"\s*:\s*"([^"]+)""#),
            confidence: ci(r#""confidence"\s*:\s*([0-9.]+)"#),
            reason: ci(r#""reason"\s*:\s*"([^"]+)""#),
            summary: ci(r#""summary"\s*:\s*"([^"]+)""#),
            category: ci(r#""(?:category|labels)"\s*:\s*\[([^\]]*)\]"#),
            quoted_item: ci(r#""([^"]+)""#),
        }
    })
}

/// Parse an oracle response, salvaging what can be salvaged.
pub fn parse_response(text: &str) -> ParseOutcome {
    if text.trim().is_empty() {
        return ParseOutcome::NothingRecovered;
    }

    // 1. Strict parse of the full response.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        let fields = fields_from_value(&value);
        if !fields.is_empty() {
            return ParseOutcome::FullyParsed(fields);
        }
    }

    // 2. First `{` onward, with best-effort brace closing.
    if let Some(start) = text.find('{') {
        let mut chunk = text[start..].to_string();
        let open = chunk.matches('{').count();
        let close = chunk.matches('}').count();
        if close < open {
            chunk.push_str(&"}".repeat(open - close));
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&chunk) {
            let fields = fields_from_value(&value);
            if !fields.is_empty() {
                return ParseOutcome::PartiallyRecovered(fields);
            }
        }
    }

    // 3. Independent per-field extraction.
    let fields = extract_fields(text);
    if fields.is_empty() {
        ParseOutcome::NothingRecovered
    } else {
        ParseOutcome::PartiallyRecovered(fields)
    }
}

/// Pull fields out of a successfully parsed JSON value.
fn fields_from_value(value: &serde_json::Value) -> SalvagedFields {
    let mut fields = SalvagedFields::default();

    if let Some(d) = value.get("decision").and_then(|v| v.as_str()) {
        fields.decision = Some(d.to_lowercase());
    }
    // Confidence may arrive as a number or a numeric string.
    if let Some(c) = value.get("confidence") {
        fields.confidence = c
            .as_f64()
            .or_else(|| c.as_str().and_then(|s| s.parse::<f64>().ok()));
    }
    if let Some(r) = value.get("reason").and_then(|v| v.as_str()) {
        fields.reason = Some(r.to_string());
    }
    if let Some(s) = value.get("summary").and_then(|v| v.as_str()) {
        fields.summary = Some(s.to_string());
    }

    let category = value.get("category").or_else(|| value.get("labels"));
    match category {
        Some(serde_json::Value::Array(items)) => {
            for item in items {
                match item.as_str() {
                    Some(s) => fields.category.push(s.to_string()),
                    None => fields.category.push(item.to_string()),
                }
            }
        }
        Some(serde_json::Value::String(s)) => fields.category.push(s.clone()),
        _ => {}
    }

    fields
}

/// Per-field tolerant extraction from raw text.
fn extract_fields(text: &str) -> SalvagedFields {
    let p = patterns();
    let mut fields = SalvagedFields::default();

    if let Some(caps) = p.decision.captures(text) {
        fields.decision = Some(caps[1].to_lowercase());
    }
    if let Some(caps) = p.confidence.captures(text) {
        // Discarded silently when not parseable (e.g. "0.8.1").
        fields.confidence = caps[1].parse::<f64>().ok();
    }
    if let Some(caps) = p.reason.captures(text) {
        fields.reason = Some(caps[1].to_string());
    }
    if let Some(caps) = p.summary.captures(text) {
        fields.summary = Some(caps[1].to_string());
    }
    if let Some(caps) = p.category.captures(text) {
        for item in p.quoted_item.captures_iter(&caps[1]) {
            fields.category.push(item[1].to_string());
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_parse() {
        let out = parse_response(
            r#"{"category": ["Banking"], "decision": "keep", "confidence": 0.9, "reason": "security alert", "summary": "sign-in warning"}"#,
        );
        let ParseOutcome::FullyParsed(f) = out else {
            panic!("expected FullyParsed, got {out:?}");
        };
        assert_eq!(f.decision.as_deref(), Some("keep"));
        assert_eq!(f.confidence, Some(0.9));
        assert_eq!(f.reason.as_deref(), Some("security alert"));
        assert_eq!(f.category, vec!["Banking"]);
        assert_eq!(f.summary.as_deref(), Some("sign-in warning"));
    }

    #[test]
    fn test_decision_is_lowercased_not_validated() {
        let out = parse_response(r#"{"decision": "KEEP"}"#);
        assert_eq!(out.fields().unwrap().decision.as_deref(), Some("keep"));

        // Out-of-enum values pass through; the resolver filters them.
        let out = parse_response(r#"{"decision": "shred"}"#);
        assert_eq!(out.fields().unwrap().decision.as_deref(), Some("shred"));
    }

    #[test]
    fn test_truncated_object_is_repaired() {
        let out = parse_response(r#"{"decision": "keep", "confidence": 0.8"#);
        let ParseOutcome::PartiallyRecovered(f) = out else {
            panic!("expected PartiallyRecovered, got {out:?}");
        };
        assert_eq!(f.decision.as_deref(), Some("keep"));
        assert_eq!(f.confidence, Some(0.8));
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let out = parse_response(
            "Sure! Here is my analysis:\n{\"decision\": \"archive\", \"reason\": \"old notice\"}\nHope that helps.",
        );
        let f = out.fields().expect("recovered").clone();
        assert_eq!(f.decision.as_deref(), Some("archive"));
        assert_eq!(f.reason.as_deref(), Some("old notice"));
    }

    #[test]
    fn test_field_extraction_from_broken_text() {
        // Not valid JSON even after brace repair (stray quote), but the
        // field patterns still find what they need.
        let out = parse_response(
            r#"decision says "decision": "delete" and "confidence": 0.75 with "category": ["Promotions", "Newsletter"] somewhere"#,
        );
        let ParseOutcome::PartiallyRecovered(f) = out else {
            panic!("expected PartiallyRecovered, got {out:?}");
        };
        assert_eq!(f.decision.as_deref(), Some("delete"));
        assert_eq!(f.confidence, Some(0.75));
        assert_eq!(f.category, vec!["Promotions", "Newsletter"]);
    }

    #[test]
    fn test_unparseable_confidence_discarded_silently() {
        let out = parse_response(r#"text "decision": "keep" then "confidence": 0.8.1 end"#);
        let f = out.fields().expect("decision recovered");
        assert_eq!(f.decision.as_deref(), Some("keep"));
        assert_eq!(f.confidence, None);
    }

    #[test]
    fn test_category_as_single_string() {
        let out = parse_response(r#"{"decision": "archive", "category": "Newsletter"}"#);
        assert_eq!(out.fields().unwrap().category, vec!["Newsletter"]);
    }

    #[test]
    fn test_labels_key_accepted() {
        let out = parse_response(r#"{"labels": ["Work", "HR"]}"#);
        assert_eq!(out.fields().unwrap().category, vec!["Work", "HR"]);
    }

    #[test]
    fn test_nothing_recovered() {
        assert_eq!(parse_response(""), ParseOutcome::NothingRecovered);
        assert_eq!(parse_response("I cannot help with that."), ParseOutcome::NothingRecovered);
        assert_eq!(parse_response("{}"), ParseOutcome::NothingRecovered);
    }
}
