//! Message rows and classification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a stored reason, in characters.
pub const REASON_MAX_CHARS: usize = 300;

/// Maximum length of a stored summary, in characters.
pub const SUMMARY_MAX_CHARS: usize = 1000;

/// What to do with a message.
///
/// `keep` leaves it in the inbox, `archive` removes it from the inbox but
/// retains it, `delete` sends it to the trash. The engine only ever records
/// the value; acting on it is the applier's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Keep,
    Archive,
    Delete,
}

impl Decision {
    /// The lowercase wire/store form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Archive => "archive",
            Self::Delete => "delete",
        }
    }

    /// Parse a lowercase decision string. Returns `None` for anything
    /// outside the three valid values; callers decide how to coerce.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keep" => Some(Self::Keep),
            "archive" => Some(Self::Archive),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The full classification attached to a message by the decision resolver.
///
/// `labels` is an ordered set: deduplicated, first occurrence wins, bounded
/// cardinality (the resolver caps it at 5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub decision: Decision,
    pub reason: String,
    pub confidence: f64,
    pub labels: Vec<String>,
    pub summary: Option<String>,
}

impl ClassificationRecord {
    /// Labels joined for storage (`"Newsletter, Promotions"`), or `None`
    /// when empty so the store's merge-if-absent semantics can fill it later.
    pub fn labels_joined(&self) -> Option<String> {
        if self.labels.is_empty() {
            None
        } else {
            Some(self.labels.join(", "))
        }
    }
}

/// A message as stored, including any classification set so far.
///
/// Immutable once ingested except for the classification fields, which start
/// `None` and are set by the decision resolver (or by propagation from a
/// duplicate-group representative).
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    /// RFC 5322 `Message-ID`, used by the applier to find the message remotely.
    pub msg_id: String,
    /// Free-form `From` header (display name + address), as received.
    pub from_addr: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub has_attachments: bool,
    pub body: String,
    /// Duplicate-group key, computed once at ingestion.
    pub fingerprint: String,

    pub decision: Option<Decision>,
    pub reason: Option<String>,
    pub confidence: Option<f64>,
    /// Comma-joined label list (`"Newsletter, Promotions"`).
    pub labels: Option<String>,
    pub summary: Option<String>,
}

impl Message {
    /// Whether any classification field has been populated.
    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }
}

/// A message about to be inserted (no id, no classification yet).
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub msg_id: String,
    pub from_addr: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub has_attachments: bool,
    pub body: String,
    pub fingerprint: String,
}

/// Truncate to at most `max` characters (not bytes), trimming trailing
/// whitespace left by the cut.
pub fn clip_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_roundtrip() {
        for d in [Decision::Keep, Decision::Archive, Decision::Delete] {
            assert_eq!(Decision::parse(d.as_str()), Some(d));
        }
    }

    #[test]
    fn test_decision_rejects_unknown() {
        assert_eq!(Decision::parse("purge"), None);
        assert_eq!(Decision::parse("KEEP"), None);
        assert_eq!(Decision::parse(""), None);
    }

    #[test]
    fn test_labels_joined_empty_is_none() {
        let rec = ClassificationRecord {
            decision: Decision::Archive,
            reason: "fallback".to_string(),
            confidence: 0.5,
            labels: vec![],
            summary: None,
        };
        assert_eq!(rec.labels_joined(), None);
    }

    #[test]
    fn test_labels_joined() {
        let rec = ClassificationRecord {
            decision: Decision::Delete,
            reason: "promo".to_string(),
            confidence: 0.9,
            labels: vec!["Newsletter".to_string(), "Promotions".to_string()],
            summary: None,
        };
        assert_eq!(rec.labels_joined().as_deref(), Some("Newsletter, Promotions"));
    }

    #[test]
    fn test_clip_chars_multibyte() {
        // Cuts on character boundaries, never bytes
        assert_eq!(clip_chars("café con leña", 4), "café");
        assert_eq!(clip_chars("short", 100), "short");
    }
}
