//! Prompt rendering for the classification oracle.

use crate::model::message::clip_chars;

/// The classification prompt. The model is asked for strict JSON; the
/// salvage parser assumes it will not always get it.
const DECIDE_PROMPT: &str = r#"You are an email triage assistant that classifies e-mails and decides what to do with them.

Possible decisions:
- "keep"    : leave in the inbox (useful / sensitive / action needed soon)
- "archive" : remove from the inbox (retain in All Mail)
- "delete"  : send to the trash (no value or redundant)

Policy (cautious but effective):
- Keep security, banking, invoices, HR, health, and recent important confirmations.
- Archive recent newsletters/promotions and non-critical but possibly useful items.
- Delete old promotions/newsletters, ads, and redundant technical noise.

Decide only from the sender, subject and body below.
Be concise, and answer with STRICT JSON using these keys:

{"category": ["..."], "decision": "keep|archive|delete", "confidence": 0.0-1.0, "reason": "...", "summary": "..."}

From: {from_addr}
Subject: {subject}
---
{body}
---
"#;

/// Render the prompt for one message, clipping the body excerpt.
pub fn render(from_addr: &str, subject: &str, body: &str, clip: usize) -> String {
    DECIDE_PROMPT
        .replace("{from_addr}", from_addr)
        .replace("{subject}", subject)
        .replace("{body}", &clip_chars(body, clip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_fields() {
        let p = render("a@b.example", "Hello", "body text", 1500);
        assert!(p.contains("From: a@b.example"));
        assert!(p.contains("Subject: Hello"));
        assert!(p.contains("body text"));
        assert!(!p.contains("{from_addr}"));
    }

    #[test]
    fn test_render_clips_body() {
        let long = "x".repeat(5000);
        let p = render("a@b.example", "s", &long, 1500);
        assert!(p.len() < 3000);
    }
}
