//! Duplicate-group fingerprinting.
//!
//! A fingerprint is a stable identity key derived from the normalized sender
//! address and the normalized subject. Messages sharing a fingerprint form a
//! duplicate group (repeated automated notifications, mailing-list blasts),
//! and only one member of a group is ever sent to the oracle.
//!
//! Fingerprinting is a total, pure function: absent or garbled headers
//! degrade to the empty string, never to an error, and the same normalized
//! inputs always produce the same key.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Address-like tokens inside a free-form `From` header.
fn address_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid pattern")
    })
}

/// Extract the bare email address from a free-form sender header, lowercased.
///
/// Free-form headers usually carry a display name first (`"ACME News"
/// <news@acme.example>`), so when several address-like tokens appear the
/// *last* one is taken. When no token matches at all, the whole trimmed
/// input is lowercased and used as-is so that the function stays total.
pub fn extract_address(sender: &str) -> String {
    match address_token().find_iter(sender).last() {
        Some(m) => m.as_str().to_lowercase(),
        None => sender.trim().to_lowercase(),
    }
}

/// The domain part of an extracted address (`"news@acme.example"` →
/// `"acme.example"`), or the empty string when there is none.
pub fn address_domain(address: &str) -> &str {
    address.rsplit_once('@').map(|(_, d)| d).unwrap_or("")
}

/// Normalize a subject for matching and fingerprinting: lowercase, strip
/// diacritics (NFKD, combining marks removed), collapse whitespace runs to a
/// single space, trim.
pub fn normalize_subject(subject: &str) -> String {
    let folded: String = subject
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for ch in folded.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }
    }
    out
}

/// Compute the fingerprint for a (sender, subject) pair.
///
/// SHA-256 over `address + "|" + normalized_subject`, hex-encoded.
pub fn fingerprint(sender: &str, subject: &str) -> String {
    let address = extract_address(sender);
    let normalized = normalize_subject(subject);

    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(b"|");
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_address_bare() {
        assert_eq!(extract_address("user@example.com"), "user@example.com");
    }

    #[test]
    fn test_extract_address_display_name() {
        assert_eq!(
            extract_address("ACME News <News@Acme.Example>"),
            "news@acme.example"
        );
    }

    #[test]
    fn test_extract_address_prefers_last_token() {
        // Display names sometimes contain an address themselves; the real
        // sender is the one in the angle brackets, which comes last.
        assert_eq!(
            extract_address("\"bounce@relay.example\" <real@sender.example>"),
            "real@sender.example"
        );
    }

    #[test]
    fn test_extract_address_no_match_is_total() {
        assert_eq!(extract_address("  Mailer Daemon  "), "mailer daemon");
        assert_eq!(extract_address(""), "");
    }

    #[test]
    fn test_address_domain() {
        assert_eq!(address_domain("user@mail.example.com"), "mail.example.com");
        assert_eq!(address_domain("not-an-address"), "");
    }

    #[test]
    fn test_normalize_subject_case_and_whitespace() {
        assert_eq!(
            normalize_subject("Flash   Sale!!\t Now"),
            "flash sale!! now"
        );
    }

    #[test]
    fn test_normalize_subject_diacritics() {
        assert_eq!(normalize_subject("Réduction d'été"), "reduction d'ete");
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint("promo@shop.example", "50% OFF today");
        let b = fingerprint("promo@shop.example", "50% OFF today");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_normalizes_variants() {
        assert_eq!(
            fingerprint("Shop <promo@shop.example>", "Flash Sale!!"),
            fingerprint("promo@shop.example", "flash   sale!!")
        );
    }

    #[test]
    fn test_fingerprint_empty_inputs() {
        // Absent headers are treated as empty strings, not errors.
        let fp = fingerprint("", "");
        assert_eq!(fp.len(), 64);
        assert_ne!(fp, fingerprint("", "x"));
    }
}
