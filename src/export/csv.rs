//! Export decisions to CSV.
//!
//! Output is UTF-8 with BOM for Excel compatibility.

use std::io::Write;
use std::path::Path;

use crate::model::Message;

/// Export decided messages to a CSV file.
///
/// Columns: Msg_ID, Decision, Confidence, Reason, Date, From, Subject, Labels
pub fn export_csv(messages: &[Message], output_path: &Path) -> anyhow::Result<usize> {
    let mut file = std::fs::File::create(output_path)?;

    // UTF-8 BOM for Excel
    file.write_all(&[0xEF, 0xBB, 0xBF])?;

    writeln!(
        file,
        "Msg_ID,Decision,Confidence,Reason,Date,From,Subject,Labels"
    )?;

    let mut count = 0usize;
    for message in messages {
        let Some(decision) = message.decision else {
            continue;
        };
        let date = message
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let confidence = message
            .confidence
            .map(|c| format!("{c:.2}"))
            .unwrap_or_default();

        writeln!(
            file,
            "{},{},{},{},{},{},{},{}",
            csv_escape(&message.msg_id),
            decision,
            confidence,
            csv_escape(message.reason.as_deref().unwrap_or("")),
            csv_escape(&date),
            csv_escape(&message.from_addr),
            csv_escape(&message.subject),
            csv_escape(message.labels.as_deref().unwrap_or("")),
        )?;
        count += 1;
    }

    Ok(count)
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Decision;

    fn decided_message(subject: &str) -> Message {
        Message {
            id: 1,
            msg_id: "<m1@example.com>".to_string(),
            from_addr: "a@b.example".to_string(),
            subject: subject.to_string(),
            date: None,
            size_bytes: 10,
            has_attachments: false,
            body: String::new(),
            fingerprint: "fp".to_string(),
            decision: Some(Decision::Delete),
            reason: Some("rule: promo subject".to_string()),
            confidence: Some(0.9),
            labels: Some("Promotions".to_string()),
            summary: None,
        }
    }

    #[test]
    fn test_csv_escape_simple() {
        assert_eq!(csv_escape("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_comma() {
        assert_eq!(csv_escape("hello, world"), "\"hello, world\"");
    }

    #[test]
    fn test_csv_escape_quotes() {
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_export_writes_bom_and_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("decisions.csv");

        let mut undecided = decided_message("skipped");
        undecided.decision = None;

        let count =
            export_csv(&[decided_message("Sale, 50% off"), undecided], &out).unwrap();
        assert_eq!(count, 1);

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
        let text = String::from_utf8_lossy(&bytes[3..]).to_string();
        assert!(text.starts_with("Msg_ID,Decision"));
        assert!(text.contains("\"Sale, 50% off\""));
        assert!(!text.contains("skipped"));
    }
}
