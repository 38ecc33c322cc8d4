//! MBOX ingestion into the record store.
//!
//! Streams a Gmail-Takeout-style MBOX, decodes each message with
//! `mail-parser`, computes its fingerprint, and inserts one row per message.
//! Tolerant of malformed input: a message that cannot be decoded is skipped
//! with a warning, never aborting the run.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{Result, TriageError};
use crate::fingerprint;
use crate::model::NewMessage;
use crate::store::SqliteStore;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Counts for the end-of-ingest report.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// Ingest an MBOX file into the store.
///
/// `progress` receives `(bytes_read, total_bytes)`.
pub fn ingest_mbox(
    store: &SqliteStore,
    mbox_path: &Path,
    commit_every: usize,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<IngestReport> {
    if !mbox_path.exists() {
        return Err(TriageError::FileNotFound(mbox_path.to_path_buf()));
    }
    let total_bytes = std::fs::metadata(mbox_path)
        .map_err(|e| TriageError::io(mbox_path, e))?
        .len();

    let file = std::fs::File::open(mbox_path).map_err(|e| TriageError::io(mbox_path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let mut report = IngestReport::default();
    let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut line_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut prev_line_was_empty = true;
    let mut first_line = true;
    let mut bytes_read: u64 = 0;
    let mut last_progress: u64 = 0;
    let mut since_commit = 0usize;
    const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

    info!(path = %mbox_path.display(), "Ingesting MBOX");
    store.begin()?;

    loop {
        line_buf.clear();
        let n = reader
            .read_until(b'\n', &mut line_buf)
            .map_err(|e| TriageError::io(mbox_path, e))?;
        let eof = n == 0;

        let is_separator = !eof
            && line_buf.starts_with(b"From ")
            && (first_line || prev_line_was_empty);

        if is_separator || eof {
            let buf_has_content = message_buf.iter().any(|&b| !b.is_ascii_whitespace());
            if buf_has_content {
                match ingest_one(store, &message_buf) {
                    Ok(()) => report.inserted += 1,
                    Err(e) => {
                        warn!(offset = bytes_read, error = %e, "Skipping unparseable message");
                        report.skipped += 1;
                    }
                }

                since_commit += 1;
                if since_commit >= commit_every {
                    store.commit()?;
                    store.begin()?;
                    since_commit = 0;
                }
            }
            message_buf.clear();
        }

        if eof {
            break;
        }

        if is_separator {
            // The "From " line itself is MBOX framing, not message content.
            first_line = false;
        } else {
            if first_line && !line_is_blank(&line_buf) {
                // Not MBOX framing at all: a bare RFC 5322 message still
                // ingests as a single-message file.
                first_line = false;
            }
            message_buf.extend_from_slice(&line_buf);
        }

        bytes_read += n as u64;
        prev_line_was_empty = line_is_blank(&line_buf);

        if let Some(cb) = progress {
            if bytes_read - last_progress >= PROGRESS_INTERVAL {
                cb(bytes_read, total_bytes);
                last_progress = bytes_read;
            }
        }
    }

    if let Some(cb) = progress {
        cb(total_bytes, total_bytes);
    }

    store.commit()?;
    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "Ingest finished"
    );
    Ok(report)
}

fn line_is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b'\n' || b == b'\r')
}

/// Decode one raw message and insert it.
fn ingest_one(store: &SqliteStore, raw: &[u8]) -> Result<()> {
    let parser = MessageParser::default();
    let parsed = parser.parse(raw);

    let (msg_id, from_addr, subject, date, body, has_attachments) = match parsed {
        Some(msg) => {
            let from_addr = msg
                .from()
                .and_then(|a| a.first())
                .map(|a| match (a.name(), a.address()) {
                    (Some(name), Some(addr)) => format!("{name} <{addr}>"),
                    (None, Some(addr)) => addr.to_string(),
                    (Some(name), None) => name.to_string(),
                    (None, None) => String::new(),
                })
                .unwrap_or_default();
            let subject = msg.subject().unwrap_or_default().to_string();
            let msg_id = msg
                .message_id()
                .map(|id| format!("<{id}>"))
                .unwrap_or_default();
            let date = msg.date().and_then(|d| {
                DateTime::parse_from_rfc3339(&d.to_rfc3339())
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            });
            let body = msg
                .body_text(0)
                .map(|s| s.into_owned())
                .or_else(|| msg.body_html(0).map(|html| strip_html(&html)))
                .unwrap_or_default();
            let has_attachments = msg.attachments().next().is_some();
            (msg_id, from_addr, subject, date, body, has_attachments)
        }
        None => {
            // Keep what we can: raw text after the first blank line.
            let text = String::from_utf8_lossy(raw);
            let body = text
                .split_once("\n\n")
                .map(|(_, b)| b.to_string())
                .unwrap_or_default();
            (String::new(), String::new(), String::new(), None, body, false)
        }
    };

    let message = NewMessage {
        fingerprint: fingerprint::fingerprint(&from_addr, &subject),
        size_bytes: body.len() as u64,
        msg_id,
        from_addr,
        subject,
        date,
        has_attachments,
        body,
    };
    store.insert_message(&message)?;
    Ok(())
}

/// Naive HTML-to-text for body fallback: drop tags, keep the text.
fn strip_html(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid pattern"));
    tag.replace_all(html, " ").trim().to_string()
}
