//! Append-only JSONL decision log.
//!
//! One object per processed message, flushed after every write so an
//! interrupted run keeps everything it logged. Purely observational; the
//! engine never reads it back.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, TriageError};
use crate::model::{ClassificationRecord, Message};

#[derive(Serialize)]
struct LogRecord<'a> {
    id: i64,
    from: &'a str,
    subject: &'a str,
    decision: &'a str,
    confidence: f64,
    reason: &'a str,
    labels: &'a [String],
    summary: Option<&'a str>,
}

pub struct DecisionLog {
    writer: BufWriter<std::fs::File>,
}

impl DecisionLog {
    /// Open the log for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TriageError::io(path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append one decision line and flush it.
    pub fn write(&mut self, message: &Message, record: &ClassificationRecord) -> Result<()> {
        let line = serde_json::to_string(&LogRecord {
            id: message.id,
            from: &message.from_addr,
            subject: &message.subject,
            decision: record.decision.as_str(),
            confidence: record.confidence,
            reason: &record.reason,
            labels: &record.labels,
            summary: record.summary.as_deref(),
        })
        .map_err(|e| TriageError::ExportError(e.to_string()))?;

        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}
