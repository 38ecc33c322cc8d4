//! SQLite-backed message store.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::Result;
use crate::model::{ClassificationRecord, Decision, Message, NewMessage};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  msg_id TEXT NOT NULL DEFAULT '',
  from_addr TEXT NOT NULL DEFAULT '',
  subject TEXT NOT NULL DEFAULT '',
  date TEXT,
  ts INTEGER,
  size_bytes INTEGER NOT NULL DEFAULT 0,
  has_attachments INTEGER NOT NULL DEFAULT 0,
  body TEXT NOT NULL DEFAULT '',
  fingerprint TEXT NOT NULL,
  decision TEXT CHECK (decision IN ('keep','archive','delete')),
  reason TEXT,
  confidence REAL,
  labels TEXT,
  summary TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(ts);
CREATE INDEX IF NOT EXISTS idx_messages_from ON messages(from_addr);
CREATE INDEX IF NOT EXISTS idx_messages_fingerprint ON messages(fingerprint);
";

/// Corpus-level statistics for the `stats` command.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total: u64,
    pub decided: u64,
    pub text_bytes: u64,
    pub with_attachments: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// SQLite-backed message store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(path = %path.display(), "Opened store");
        Ok(Self { conn })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Begin an explicit transaction. Used for batched commits during long
    /// runs; work since the last commit is lost on a crash, by design.
    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Commit the current transaction. Failure is fatal to the run.
    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Insert a freshly ingested message and return its id.
    pub fn insert_message(&self, m: &NewMessage) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO messages
               (msg_id, from_addr, subject, date, ts, size_bytes, has_attachments, body, fingerprint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                m.msg_id,
                m.from_addr,
                m.subject,
                m.date.map(|d| d.to_rfc3339()),
                m.date.map(|d| d.timestamp()),
                m.size_bytes,
                m.has_attachments as i64,
                m.body,
                m.fingerprint,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Messages with no decision yet, most recent first.
    pub fn undecided(&self, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, msg_id, from_addr, subject, ts, size_bytes, has_attachments, body,
                    fingerprint, decision, reason, confidence, labels, summary
             FROM messages
             WHERE decision IS NULL
             ORDER BY ts DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_message)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Messages that already carry a decision, most recent first.
    pub fn decided(&self) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, msg_id, from_addr, subject, ts, size_bytes, has_attachments, body,
                    fingerprint, decision, reason, confidence, labels, summary
             FROM messages
             WHERE decision IS NOT NULL
             ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map([], row_to_message)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Fetch one message by id.
    pub fn get(&self, id: i64) -> Result<Option<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, msg_id, from_addr, subject, ts, size_bytes, has_attachments, body,
                    fingerprint, decision, reason, confidence, labels, summary
             FROM messages WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], row_to_message).optional()?)
    }

    /// A decided member of the fingerprint group, if any (the group's
    /// representative from an earlier run).
    pub fn decided_in_group(&self, fingerprint: &str) -> Result<Option<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, msg_id, from_addr, subject, ts, size_bytes, has_attachments, body,
                    fingerprint, decision, reason, confidence, labels, summary
             FROM messages
             WHERE fingerprint = ?1 AND decision IS NOT NULL
             ORDER BY ts DESC
             LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![fingerprint], row_to_message)
            .optional()?)
    }

    /// Attach a classification to a message.
    ///
    /// Decision, reason and confidence are set outright; labels and summary
    /// use merge-if-absent so an earlier population (e.g. a prior labeling
    /// pass) is never clobbered.
    pub fn set_classification(&self, id: i64, rec: &ClassificationRecord) -> Result<()> {
        self.conn.execute(
            "UPDATE messages SET
               decision = ?1,
               reason = ?2,
               confidence = ?3,
               labels = COALESCE(labels, ?4),
               summary = COALESCE(summary, ?5)
             WHERE id = ?6",
            params![
                rec.decision.as_str(),
                rec.reason,
                rec.confidence,
                rec.labels_joined(),
                rec.summary,
                id,
            ],
        )?;
        Ok(())
    }

    /// Rewrite only the decision and reason of an already-decided row
    /// (override re-run).
    pub fn update_decision(&self, id: i64, decision: Decision, reason: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE messages SET decision = ?1, reason = ?2 WHERE id = ?3",
            params![decision.as_str(), reason, id],
        )?;
        Ok(())
    }

    /// Propagate a decided record to the rest of its fingerprint group.
    ///
    /// Field-level set-if-absent: every classification column is filled only
    /// where it is still NULL; populated fields are never overwritten.
    /// Returns the number of sibling rows touched.
    pub fn propagate_group(
        &self,
        fingerprint: &str,
        exclude_id: i64,
        rec: &ClassificationRecord,
    ) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE messages SET
               decision = COALESCE(decision, ?1),
               reason = COALESCE(reason, ?2),
               confidence = COALESCE(confidence, ?3),
               labels = COALESCE(labels, ?4),
               summary = COALESCE(summary, ?5)
             WHERE fingerprint = ?6 AND id <> ?7
               AND (decision IS NULL OR reason IS NULL OR confidence IS NULL
                    OR labels IS NULL OR summary IS NULL)",
            params![
                rec.decision.as_str(),
                rec.reason,
                rec.confidence,
                rec.labels_joined(),
                rec.summary,
                fingerprint,
                exclude_id,
            ],
        )?;
        Ok(changed)
    }

    /// Decision value → row count, for the `preview` command.
    pub fn decision_counts(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT decision, COUNT(*) FROM messages
             WHERE decision IS NOT NULL
             GROUP BY decision
             ORDER BY decision",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Total number of messages.
    pub fn count(&self) -> Result<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
    }

    /// Corpus statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let (total, text_bytes, with_attachments, min_ts, max_ts) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(size_bytes), 0),
                    COALESCE(SUM(has_attachments), 0),
                    MIN(ts), MAX(ts)
             FROM messages",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            },
        )?;
        let decided: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE decision IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreStats {
            total,
            decided,
            text_bytes,
            with_attachments,
            oldest: min_ts.and_then(ts_to_datetime),
            newest: max_ts.and_then(ts_to_datetime),
        })
    }

    /// Top senders by message count: (from_addr, count, bytes).
    pub fn top_senders(&self, limit: usize) -> Result<Vec<(String, u64, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_addr, COUNT(*) AS c, COALESCE(SUM(size_bytes), 0)
             FROM messages
             GROUP BY from_addr
             ORDER BY c DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn ts_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let ts: Option<i64> = row.get(4)?;
    let decision: Option<String> = row.get(9)?;
    Ok(Message {
        id: row.get(0)?,
        msg_id: row.get(1)?,
        from_addr: row.get(2)?,
        subject: row.get(3)?,
        date: ts.and_then(ts_to_datetime),
        size_bytes: row.get(5)?,
        has_attachments: row.get::<_, i64>(6)? != 0,
        body: row.get(7)?,
        fingerprint: row.get(8)?,
        decision: decision.as_deref().and_then(Decision::parse),
        reason: row.get(10)?,
        confidence: row.get(11)?,
        labels: row.get(12)?,
        summary: row.get(13)?,
    })
}
