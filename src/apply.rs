//! Mapping decisions onto a mailbox provider.
//!
//! The classification engine is side-effect-free with respect to the
//! mailbox: it only writes decision values into the store. This module owns
//! the boundary that turns those values into provider operations, and ships
//! a dry-run provider that prints the plan instead of executing it. Delete
//! is realized as a marker label (`_AI_DELETE`), never as a direct trash
//! call; emptying that label is a separate, human-triggered step.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::Result;
use crate::model::{Decision, Message};
use crate::store::SqliteStore;

/// Marker label attached to messages decided `delete`.
pub const DELETE_MARKER_LABEL: &str = "_AI_DELETE";

/// A remote mailbox. Implementations batch internally where the backend
/// supports it; ids are RFC 5322 Message-IDs.
pub trait MailboxProvider {
    /// Create the label if missing; return its provider-side id.
    fn ensure_label(&mut self, name: &str) -> Result<String>;
    /// Add a label to a set of messages.
    fn add_label(&mut self, label_id: &str, msg_ids: &[String]) -> Result<()>;
    /// Remove a set of messages from the inbox (retain elsewhere).
    fn archive(&mut self, msg_ids: &[String]) -> Result<()>;
    /// Move a set of messages to the trash.
    fn trash(&mut self, msg_ids: &[String]) -> Result<()>;
}

/// Provider that records what it would have done.
#[derive(Debug, Default)]
pub struct DryRunProvider {
    pub planned: Vec<String>,
}

impl MailboxProvider for DryRunProvider {
    fn ensure_label(&mut self, name: &str) -> Result<String> {
        self.planned.push(format!("ensure label '{name}'"));
        Ok(name.to_string())
    }

    fn add_label(&mut self, label_id: &str, msg_ids: &[String]) -> Result<()> {
        self.planned
            .push(format!("add '{label_id}' to {} message(s)", msg_ids.len()));
        Ok(())
    }

    fn archive(&mut self, msg_ids: &[String]) -> Result<()> {
        self.planned
            .push(format!("archive {} message(s)", msg_ids.len()));
        Ok(())
    }

    fn trash(&mut self, msg_ids: &[String]) -> Result<()> {
        self.planned
            .push(format!("trash {} message(s)", msg_ids.len()));
        Ok(())
    }
}

/// Counts for the end-of-apply report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyReport {
    pub labeled: usize,
    pub archived: usize,
    pub marked_delete: usize,
    pub skipped: usize,
}

/// Apply stored decisions through a provider.
///
/// - every decided message gets its topical labels;
/// - `archive` additionally archives (only when `do_archive` is set);
/// - `delete` gets the [`DELETE_MARKER_LABEL`] instead of a trash call.
///
/// Messages without a `Message-ID` cannot be found remotely and are skipped.
pub fn apply_decisions(
    store: &SqliteStore,
    provider: &mut dyn MailboxProvider,
    do_archive: bool,
) -> Result<ApplyReport> {
    let decided = store.decided()?;
    let mut report = ApplyReport::default();

    // label name → message ids, batched per label
    let mut by_label: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut to_archive: Vec<String> = Vec::new();

    for message in &decided {
        if message.msg_id.is_empty() {
            report.skipped += 1;
            continue;
        }
        let Some(decision) = message.decision else {
            continue;
        };

        for label in message
            .labels
            .iter()
            .flat_map(|l| l.split(", "))
            .filter(|l| !l.is_empty())
        {
            by_label
                .entry(label.to_string())
                .or_default()
                .push(message.msg_id.clone());
        }

        match decision {
            Decision::Keep => {}
            Decision::Archive => {
                if do_archive {
                    to_archive.push(message.msg_id.clone());
                }
            }
            Decision::Delete => {
                by_label
                    .entry(DELETE_MARKER_LABEL.to_string())
                    .or_default()
                    .push(message.msg_id.clone());
            }
        }
    }

    for (label, ids) in &by_label {
        let label_id = provider.ensure_label(label)?;
        provider.add_label(&label_id, ids)?;
        if label == DELETE_MARKER_LABEL {
            report.marked_delete += ids.len();
        } else {
            report.labeled += ids.len();
        }
    }

    if !to_archive.is_empty() {
        provider.archive(&to_archive)?;
        report.archived = to_archive.len();
    }

    info!(
        labeled = report.labeled,
        archived = report.archived,
        marked_delete = report.marked_delete,
        skipped = report.skipped,
        "Apply finished"
    );
    Ok(report)
}
