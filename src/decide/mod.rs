//! The decide run: drain undecided messages, resolve each, propagate across
//! duplicate groups, commit in batches.
//!
//! One message failing never aborts the batch: the failure is logged,
//! counted as a warning, and the loop moves on. Store commit failures do
//! abort, since a half-written batch is worse than a lost one.

pub mod resolver;

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::export::jsonl::DecisionLog;
use crate::model::{ClassificationRecord, Message};
use crate::oracle::{prompt, salvage, CallOutcome, Oracle, ParseOutcome};
use crate::rules::{heuristics, RuleSet};
use crate::store::SqliteStore;

pub use resolver::{resolve, ResolverOptions};

/// Options for one decide run, assembled by the CLI from config + flags.
#[derive(Debug, Clone)]
pub struct DecideOptions {
    pub limit: usize,
    pub min_conf_delete: f64,
    pub dedup: bool,
    /// Append one JSON object per processed message to this file.
    pub jsonl: Option<PathBuf>,
}

/// What a run did, for the end-of-run report.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunReport {
    pub to_process: usize,
    pub processed: usize,
    pub propagated: usize,
    pub warnings: usize,
}

/// Decide a batch of undecided messages.
///
/// `oracle` is `None` when the oracle is disabled; decisions then come from
/// the fallback default plus heuristics and override rules.
pub fn run_batch(
    store: &SqliteStore,
    oracle: Option<&dyn Oracle>,
    config: &Config,
    rules: &RuleSet,
    opts: &DecideOptions,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<RunReport> {
    let batch = store.undecided(opts.limit)?;
    let mut report = RunReport {
        to_process: batch.len(),
        ..Default::default()
    };
    info!(count = batch.len(), "Messages to decide");

    if let Some(oracle) = oracle {
        match oracle.warm_up() {
            CallOutcome::Success(_) => debug!("Oracle warm-up ok"),
            CallOutcome::Timeout => warn!("Oracle warm-up timed out"),
            CallOutcome::TransportFailure(e) => warn!(error = %e, "Oracle warm-up failed"),
        }
    }

    let mut log = match &opts.jsonl {
        Some(path) => Some(DecisionLog::append(path)?),
        None => None,
    };

    let resolver_opts = ResolverOptions {
        min_conf_delete: opts.min_conf_delete,
        label_cap: config.decide.label_cap,
    };

    let mut seen_groups: HashSet<String> = HashSet::new();
    let mut since_commit = 0usize;
    store.begin()?;

    for (i, message) in batch.iter().enumerate() {
        if let Some(cb) = progress {
            cb(i as u64, batch.len() as u64);
        }

        // Siblings of a group already handled this run were classified by
        // propagation; skip them without another oracle call.
        if opts.dedup && !seen_groups.insert(message.fingerprint.clone()) {
            continue;
        }

        match decide_one(store, oracle, config, rules, &resolver_opts, opts, message) {
            Ok((record, propagated)) => {
                report.processed += 1;
                report.propagated += propagated;
                since_commit += 1;
                if let Some(log) = log.as_mut() {
                    if let Err(e) = log.write(message, &record) {
                        warn!(id = message.id, error = %e, "Decision log write failed");
                        report.warnings += 1;
                    }
                }
            }
            Err(e) => {
                // One bad message must never sink the batch.
                warn!(id = message.id, error = %e, "Skipping message");
                report.warnings += 1;
            }
        }

        if since_commit >= config.store.commit_every {
            store.commit()?;
            store.begin()?;
            since_commit = 0;
            debug!(processed = report.processed, "Batch committed");
        }
    }

    store.commit()?;
    if let Some(cb) = progress {
        cb(batch.len() as u64, batch.len() as u64);
    }

    info!(
        processed = report.processed,
        propagated = report.propagated,
        warnings = report.warnings,
        "Decide run finished"
    );
    Ok(report)
}

/// Decide a single group representative and fan the result out to its
/// duplicate group. Returns the record and the number of siblings updated.
fn decide_one(
    store: &SqliteStore,
    oracle: Option<&dyn Oracle>,
    config: &Config,
    rules: &RuleSet,
    resolver_opts: &ResolverOptions,
    opts: &DecideOptions,
    message: &Message,
) -> Result<(ClassificationRecord, usize)> {
    // A representative decided in an earlier run settles the whole group:
    // copy its record instead of consulting the oracle again.
    if opts.dedup {
        if let Some(prior) = store.decided_in_group(&message.fingerprint)? {
            if let Some(record) = record_of(&prior) {
                debug!(id = message.id, rep = prior.id, "Reusing group decision");
                let changed =
                    store.propagate_group(&message.fingerprint, prior.id, &record)?;
                return Ok((record, changed));
            }
        }
    }

    let heuristic_labels = heuristics::match_labels(
        rules,
        &message.from_addr,
        &message.subject,
        config.decide.heuristic_label_cap,
    );

    let parse_outcome: Option<ParseOutcome> = match oracle {
        Some(oracle) => {
            let rendered = prompt::render(
                &message.from_addr,
                &message.subject,
                &message.body,
                config.oracle.clip_chars,
            );
            match oracle.classify(&rendered) {
                CallOutcome::Success(text) => Some(salvage::parse_response(&text)),
                CallOutcome::Timeout => {
                    warn!(id = message.id, "Oracle timed out; using fallback");
                    None
                }
                CallOutcome::TransportFailure(e) => {
                    warn!(id = message.id, error = %e, "Oracle unreachable; using fallback");
                    None
                }
            }
        }
        None => None,
    };

    let record = resolver::resolve(
        rules,
        resolver_opts,
        &message.from_addr,
        &message.subject,
        &heuristic_labels,
        parse_outcome.as_ref(),
    );

    store.set_classification(message.id, &record)?;

    let propagated = if opts.dedup {
        store.propagate_group(&message.fingerprint, message.id, &record)?
    } else {
        0
    };

    debug!(
        id = message.id,
        decision = %record.decision,
        confidence = record.confidence,
        propagated,
        "Decided"
    );
    Ok((record, propagated))
}

/// Re-apply the override ruleset to already-decided rows.
///
/// Idempotent: only rows whose decision actually changes are rewritten, so
/// re-running with the same ruleset is a no-op. The implied category falls
/// back from the stored labels to a summary excerpt, mirroring what the
/// original decide pass fed the override engine.
pub fn reapply_overrides(store: &SqliteStore, rules: &RuleSet) -> Result<usize> {
    use crate::model::message::clip_chars;
    use crate::rules::overrides;

    let mut changed = 0usize;
    for message in store.decided()? {
        let implied = match (&message.labels, &message.summary) {
            (Some(labels), _) if !labels.is_empty() => Some(labels.clone()),
            (_, Some(summary)) if !summary.is_empty() => Some(clip_chars(summary, 200)),
            _ => None,
        };

        let Some(out) =
            overrides::apply(rules, &message.from_addr, &message.subject, implied.as_deref())
        else {
            continue;
        };
        if Some(out.decision) == message.decision {
            continue;
        }

        let reason = match message.reason.as_deref() {
            Some(prev) if !prev.is_empty() => format!("{prev} | {}", out.reason),
            _ => out.reason.clone(),
        };
        store.update_decision(message.id, out.decision, &reason)?;
        changed += 1;
    }

    info!(changed, "Override re-run finished");
    Ok(changed)
}

/// View a stored message's classification as a record, if complete enough.
fn record_of(message: &Message) -> Option<ClassificationRecord> {
    Some(ClassificationRecord {
        decision: message.decision?,
        reason: message.reason.clone().unwrap_or_default(),
        confidence: message.confidence.unwrap_or(0.5),
        labels: message
            .labels
            .as_deref()
            .map(|l| l.split(", ").map(String::from).collect())
            .unwrap_or_default(),
        summary: message.summary.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, OverrideRuleConfig, RulesConfig};
    use crate::model::Decision;
    use crate::store::SqliteStore;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;

    /// Scripted oracle: hands out canned responses in order, counting calls.
    struct FakeOracle {
        responses: RefCell<Vec<CallOutcome>>,
        calls: RefCell<usize>,
    }

    impl FakeOracle {
        fn new(responses: Vec<CallOutcome>) -> Self {
            Self {
                responses: RefCell::new(responses),
                calls: RefCell::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.borrow()
        }
    }

    impl Oracle for FakeOracle {
        fn classify(&self, _prompt: &str) -> CallOutcome {
            *self.calls.borrow_mut() += 1;
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                CallOutcome::TransportFailure("script exhausted".to_string())
            } else {
                responses.remove(0)
            }
        }
    }

    fn seed(store: &SqliteStore, from: &str, subject: &str, ts: i64) -> i64 {
        store
            .insert_message(&crate::model::NewMessage {
                msg_id: format!("<{ts}@example.com>"),
                from_addr: from.to_string(),
                subject: subject.to_string(),
                date: Utc.timestamp_opt(ts, 0).single(),
                size_bytes: 64,
                has_attachments: false,
                body: "body text".to_string(),
                fingerprint: crate::fingerprint::fingerprint(from, subject),
            })
            .unwrap()
    }

    fn options() -> DecideOptions {
        DecideOptions {
            limit: 100,
            min_conf_delete: 0.0,
            dedup: true,
            jsonl: None,
        }
    }

    #[test]
    fn test_duplicate_group_queries_oracle_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = seed(&store, "noreply@app.example", "Your weekly report", 3_000);
        let b = seed(&store, "noreply@app.example", "Your weekly report", 2_000);
        let c = seed(&store, "noreply@app.example", "your  weekly   REPORT", 1_000);

        let oracle = FakeOracle::new(vec![CallOutcome::Success(
            r#"{"decision":"archive","confidence":0.8,"reason":"recurring report"}"#.to_string(),
        )]);
        let config = Config::default();
        let rules = RuleSet::compile(&RulesConfig {
            domain: vec![],
            subject: vec![],
            overrides: vec![],
        })
        .unwrap();

        let report =
            run_batch(&store, Some(&oracle), &config, &rules, &options(), None).unwrap();

        assert_eq!(oracle.calls(), 1, "one oracle call for the whole group");
        assert_eq!(report.to_process, 3);
        assert_eq!(report.processed, 1);
        assert_eq!(report.propagated, 2);

        for id in [a, b, c] {
            let row = store.get(id).unwrap().unwrap();
            assert_eq!(row.decision, Some(Decision::Archive), "id {id}");
            assert_eq!(row.reason.as_deref(), Some("recurring report"));
        }
    }

    #[test]
    fn test_transport_failure_degrades_to_fallback() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(&store, "someone@site.example", "Hello", 1_000);

        let oracle = FakeOracle::new(vec![CallOutcome::TransportFailure("down".to_string())]);
        let config = Config::default();
        let rules = RuleSet::compile(&RulesConfig {
            domain: vec![],
            subject: vec![],
            overrides: vec![],
        })
        .unwrap();

        let report =
            run_batch(&store, Some(&oracle), &config, &rules, &options(), None).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.warnings, 0);

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.decision, Some(Decision::Archive));
        assert_eq!(row.reason.as_deref(), Some("fallback"));
        assert_eq!(row.confidence, Some(0.5));
    }

    #[test]
    fn test_no_oracle_heuristics_plus_sender_override() {
        // End-to-end: promo sender, no oracle. Heuristics contribute
        // Promotions from the subject; the fallback archive is overturned by
        // the generic-newsletter-sender override rule.
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(
            &store,
            "promo@newsletter.example.com",
            "50% OFF — flash sale",
            1_000,
        );

        let config = Config::default();
        let rules = RuleSet::compile(&config.rules).unwrap();

        run_batch(&store, None, &config, &rules, &options(), None).unwrap();

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.decision, Some(Decision::Delete));
        let labels = row.labels.unwrap_or_default();
        assert!(labels.contains("Promotions"), "labels: {labels}");
        assert!(row.reason.unwrap().contains("rule:"));
    }

    #[test]
    fn test_bank_alert_kept_via_oracle() {
        // End-to-end: security alert, oracle says keep with high confidence,
        // no override matches.
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(
            &store,
            "alerts@bank.example.com",
            "Unusual sign-in detected",
            1_000,
        );

        let oracle = FakeOracle::new(vec![CallOutcome::Success(
            r#"{"decision":"keep","confidence":0.9,"reason":"security alert"}"#.to_string(),
        )]);
        let config = Config::default();
        let rules = RuleSet::compile(&config.rules).unwrap();

        run_batch(&store, Some(&oracle), &config, &rules, &options(), None).unwrap();

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.decision, Some(Decision::Keep));
        assert_eq!(row.confidence, Some(0.9));
        assert_eq!(row.reason.as_deref(), Some("security alert"));
    }

    #[test]
    fn test_prior_run_representative_settles_new_siblings() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rep = seed(&store, "noreply@app.example", "Report", 1_000);
        store
            .set_classification(
                rep,
                &ClassificationRecord {
                    decision: Decision::Archive,
                    reason: "recurring".to_string(),
                    confidence: 0.8,
                    labels: vec!["Notifications".to_string()],
                    summary: None,
                },
            )
            .unwrap();

        // A new duplicate arrives after the earlier run.
        let late = seed(&store, "noreply@app.example", "Report", 2_000);

        let oracle = FakeOracle::new(vec![]);
        let config = Config::default();
        let rules = RuleSet::compile(&RulesConfig {
            domain: vec![],
            subject: vec![],
            overrides: vec![],
        })
        .unwrap();

        run_batch(&store, Some(&oracle), &config, &rules, &options(), None).unwrap();

        assert_eq!(oracle.calls(), 0, "group already has a representative");
        let row = store.get(late).unwrap().unwrap();
        assert_eq!(row.decision, Some(Decision::Archive));
        assert_eq!(row.reason.as_deref(), Some("recurring"));
    }

    #[test]
    fn test_reapply_overrides_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(&store, "digest@quora.com", "Your digest", 1_000);
        store
            .set_classification(
                id,
                &ClassificationRecord {
                    decision: Decision::Keep,
                    reason: "ai said keep".to_string(),
                    confidence: 0.8,
                    labels: vec![],
                    summary: None,
                },
            )
            .unwrap();

        let rules = RuleSet::compile(&RulesConfig {
            domain: vec![],
            subject: vec![],
            overrides: vec![OverrideRuleConfig {
                sender: r"@quora\.com".to_string(),
                subject: ".*".to_string(),
                decision: "delete".to_string(),
                reason: "rule: quora digest".to_string(),
            }],
        })
        .unwrap();

        assert_eq!(reapply_overrides(&store, &rules).unwrap(), 1);
        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.decision, Some(Decision::Delete));
        assert_eq!(
            row.reason.as_deref(),
            Some("ai said keep | rule: quora digest")
        );

        // Second run changes nothing.
        assert_eq!(reapply_overrides(&store, &rules).unwrap(), 0);
    }

    #[test]
    fn test_reapply_overrides_uses_stored_labels_as_category() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = seed(&store, "friendly@shop.example", "News for you", 1_000);
        store
            .set_classification(
                id,
                &ClassificationRecord {
                    decision: Decision::Keep,
                    reason: "seemed fine".to_string(),
                    confidence: 0.9,
                    labels: vec!["Newsletter".to_string()],
                    summary: None,
                },
            )
            .unwrap();

        let rules = RuleSet::compile(&RulesConfig {
            domain: vec![],
            subject: vec![],
            overrides: vec![],
        })
        .unwrap();

        // No list rules at all; the category short-circuit alone fires.
        assert_eq!(reapply_overrides(&store, &rules).unwrap(), 1);
        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.decision, Some(Decision::Delete));
    }
}
