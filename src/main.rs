//! CLI entry point for `mailtriage`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailtriage::apply::DryRunProvider;
use mailtriage::config::Config;
use mailtriage::decide::DecideOptions;
use mailtriage::oracle::{OllamaClient, Oracle};
use mailtriage::rules::RuleSet;
use mailtriage::store::SqliteStore;

#[derive(Parser)]
#[command(name = "mailtriage", version)]
#[command(about = "Local email triage: keep/archive/delete decisions for MBOX archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an MBOX archive into the store
    Ingest {
        /// MBOX file to read
        #[arg(long)]
        mbox: PathBuf,
        /// SQLite store to write
        #[arg(long)]
        db: PathBuf,
    },
    /// Decide undecided messages (heuristics + oracle + overrides)
    Decide {
        #[arg(long)]
        db: PathBuf,
        /// Oracle model identifier (overrides config)
        #[arg(long)]
        model: Option<String>,
        /// Maximum messages to process this run
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum confidence to accept a delete (otherwise downgrade to archive)
        #[arg(long)]
        min_conf_delete: Option<f64>,
        /// Append one JSON object per decision to this file
        #[arg(long)]
        jsonl: Option<PathBuf>,
        /// Decide every message individually, without duplicate-group propagation
        #[arg(long)]
        no_dedup: bool,
        /// Skip the oracle entirely (heuristics + overrides only)
        #[arg(long)]
        no_oracle: bool,
    },
    /// Re-apply override rules to already-decided messages
    Overrides {
        #[arg(long)]
        db: PathBuf,
    },
    /// Show decision counts
    Preview {
        #[arg(long)]
        db: PathBuf,
    },
    /// Show corpus statistics
    Stats {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Export decisions to CSV
    Export {
        #[arg(long)]
        db: PathBuf,
        #[arg(short, long, default_value = "decisions.csv")]
        out: PathBuf,
    },
    /// Map decisions onto mailbox operations (dry-run provider)
    Apply {
        #[arg(long)]
        db: PathBuf,
        /// Also archive messages decided "archive"
        #[arg(long)]
        do_archive: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailtriage::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Ingest { mbox, db } => cmd_ingest(&mbox, &db, &config),
        Commands::Decide {
            db,
            model,
            limit,
            min_conf_delete,
            jsonl,
            no_dedup,
            no_oracle,
        } => cmd_decide(
            &db,
            &config,
            model,
            limit,
            min_conf_delete,
            jsonl,
            no_dedup,
            no_oracle,
        ),
        Commands::Overrides { db } => cmd_overrides(&db, &config),
        Commands::Preview { db } => cmd_preview(&db),
        Commands::Stats { db, json } => cmd_stats(&db, json),
        Commands::Export { db, out } => cmd_export(&db, &out),
        Commands::Apply { db, do_archive } => cmd_apply(&db, do_archive),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = mailtriage::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailtriage.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailtriage", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Ingest an MBOX file into the store.
fn cmd_ingest(mbox: &Path, db: &Path, config: &Config) -> anyhow::Result<()> {
    if !mbox.exists() {
        anyhow::bail!("File not found: {}", mbox.display());
    }

    let store = SqliteStore::open(db)?;
    let file_size = std::fs::metadata(mbox)?.len();

    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Ingesting [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = mailtriage::ingest::ingest_mbox(
        &store,
        mbox,
        config.store.ingest_commit_every,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    println!();
    println!("  {:<20} {}", "Ingested", report.inserted);
    if report.skipped > 0 {
        println!("  {:<20} {}", "Skipped", report.skipped);
    }
    println!("  {:<20} {:.2?}", "Time", start.elapsed());
    println!("  {:<20} {}", "Store", db.display());
    println!();

    Ok(())
}

/// Run a decide batch.
#[allow(clippy::too_many_arguments)]
fn cmd_decide(
    db: &Path,
    config: &Config,
    model: Option<String>,
    limit: Option<usize>,
    min_conf_delete: Option<f64>,
    jsonl: Option<PathBuf>,
    no_dedup: bool,
    no_oracle: bool,
) -> anyhow::Result<()> {
    let store = SqliteStore::open(db)?;
    let rules = RuleSet::compile(&config.rules)?;

    let mut oracle_cfg = config.oracle.clone();
    if let Some(model) = model {
        oracle_cfg.model = model;
    }

    let client;
    let oracle: Option<&dyn Oracle> = if no_oracle || !oracle_cfg.enabled {
        None
    } else {
        client = OllamaClient::from_config(&oracle_cfg);
        Some(&client)
    };

    let opts = DecideOptions {
        limit: limit.unwrap_or(config.decide.batch_limit),
        min_conf_delete: min_conf_delete.unwrap_or(config.decide.min_conf_delete),
        dedup: config.decide.dedup && !no_dedup,
        jsonl,
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Deciding [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = mailtriage::decide::run_batch(
        &store,
        oracle,
        config,
        &rules,
        &opts,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    println!();
    println!("  {:<20} {}", "To process", report.to_process);
    println!("  {:<20} {}", "Decided", report.processed);
    println!("  {:<20} {}", "Propagated", report.propagated);
    println!("  {:<20} {}", "Warnings", report.warnings);
    println!("  {:<20} {:.2?}", "Time", start.elapsed());
    println!();
    println!("  Reminder: this is a local preview. Nothing changes in your mailbox");
    println!("  until you run 'mailtriage apply'.");
    println!();

    Ok(())
}

/// Re-apply override rules to decided rows.
fn cmd_overrides(db: &Path, config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::open(db)?;
    let rules = RuleSet::compile(&config.rules)?;
    let changed = mailtriage::decide::reapply_overrides(&store, &rules)?;
    println!("  Overrides applied to {changed} message(s)");
    Ok(())
}

/// Show decision counts.
fn cmd_preview(db: &Path) -> anyhow::Result<()> {
    let store = SqliteStore::open(db)?;
    let counts = store.decision_counts()?;
    let total = store.count()?;

    println!();
    println!("  Decisions:");
    let mut decided = 0u64;
    for (decision, count) in &counts {
        println!("    {decision:<10} {count}");
        decided += count;
    }
    println!();
    println!("  {decided} decided / {total} total");
    println!();
    Ok(())
}

/// Show corpus statistics.
fn cmd_stats(db: &Path, json: bool) -> anyhow::Result<()> {
    let store = SqliteStore::open(db)?;
    let stats = store.stats()?;
    let top = store.top_senders(10)?;

    if json {
        let top_json: Vec<serde_json::Value> = top
            .iter()
            .map(|(sender, count, bytes)| {
                serde_json::json!({
                    "sender": sender,
                    "count": count,
                    "bytes": bytes,
                })
            })
            .collect();
        let out = serde_json::json!({
            "total": stats.total,
            "decided": stats.decided,
            "text_bytes": stats.text_bytes,
            "with_attachments": stats.with_attachments,
            "oldest": stats.oldest.map(|d| d.to_rfc3339()),
            "newest": stats.newest.map(|d| d.to_rfc3339()),
            "top_senders": top_json,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};
    println!();
    println!("  {:<20} {}", "Messages", stats.total);
    println!("  {:<20} {}", "Decided", stats.decided);
    println!(
        "  {:<20} {}",
        "Text size",
        format_size(stats.text_bytes, BINARY)
    );
    println!("  {:<20} {}", "With attachments", stats.with_attachments);
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!(
            "  {:<20} {} — {}",
            "Date range",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        );
    }

    if !top.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count, _bytes) in &top {
            let sender = if sender.is_empty() { "(unknown)" } else { sender };
            println!("    {count:>6}  {sender}");
        }
    }
    println!();
    Ok(())
}

/// Export decisions to CSV.
fn cmd_export(db: &Path, out: &Path) -> anyhow::Result<()> {
    let store = SqliteStore::open(db)?;
    let decided = store.decided()?;
    let count = mailtriage::export::csv::export_csv(&decided, out)?;
    println!("  Exported {count} decision(s) to {}", out.display());
    Ok(())
}

/// Map decisions onto mailbox operations using the dry-run provider.
fn cmd_apply(db: &Path, do_archive: bool) -> anyhow::Result<()> {
    let store = SqliteStore::open(db)?;
    let mut provider = DryRunProvider::default();
    let report = mailtriage::apply::apply_decisions(&store, &mut provider, do_archive)?;

    println!();
    println!("  Plan (dry run):");
    for step in &provider.planned {
        println!("    {step}");
    }
    println!();
    println!("  {:<20} {}", "Labeled", report.labeled);
    println!("  {:<20} {}", "Archived", report.archived);
    println!("  {:<20} {}", "Marked for delete", report.marked_delete);
    if report.skipped > 0 {
        println!("  {:<20} {}", "Skipped (no id)", report.skipped);
    }
    println!();
    Ok(())
}
