//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILTRIAGE_CONFIG` (environment variable)
//! 2. `~/.config/mailtriage/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailtriage\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! The heuristic label tables and the override rule list are part of the
//! configuration object and are passed down explicitly. There is no
//! process-wide rule state, so tests can run with their own rule sets.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Record store settings.
    pub store: StoreConfig,
    /// Oracle (local LLM) settings.
    pub oracle: OracleConfig,
    /// Decision engine settings.
    pub decide: DecideConfig,
    /// Heuristic label tables and override rules.
    pub rules: RulesConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Commit after this many processed messages during a decide run.
    /// Bounds work lost on a crash, not a throughput knob.
    pub commit_every: usize,
    /// Commit cadence during ingestion.
    pub ingest_commit_every: usize,
}

/// Oracle (local LLM via Ollama) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Consult the oracle at all. When false, decisions come from the
    /// fallback default plus heuristics and override rules only.
    pub enabled: bool,
    /// Ollama generate endpoint.
    pub url: String,
    /// Model identifier (e.g. "mistral", "llama3.1").
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Context window passed to the model.
    pub num_ctx: u32,
    /// Maximum tokens to generate.
    pub num_predict: u32,
    /// Per-call timeout in seconds; an expired call counts as failed.
    pub timeout_secs: u64,
    /// Total attempts per message (1 call + retries).
    pub max_attempts: u32,
    /// Initial backoff delay in seconds, doubled per retry.
    pub backoff_secs: u64,
    /// Body excerpt length (characters) included in the prompt.
    pub clip_chars: usize,
}

/// Decision engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecideConfig {
    /// Minimum confidence required to accept a `delete` decision; below it
    /// the decision is downgraded to `archive`. 0 disables the gate.
    pub min_conf_delete: f64,
    /// Maximum labels kept on a classification record.
    pub label_cap: usize,
    /// Maximum labels contributed by the heuristic matcher.
    pub heuristic_label_cap: usize,
    /// Propagate decisions across duplicate groups instead of re-deciding
    /// every member.
    pub dedup: bool,
    /// Default batch size for a decide run.
    pub batch_limit: usize,
}

/// Heuristic label tables and the ordered override rule list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Sender/domain patterns → labels.
    pub domain: Vec<LabelRuleConfig>,
    /// Subject keyword patterns → labels. Matched against the normalized
    /// (lowercased, diacritic-stripped) subject.
    pub subject: Vec<LabelRuleConfig>,
    /// Ordered override rules; first match wins.
    #[serde(rename = "override")]
    pub overrides: Vec<OverrideRuleConfig>,
}

/// One heuristic table entry: a regex pattern mapping to one or more labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRuleConfig {
    pub pattern: String,
    pub labels: Vec<String>,
}

/// One override rule: sender-pattern AND subject-pattern → forced decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRuleConfig {
    /// Regex over the lowercased sender address ("search" semantics).
    pub sender: String,
    /// Regex over the subject, case-insensitive.
    pub subject: String,
    /// Forced decision: "keep", "archive" or "delete".
    pub decision: String,
    /// Human-readable reason recorded on the message.
    pub reason: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            commit_every: 25,
            ingest_commit_every: 500,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:11434/api/generate".to_string(),
            model: "mistral".to_string(),
            temperature: 0.1,
            num_ctx: 2048,
            num_predict: 160,
            timeout_secs: 45,
            max_attempts: 2,
            backoff_secs: 3,
            clip_chars: 1500,
        }
    }
}

impl Default for DecideConfig {
    fn default() -> Self {
        Self {
            min_conf_delete: 0.0,
            label_cap: 5,
            heuristic_label_cap: 3,
            dedup: true,
            batch_limit: 200,
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            domain: default_domain_rules(),
            subject: default_subject_rules(),
            overrides: default_override_rules(),
        }
    }
}

fn label_rule(pattern: &str, labels: &[&str]) -> LabelRuleConfig {
    LabelRuleConfig {
        pattern: pattern.to_string(),
        labels: labels.iter().map(|l| (*l).to_string()).collect(),
    }
}

fn default_domain_rules() -> Vec<LabelRuleConfig> {
    vec![
        label_rule(r"(newsletter|news\.|mailer|mailchimp|sendgrid|email\.)", &["Newsletter"]),
        label_rule(r"(linkedin|facebook|twitter|instagram)\.", &["Social"]),
        label_rule(r"(paypal|bank)", &["Banking"]),
        label_rule(r"(amazon|aliexpress|ebay)\.", &["Shopping"]),
    ]
}

fn default_subject_rules() -> Vec<LabelRuleConfig> {
    vec![
        label_rule(
            r"(promo|promotion|% off|discount|deal|soldes?|flash sale|vente privee|bon plan|reduction)",
            &["Promotions"],
        ),
        label_rule(r"(newsletter|digest|weekly update)", &["Newsletter"]),
        label_rule(
            r"(security|securite|2fa|sign-in|connexion|new device|nouvel appareil|verification code|unusual)",
            &["Security"],
        ),
        label_rule(r"(invoice|facture|receipt|recu|payment)", &["Invoices"]),
        label_rule(r"(delivery|shipped|livraison|colis|tracking)", &["Shipping"]),
    ]
}

fn default_override_rules() -> Vec<OverrideRuleConfig> {
    vec![
        // Common emailing infrastructure → delete regardless of subject
        OverrideRuleConfig {
            sender: r"(newsletter|news\.|mailer|mailers?p\d+|email\.)".to_string(),
            subject: r".*".to_string(),
            decision: "delete".to_string(),
            reason: "rule: generic newsletter sender".to_string(),
        },
        // Promo wording in the subject (FR/EN)
        OverrideRuleConfig {
            sender: r".*".to_string(),
            subject: r"(newsletter|promo|promotion|ventes? priv[ée]es?|bon\s?plan|r[ée]duction|remise|offre|deal|soldes?|flash sale|discount|% off)"
                .to_string(),
            decision: "delete".to_string(),
            reason: "rule: promo subject".to_string(),
        },
    ]
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var("MAILTRIAGE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("mailtriage").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailtriage")
}
