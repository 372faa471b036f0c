//! Hookline CLI - operator tooling for the campaign server's AAA core
//!
//! Hashes operator secrets, checks configuration files and reviews audit journals.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hookline_aaa::audit::sink::parse_records;
use hookline_aaa::{
    AuditRecord, AuditRecordBody, DecisionOutcome, PermissionRegistry, RoleCatalog, SecretHasher,
};
use std::collections::BTreeMap;
use hookline_core::{init_logging, log_operation_error, log_operation_start, ServerConfig};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_CONFIG_FILE: &str = "hookline.toml";

#[derive(Parser)]
#[command(name = "hookline")]
#[command(about = "Access control tooling for the Hookline campaign server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash an operator secret for the identity store
    HashSecret {
        /// Secret to hash; read from stdin when omitted
        #[arg(long)]
        secret: Option<String>,
    },

    /// Validate a configuration file, including role definitions
    CheckConfig {
        /// File to check; defaults to the --config file
        path: Option<PathBuf>,
    },

    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List every operation with its scope and required permissions
    Permissions,

    /// Check an audit journal for gaps and dangling completion records
    AuditVerify { path: PathBuf },

    /// Print audit records in a sequence range as JSON lines
    AuditShow {
        path: PathBuf,

        #[arg(long, default_value = "1")]
        from: u64,

        #[arg(long)]
        to: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Hookline CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::HashSecret { secret } => handle_hash_secret(secret, &config)?,
        Commands::CheckConfig { path } => {
            let path = path.or(cli.config);
            handle_check_config(path.as_deref(), &config)?
        }
        Commands::InitConfig { path, force } => handle_init_config(&path, force)?,
        Commands::Permissions => handle_permissions(),
        Commands::AuditVerify { path } => handle_audit_verify(&path).await?,
        Commands::AuditShow { path, from, to } => handle_audit_show(&path, from, to).await?,
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<ServerConfig> {
    if let Some(path) = path {
        return ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return ServerConfig::from_file(default_path)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_FILE));
    }

    Ok(ServerConfig::default())
}

fn handle_hash_secret(secret: Option<String>, config: &ServerConfig) -> Result<()> {
    log_operation_start!("hash_secret");

    let secret = match secret {
        Some(secret) => secret,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read secret from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if secret.is_empty() {
        bail!("Refusing to hash an empty secret");
    }

    let hasher = SecretHasher::new(&config.credentials)?;
    let hash = hasher.hash(&secret).map_err(|e| {
        log_operation_error!("hash_secret", e);
        e
    })?;
    println!("{}", hash);
    Ok(())
}

fn handle_check_config(path: Option<&Path>, config: &ServerConfig) -> Result<()> {
    let checked;
    let config = match path {
        Some(path) => {
            log_operation_start!("check_config", path = %path.display());
            checked = ServerConfig::from_file(path)?;
            &checked
        }
        None => config,
    };

    if let Err(e) = config.validate() {
        for suggestion in e.suggestions() {
            println!("hint: {}", suggestion);
        }
        return Err(e.into());
    }
    let roles = RoleCatalog::from_config(&config.roles)?;

    if let Some(role) = &config.credentials.required_role {
        if roles.permissions_for(role).is_none() {
            println!("warning: required role '{}' has no permissions defined", role);
        }
    }

    println!("Configuration is valid");
    println!("  roles: {}", config.roles.len());
    println!("  audit sink: {}", config.audit.sink);
    println!(
        "  session idle timeout: {}s (max lifetime {}s)",
        config.session.idle_timeout_secs, config.session.max_lifetime_secs
    );
    println!(
        "  lockout: {} failures within {}s locks for {}s",
        config.lockout.threshold, config.lockout.window_secs, config.lockout.duration_secs
    );
    Ok(())
}

fn handle_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    ServerConfig::default().save_to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn handle_permissions() {
    let registry = PermissionRegistry::campaign_server_defaults();
    for operation in registry.operations() {
        if let Ok(rule) = registry.required_permissions(operation) {
            let permissions: Vec<String> = rule.permissions.iter().map(|p| p.to_string()).collect();
            println!("{:<26} {:<12} {}", operation, rule.scope, permissions.join(", "));
        }
    }
}

async fn handle_audit_verify(path: &Path) -> Result<()> {
    log_operation_start!("audit_verify", path = %path.display());

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read audit journal {}", path.display()))?;
    let records = parse_records(path, &content);
    let summary = JournalSummary::from_records(&records);

    println!("records: {}", summary.records);
    println!(
        "allowed: {}  denied: {}  completed: {}  failed after allow: {}",
        summary.allowed, summary.denied, summary.succeeded, summary.failed
    );

    if summary.problems.is_empty() {
        println!("Journal is consistent");
        return Ok(());
    }

    for problem in &summary.problems {
        println!("problem: {}", problem);
    }
    bail!("{} problem(s) found in {}", summary.problems.len(), path.display())
}

async fn handle_audit_show(path: &Path, from: u64, to: Option<u64>) -> Result<()> {
    // Read only: the journal belongs to the server
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read audit journal {}", path.display()))?;
    let to = to.unwrap_or(u64::MAX);

    for record in parse_records(path, &content)
        .into_iter()
        .filter(|record| (from..=to).contains(&record.sequence))
    {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

/// Consistency report over a parsed journal
#[derive(Debug, Default)]
struct JournalSummary {
    records: usize,
    allowed: usize,
    denied: usize,
    succeeded: usize,
    failed: usize,
    problems: Vec<String>,
}

impl JournalSummary {
    fn from_records(records: &[AuditRecord]) -> Self {
        let mut summary = Self {
            records: records.len(),
            ..Self::default()
        };
        // decision sequence -> allowed?
        let mut decisions: BTreeMap<u64, bool> = BTreeMap::new();
        let mut expected = 1;

        for record in records {
            if record.sequence != expected {
                summary.problems.push(format!(
                    "expected sequence {} but found {}",
                    expected, record.sequence
                ));
            }
            expected = record.sequence + 1;

            match &record.body {
                AuditRecordBody::Decision(decision) => {
                    let allowed = decision.outcome == DecisionOutcome::Allow;
                    if allowed {
                        summary.allowed += 1;
                    } else {
                        summary.denied += 1;
                    }
                    decisions.insert(record.sequence, allowed);
                }
                AuditRecordBody::Completion {
                    decision_sequence, ..
                } => {
                    if record.outcome_label() == "succeeded" {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                    match decisions.remove(decision_sequence) {
                        Some(true) => {}
                        Some(false) => summary.problems.push(format!(
                            "completion {} refers to denied decision {}",
                            record.sequence, decision_sequence
                        )),
                        None => summary.problems.push(format!(
                            "completion {} refers to unknown or already completed decision {}",
                            record.sequence, decision_sequence
                        )),
                    }
                }
            }
        }

        for (sequence, allowed) in decisions {
            if allowed {
                summary.problems.push(format!(
                    "allow decision {} has no completion record",
                    sequence
                ));
            }
        }

        summary
    }
}
