use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use interunit_ingest::{xlsx, StatementParser, TallyDialect};
use interunit_recon::{MatchConfig, Reconciler, RoleConvention};
use interunit_storage::{SqliteStore, StorageError};

#[derive(Parser, Debug)]
#[command(name = "interunit", version, about = "Inter-unit loan reconciliation")]
struct Cli {
    /// SQLite store path
    #[arg(long, default_value = "interunit.db")]
    db: PathBuf,

    /// TOML config: role convention and borrower aliases
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse one ledger-export worksheet and append it to the store
    Import {
        file: PathBuf,
        /// Worksheet name within the workbook
        #[arg(long, default_value = "Sheet1")]
        sheet: String,
    },
    /// Match unmatched entries, optionally scoped to one company pair
    Reconcile {
        #[arg(long, requires = "borrower")]
        lender: Option<String>,
        #[arg(long, requires = "lender")]
        borrower: Option<String>,
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        /// Print applied matches as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Confirm a matched pair
    Confirm {
        uid: String,
        #[arg(long, default_value = "User")]
        actor: String,
    },
    /// Reject a matched or confirmed pair, returning both sides to unmatched
    Reject {
        uid: String,
        #[arg(long, default_value = "User")]
        actor: String,
    },
    /// Record counts per match state
    Status,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    convention: RoleConvention,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let store = SqliteStore::open(&cli.db)
        .await
        .with_context(|| format!("opening store {}", cli.db.display()))?;

    match cli.command {
        Command::Import { file, sheet } => {
            let dialect = if config.aliases.is_empty() {
                TallyDialect::new()
            } else {
                TallyDialect::with_aliases(config.aliases)
            };
            let parsed = StatementParser::new(dialect)
                .parse(xlsx::read_sheet(&file, &sheet)?)
                .with_context(|| format!("parsing {}", file.display()))?;

            for warning in &parsed.warnings {
                tracing::warn!("{warning}");
            }
            tracing::info!(
                lender = %parsed.lender,
                borrower = %parsed.borrower,
                rows = parsed.records.len(),
                "parsed statement"
            );

            match store.append_batch(&parsed.records).await {
                Ok(count) => println!("Imported {count} transactions"),
                Err(StorageError::AlreadyImported(uid)) => {
                    bail!("already imported: this file's records exist in the store (uid {uid})")
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Reconcile { lender, borrower, month, year, json } => {
            let reconciler =
                Reconciler::new(store, MatchConfig { convention: config.convention });
            let outcome = match (lender, borrower) {
                (Some(lender), Some(borrower)) => {
                    let snapshot = reconciler
                        .store()
                        .fetch_unmatched_for_pair(&lender, &borrower, month.as_deref(), year)
                        .await?;
                    reconciler.run_with(&snapshot).await?
                }
                _ => reconciler.run().await?,
            };

            for (candidate, err) in &outcome.failed {
                tracing::warn!(
                    lender_uid = %candidate.lender_uid,
                    borrower_uid = %candidate.borrower_uid,
                    "pair not applied: {err}"
                );
            }
            if json {
                for candidate in &outcome.applied {
                    println!("{}", serde_json::to_string(candidate)?);
                }
            }
            println!(
                "Reconciliation complete: {} matched, {} skipped, {} failed",
                outcome.applied.len(),
                outcome.skipped,
                outcome.failed.len()
            );
        }
        Command::Confirm { uid, actor } => {
            let reconciler =
                Reconciler::new(store, MatchConfig { convention: config.convention });
            reconciler.confirm(&uid, &actor).await?;
            println!("Confirmed {uid}");
        }
        Command::Reject { uid, actor } => {
            let reconciler =
                Reconciler::new(store, MatchConfig { convention: config.convention });
            reconciler.reject(&uid, &actor).await?;
            println!("Rejected {uid}");
        }
        Command::Status => {
            let counts = store.status_counts().await?;
            if counts.is_empty() {
                println!("store is empty");
            }
            for (status, count) in counts {
                println!("{status:>10}  {count}");
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}
