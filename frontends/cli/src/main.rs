//! `tally` - command line client for the tally document in Google Drive

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tally::TallySession;
use tally_api::{Goal, GoalType, LogId};
use tally_drive::DriveClient;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Count things, synchronized through Google Drive")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $TALLY_CONFIG or ~/.config/tally/config.yaml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current document as JSON
    Show,

    AddCategory {
        name: String,
        /// Goal period: D, W, M or Y
        #[arg(long, requires = "target")]
        goal: Option<GoalType>,
        #[arg(long, requires = "goal")]
        target: Option<u32>,
    },

    RenameCategory { id: String, name: String },

    /// Delete a category and all of its logs
    DeleteCategory { id: String },

    /// Record a count against a category
    Log {
        category_id: String,
        delta: u32,
        /// When it happened, e.g. 2024-01-31T08:15 (UTC, defaults to now)
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },

    /// Replace the count and note of a log (omitting --note clears it)
    EditLog {
        id: LogId,
        delta: u32,
        #[arg(long)]
        note: Option<String>,
    },

    DeleteLog { id: LogId },
}

fn setup_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .init();
        }
        None => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
    Ok(())
}

async fn run(session: &TallySession, command: Command) -> Result<serde_json::Value> {
    let output = match command {
        Command::Show => serde_json::to_value(session.document())?,
        Command::AddCategory { name, goal, target } => {
            let goal = match (goal, target) {
                (Some(goal_type), Some(target)) => Some(Goal::new(goal_type, target)?),
                _ => None,
            };
            let applied = session.add_category(&name, goal).await?;
            json!({ "id": applied.output, "rev": applied.document.meta.revision })
        }
        Command::RenameCategory { id, name } => {
            let applied = session.rename_category(&id, &name).await?;
            json!({ "rev": applied.document.meta.revision })
        }
        Command::DeleteCategory { id } => {
            let applied = session.delete_category(&id).await?;
            json!({ "rev": applied.document.meta.revision })
        }
        Command::Log {
            category_id,
            delta,
            at,
            note,
        } => {
            let timestamp = at.unwrap_or_else(|| {
                chrono::Utc::now()
                    .naive_utc()
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string()
            });
            let applied = session
                .add_log(&category_id, delta, &timestamp, note.as_deref())
                .await?;
            json!({ "id": applied.output, "rev": applied.document.meta.revision })
        }
        Command::EditLog { id, delta, note } => {
            let applied = session.edit_log(id, delta, note.as_deref()).await?;
            json!({ "rev": applied.document.meta.revision })
        }
        Command::DeleteLog { id } => {
            let applied = session.delete_log(id).await?;
            json!({ "rev": applied.document.meta.revision })
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.log_file.as_deref())?;

    let config = CliConfig::resolve(cli.config.as_deref())?;
    let drive =
        DriveClient::new(config.drive.clone()).context("Failed to set up Google Drive client")?;
    let session = TallySession::connect(Arc::new(drive), &config.sync)
        .await
        .context("Failed to open the tally document")?;
    info!("[tally] Running {:?}", cli.command);

    let output = run(&session, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
