mod commands;
mod runtime;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use runtime::WorkerRuntime;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration (TOML). Defaults plus SAFETY_* env vars when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON store snapshot, loaded at start and saved on exit
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// JSON array of escalation conditions to seed the store with
    #[arg(long, global = true)]
    conditions: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a single message and print the outcome as JSON
    Classify {
        #[arg(long)]
        user: String,

        #[arg(long)]
        conversation: String,

        #[arg(long)]
        message: String,

        /// Message id of the triggering turn (random when omitted)
        #[arg(long)]
        message_id: Option<String>,

        /// JSON array of recent conversation messages
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Queue every turn from a JSON Lines file and report what was recorded
    Replay {
        file: PathBuf,

        /// Print safety events as JSON lines while replaying
        #[arg(long, default_value_t = false)]
        events: bool,

        /// Only print events for this conversation
        #[arg(long, requires = "events")]
        conversation: Option<String>,
    },

    /// Validate a conditions file and print it grouped by tier
    Conditions { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Conditions { file } => commands::conditions(&file),
        command => run(cli.config, cli.store, cli.conditions, command).await,
    }
}

async fn run(
    config: Option<PathBuf>,
    store: Option<PathBuf>,
    conditions: Option<PathBuf>,
    command: Command,
) -> Result<()> {
    let runtime =
        WorkerRuntime::build(config.as_deref(), store.as_deref(), conditions.as_deref()).await?;
    info!(
        classifier = %runtime.config().classifier.endpoint_url,
        model = %runtime.config().classifier.model,
        "Safety worker starting"
    );

    match command {
        Command::Classify {
            user,
            conversation,
            message,
            message_id,
            history,
        } => {
            let args = commands::ClassifyArgs {
                user,
                conversation,
                message,
                message_id,
                history,
            };
            commands::classify(&runtime, args).await?;
        }
        Command::Replay {
            file,
            events,
            conversation,
        } => commands::replay(&runtime, &file, events, conversation).await?,
        Command::Conditions { file } => commands::conditions(&file)?,
    }

    runtime.persist().await
}
