use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Chorus CLI - inspect and edit replicated chat state", long_about = None)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in the config directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored envelope for a key
    Inspect {
        #[arg(default_value = "chat")]
        key: String,
        /// Print the stored snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// List sessions in display order
    Sessions,
    /// Create a session and select it
    New { topic: Option<String> },
    /// Rename the session at INDEX
    Rename { index: usize, topic: String },
    /// Pin the session at INDEX
    Pin { index: usize },
    /// Unpin the session at INDEX
    Unpin { index: usize },
    /// Add a message to the selected session
    Send {
        message: String,
        /// Record an assistant reply after the message
        #[arg(long)]
        reply: Option<String>,
        /// Model name stored on the reply
        #[arg(long)]
        model: Option<String>,
    },
    /// Delete the session at INDEX
    Delete { index: usize },
    /// Print session changes as they arrive
    Watch,
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the effective config
    Show,
}

fn init_tracing(log_file: bool) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    if !log_file {
        registry.init();
        return Ok(None);
    }

    let log_dir = chorus_infrastructure::ChorusPaths::log_dir()?;
    let appender = tracing_appender::rolling::daily(log_dir, "chorus.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    registry
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file)?;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Inspect { key, json } => commands::inspect::run(config, &key, json).await?,
        Commands::Sessions => commands::sessions::list(config).await?,
        Commands::New { topic } => commands::sessions::create(config, topic.as_deref()).await?,
        Commands::Rename { index, topic } => {
            commands::sessions::rename(config, index, &topic).await?
        }
        Commands::Pin { index } => commands::sessions::pin(config, index, true).await?,
        Commands::Unpin { index } => commands::sessions::pin(config, index, false).await?,
        Commands::Send {
            message,
            reply,
            model,
        } => commands::sessions::send(config, &message, reply.as_deref(), model).await?,
        Commands::Delete { index } => commands::sessions::delete(config, index).await?,
        Commands::Watch => commands::watch::run(config).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config::init(config).await?,
            ConfigAction::Show => commands::config::show(config).await?,
        },
    }

    Ok(())
}
