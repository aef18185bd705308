//! # Site Context CLI (`sitectx`)
//!
//! ## Usage
//!
//! ```bash
//! sitectx --config ./config/site.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sitectx init` | Create the SQLite database and run schema migrations |
//! | `sitectx serve` | Start the HTTP API |
//! | `sitectx analyze <url>` | Run an analysis in the foreground and print the record |
//! | `sitectx get <id>` | Print a context record as JSON |
//! | `sitectx chat <id> "<question>"` | Ask a question about a completed context |
//!
//! API keys are read from `SERPER_API_KEY`, `OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY` and `OPENROUTER_API_KEY`. Log verbosity follows
//! `RUST_LOG` (default `site_context=info`).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use site_context::config::{self, Config};
use site_context::migrate;
use site_context::pipeline::AnalyzeOutcome;
use site_context::server;
use site_context::services::Services;
use site_context::tasks::TaskState;
use site_context_core::models::ContextStatus;

/// Site Context: website analysis and context-grounded marketing chat.
#[derive(Parser)]
#[command(
    name = "sitectx",
    about = "Scrape a website, gather competitive search data, and chat against the analysis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/site.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Analyze a website and print the resulting context record.
    ///
    /// A fresh cached analysis is printed without doing any work.
    Analyze {
        /// Website URL (the scheme may be omitted).
        url: String,

        /// Optional user id to store with the record.
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Print a context record as JSON.
    Get {
        /// Context id.
        id: String,
    },

    /// Ask a question grounded in a completed context.
    Chat {
        /// Context id.
        id: String,

        /// The question.
        question: String,

        /// Backend: `openai`, `anthropic`, or `openrouter`.
        #[arg(long, default_value = "openai")]
        model: String,

        /// Model id override for the chosen backend.
        #[arg(long)]
        model_name: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "site_context=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Analyze { url, user_id } => {
            analyze(&cfg, &url, user_id.as_deref()).await?;
        }
        Commands::Get { id } => {
            let services = Services::from_config(&cfg).await?;
            match services.store().get(&id).await? {
                Some(context) => println!("{}", serde_json::to_string_pretty(&context)?),
                None => bail!("Context not found: {}", id),
            }
        }
        Commands::Chat {
            id,
            question,
            model,
            model_name,
        } => {
            let services = Services::from_config(&cfg).await?;
            let answer = services
                .chat
                .ask(&id, &question, Some(&model), model_name.as_deref())
                .await?;
            eprintln!("[{}]", answer.model);
            println!("{}", answer.content);
        }
    }

    Ok(())
}

async fn analyze(cfg: &Config, url: &str, user_id: Option<&str>) -> Result<()> {
    let services = Services::from_config(cfg).await?;

    let id = match services.queue.submit(url, user_id).await? {
        AnalyzeOutcome::Cached { context, .. } => {
            eprintln!("Serving cached analysis from {}", context.created_at);
            context.id
        }
        AnalyzeOutcome::Started { id, url } => {
            eprintln!("Analyzing {} (context {})", url.url, id);
            if let Some(TaskState::Failed(message)) = services.queue.join(&id).await {
                eprintln!("Analysis failed: {}", message);
            }
            id
        }
    };

    let Some(context) = services.store().get(&id).await? else {
        bail!("Context not found: {}", id);
    };
    println!("{}", serde_json::to_string_pretty(&context)?);

    if context.status == ContextStatus::Failed {
        bail!(
            "analysis failed: {}",
            context.error_message.unwrap_or_default()
        );
    }
    if let Some(public_url) = &cfg.server.public_url {
        eprintln!("{}/context/{}", public_url.trim_end_matches('/'), id);
    }
    Ok(())
}
