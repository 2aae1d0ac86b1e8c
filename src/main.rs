use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use article_reactions::storage::Database;
use article_reactions::{ArticleId, PageMounts, Reactions, ReactionsConfig, SessionId};

#[derive(Parser)]
#[command(name = "reactions", version, about = "Article view and like counters")]
struct Cli {
    /// Configuration file (defaults to ./reactions.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session id used to deduplicate views; a fresh one per run otherwise
    #[arg(short, long, global = true, env = "REACTIONS_SESSION")]
    session: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a page: count the view and print its counters
    Visit {
        /// Page path or full URL
        page: String,
    },
    /// Load a page and activate its like button
    Like { page: String },
    /// Print the delegated widget embed for a page
    Embed { page: String },
    /// Print the effective configuration
    Config,
}

fn page_path(page: &str) -> Result<String> {
    if page.contains("://") {
        let id = ArticleId::from_url(page).context("Invalid page URL")?;
        Ok(id.as_str().to_string())
    } else {
        Ok(page.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("article_reactions=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Arc::new(ReactionsConfig::load(cli.config.as_deref())?);

    if let Command::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(config.as_ref())?);
        return Ok(());
    }

    // Initialize storage
    let db = Database::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path))?;
    db.migrate()?;

    let session = cli
        .session
        .map(SessionId::new)
        .unwrap_or_else(SessionId::generate);
    info!("Session {}", session);

    match cli.command {
        Command::Visit { page } => {
            let reactions =
                Reactions::new(config, db, session, &page_path(&page)?, PageMounts::all());
            let state = reactions.init().await;
            println!("{}", serde_json::to_string_pretty(state)?);
        }
        Command::Like { page } => {
            let reactions =
                Reactions::new(config, db, session, &page_path(&page)?, PageMounts::all());
            reactions.init().await;
            match reactions.toggle_like().await {
                Some(display) => println!("{}", serde_json::to_string_pretty(&display)?),
                None => println!("Likes are handled by the delegated widget"),
            }
        }
        Command::Embed { page } => {
            let mounts = PageMounts {
                view_counter: false,
                ..PageMounts::all()
            };
            let reactions = Reactions::new(config, db, session, &page_path(&page)?, mounts);
            match &reactions.init().await.embed {
                Some(embed) => println!("{}", embed),
                None => println!("Delegated widget is not active"),
            }
        }
        Command::Config => {}
    }

    Ok(())
}
