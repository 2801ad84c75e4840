//! # Fragment Vault CLI (`vault`)
//!
//! The `vault` binary is the exposed surface of Fragment Vault. It
//! provides commands for database initialization, ingestion, search,
//! item inspection, connection discovery, and consolidation.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vault init` | Create the SQLite database and run schema migrations |
//! | `vault add <file>` | Ingest a UTF-8 text file |
//! | `vault search "<query>"` | Search the vault with natural language |
//! | `vault list` | List all items |
//! | `vault show <id>` | Show an item with its text and connections |
//! | `vault view <id>` | Record a session view of an item |
//! | `vault related <id>` | List an item's connections |
//! | `vault sweep-connections` | Recompute connections for the whole vault |
//! | `vault consolidate` | Cluster and merge small related notes |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file; see `config/vault.example.toml`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vault::config::load_config;
use vault::ingest::IngestOutcome;

/// Fragment Vault — drop text fragments in, find them again by natural
/// language.
#[derive(Parser)]
#[command(
    name = "vault",
    about = "Fragment Vault — drop text fragments in, find them again by natural language",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a UTF-8 text file into the vault.
    ///
    /// Duplicate content (by hash) is detected and skipped. After
    /// storage, the item is enriched and connected to its nearest
    /// neighbors when the generative service is configured.
    Add {
        /// Path to the file to ingest.
        file: PathBuf,
    },

    /// Search the vault with natural language.
    Search {
        /// The search query.
        query: String,

        /// Maximum results to return.
        #[arg(long, short = 'n')]
        limit: Option<i64>,
    },

    /// List all items, newest first.
    List,

    /// Show an item: metadata, text, and connections.
    Show {
        /// Item id.
        id: String,
    },

    /// Record a session view of an item.
    ///
    /// The search engine boosts results aligned with the last few viewed
    /// items.
    View {
        /// Item id.
        id: String,
    },

    /// List an item's connections.
    Related {
        /// Item id.
        id: String,

        /// Recompute this item's connections first.
        #[arg(long)]
        rediscover: bool,
    },

    /// Recompute the connection set for the whole vault.
    SweepConnections,

    /// Cluster small related notes and merge them into single items.
    Consolidate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = vault::db::connect(&config).await?;
            vault::migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Add { file } => {
            let pool = vault::db::connect(&config).await?;
            vault::migrate::run_migrations(&pool).await?;
            match vault::ingest::ingest_file(&config, &pool, &file).await? {
                IngestOutcome::Ingested { item_id } => {
                    println!("stored {}  ({})", item_id, file.display());
                }
                IngestOutcome::Duplicate { existing_id } => {
                    println!(
                        "duplicate: {} already stored as {}",
                        file.display(),
                        existing_id
                    );
                }
            }
            pool.close().await;
        }
        Commands::Search { query, limit } => {
            vault::search::run_search(&config, &query, limit).await?;
        }
        Commands::List => {
            vault::items::run_list(&config).await?;
        }
        Commands::Show { id } => {
            vault::items::run_show(&config, &id).await?;
        }
        Commands::View { id } => {
            vault::items::run_view(&config, &id).await?;
        }
        Commands::Related { id, rediscover } => {
            vault::connections::run_related(&config, &id, rediscover).await?;
        }
        Commands::SweepConnections => {
            vault::connections::run_sweep(&config).await?;
        }
        Commands::Consolidate => {
            vault::consolidate::run_consolidation(&config).await?;
        }
    }

    Ok(())
}
