//! # Signal Link CLI (`slink`)
//!
//! The `slink` binary drives the association pipeline: database
//! initialization, loading the two item collections from JSON exports,
//! embedding management, association generation, and lookups.
//!
//! ## Usage
//!
//! ```bash
//! slink --config ./slink.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `slink init` | Create the SQLite database and run schema migrations |
//! | `slink load signals <file>` | Import a JSON export of signals |
//! | `slink load issues <file>` | Import a JSON export of issues |
//! | `slink embed pending` | Backfill missing or stale embeddings |
//! | `slink embed rebuild` | Delete and regenerate all embeddings |
//! | `slink associate` | Generate scored signal↔issue associations |
//! | `slink show signal <id>` | List issues associated with a signal |
//! | `slink show issue <id>` | List signals associated with an issue |
//! | `slink stats` | Print counts and embedding coverage |

mod cache;
mod config;
mod db;
mod embedding;
mod engine;
mod error;
mod index;
mod migrate;
mod models;
mod show;
mod sources;
mod stats;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Signal Link — links customer feedback signals to engineering tracker
/// issues by semantic similarity.
#[derive(Parser)]
#[command(
    name = "slink",
    about = "Signal Link — links customer feedback signals to tracker issues by semantic similarity",
    version,
    long_about = "Signal Link embeds customer feedback signals and engineering tracker issues \
    with a pinned model, caches the vectors per item, and writes scored associations for every \
    signal/issue pair above a cosine similarity threshold. Runs are idempotent and incremental."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./slink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (signals,
    /// issues, embeddings, associations). Idempotent — running it multiple
    /// times is safe.
    Init,

    /// Import a collection from a JSON export file.
    ///
    /// Rows are upserted by id, so re-loading an updated export is safe.
    Load {
        /// Collection to load: `signals` or `issues`.
        collection: String,

        /// Path to the JSON array file.
        file: PathBuf,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Generate scored associations between signals and issues.
    ///
    /// Ensures both collections are embedded (reusing the cache), rebuilds
    /// the issue vector index, queries the nearest issues per signal, and
    /// upserts an edge for every pair at or above the threshold. Safe to
    /// re-invoke: reruns update edges in place and compute embeddings only
    /// for new or changed items.
    Associate {
        /// Minimum cosine similarity for an edge, in [-1.0, 1.0].
        /// Defaults to `association.threshold` from config.
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Nearest issues considered per signal. Defaults to
        /// `association.top_k` from config.
        #[arg(long)]
        top_k: Option<usize>,

        /// Show item counts without embedding or writing edges.
        #[arg(long)]
        dry_run: bool,
    },

    /// Look up associations from either endpoint.
    Show {
        #[command(subcommand)]
        target: ShowTarget,
    },

    /// Print item counts, embedding coverage, and association totals.
    Stats,
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed items that are missing embeddings or whose text changed.
    Pending {
        /// Compute at most this many new embeddings (signals first).
        #[arg(long)]
        limit: Option<usize>,

        /// Override the configured provider batch size.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Use when switching embedding models: the cache is invalidated
    /// explicitly and every item is re-embedded under the new model.
    Rebuild {
        /// Override the configured provider batch size.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

/// Lookup subcommands.
#[derive(Subcommand)]
enum ShowTarget {
    /// Issues associated with one signal, descending by score.
    Signal {
        /// Signal id.
        id: i64,

        /// Only show edges at or above this score.
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
    },

    /// Signals associated with one issue, descending by score.
    Issue {
        /// Issue identifier (e.g. `ENG-142`).
        id: String,

        /// Only show edges at or above this score.
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Load { collection, file } => {
            sources::run_load(&cfg, &collection, &file).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                cache::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                cache::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Associate {
            threshold,
            top_k,
            dry_run,
        } => {
            engine::run_associate(&cfg, threshold, top_k, dry_run).await?;
        }
        Commands::Show { target } => match target {
            ShowTarget::Signal { id, min_score } => {
                show::run_show_signal(&cfg, id, min_score).await?;
            }
            ShowTarget::Issue { id, min_score } => {
                show::run_show_issue(&cfg, &id, min_score).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
