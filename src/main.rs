//! # Inbox Lens CLI (`lens`)
//!
//! The `lens` binary imports a mail archive into SQLite and organizes it:
//! conversation threads, density-based topic clusters, prompt clusters,
//! a 3-D projection for visualization, and hybrid search.
//!
//! ## Usage
//!
//! ```bash
//! lens --config ./config/lens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lens init` | Create the SQLite database and run schema migrations |
//! | `lens import <paths…>` | Import `.eml` / `.mbox` files or directories |
//! | `lens threads` | List conversation threads |
//! | `lens embed pending` | Embed emails with missing or stale vectors |
//! | `lens embed rebuild` | Recompute every embedding |
//! | `lens cluster run` / `show` | Recluster threads / print clusters |
//! | `lens prompt …` | Manage prompt clusters |
//! | `lens project fit` / `update` | Fit or extend the 3-D projection |
//! | `lens search "<query>"` | Hybrid lexical + semantic search |
//! | `lens completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! lens init
//! lens import ~/Mail/archive.mbox --mailbox archive
//! lens embed pending
//! lens cluster run
//! lens prompt create "Travel" "flight bookings and hotel confirmations"
//! lens search "invoice overdue" --limit 10
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use inbox_lens::progress::ProgressMode;
use inbox_lens::prompt_cmd::OverrideAction;
use inbox_lens::{
    cluster_cmd, config, embed_cmd, import, logging, migrate, project_cmd, prompt_cmd, search,
    threads,
};

/// Inbox Lens: a local-first semantic organizer for mail archives.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Every section of the file is optional.
#[derive(Parser)]
#[command(
    name = "lens",
    about = "Inbox Lens: threads, topic clusters, prompt clusters, and hybrid search for mail archives",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lens.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off`
    /// otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import `.eml` files and `.mbox` archives.
    ///
    /// Directories are walked recursively. Re-importing a message updates it
    /// in place.
    Import {
        /// Files or directories to import.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Mailbox name recorded on every imported email (default: file stem).
        #[arg(long)]
        mailbox: Option<String>,
    },

    /// List conversation threads, newest first.
    Threads {
        /// Maximum number of threads to print.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Density-based topic clusters over thread representatives.
    Cluster {
        #[command(subcommand)]
        action: ClusterAction,
    },

    /// Prompt clusters: emails similar to a natural-language prompt.
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },

    /// 3-D projection of the embeddings.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Hybrid search (BM25 + semantic, fused with reciprocal rank fusion).
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (default: `[search] final_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed emails that have no vector, or whose text or model changed.
    Pending {
        /// Maximum number of emails to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (texts per oracle call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without embedding anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute every embedding.
    ///
    /// Existing vectors are kept until the complete new set is ready.
    Rebuild {
        /// Override the batch size from config (texts per oracle call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ClusterAction {
    /// Recluster and replace the stored assignments.
    Run,
    /// Print clusters with member counts.
    Show,
}

#[derive(Subcommand)]
enum PromptAction {
    /// Score a prompt against every embedding and save it as a cluster.
    Create {
        /// Display label; the slug is derived from it.
        label: String,
        /// Prompt text to embed.
        prompt: String,
        /// Similarity threshold in [0, 1] (default: `[prompt] default_threshold`).
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// List prompt clusters.
    List,
    /// Show the members of a prompt cluster.
    Show { slug: String },
    /// Change the threshold without rescoring.
    Threshold { slug: String, threshold: f32 },
    /// Force an email in or out of a cluster, or clear the override.
    Override {
        slug: String,
        email_id: String,
        #[arg(value_enum)]
        action: OverrideAction,
    },
    /// Re-embed the prompt and rescore against current embeddings.
    Rescore { slug: String },
    /// Delete a prompt cluster.
    Delete { slug: String },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Fit a new projection and project every embedding.
    Fit,
    /// Project embeddings without a point through the stored model.
    Update,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "lens", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { paths, mailbox } => {
            import::run_import(&cfg, &paths, mailbox.as_deref(), mode).await?;
        }
        Commands::Threads { limit } => {
            threads::run_threads(&cfg, limit).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run, mode).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size, mode).await?;
            }
        },
        Commands::Cluster { action } => match action {
            ClusterAction::Run => cluster_cmd::run_cluster(&cfg, mode).await?,
            ClusterAction::Show => cluster_cmd::run_show(&cfg).await?,
        },
        Commands::Prompt { action } => match action {
            PromptAction::Create {
                label,
                prompt,
                threshold,
            } => {
                prompt_cmd::run_create(&cfg, &label, &prompt, threshold, mode).await?;
            }
            PromptAction::List => prompt_cmd::run_list(&cfg).await?,
            PromptAction::Show { slug } => prompt_cmd::run_show(&cfg, &slug).await?,
            PromptAction::Threshold { slug, threshold } => {
                prompt_cmd::run_threshold(&cfg, &slug, threshold).await?;
            }
            PromptAction::Override {
                slug,
                email_id,
                action,
            } => {
                prompt_cmd::run_override(&cfg, &slug, &email_id, action).await?;
            }
            PromptAction::Rescore { slug } => prompt_cmd::run_rescore(&cfg, &slug, mode).await?,
            PromptAction::Delete { slug } => prompt_cmd::run_delete(&cfg, &slug).await?,
        },
        Commands::Project { action } => match action {
            ProjectAction::Fit => project_cmd::run_fit(&cfg, mode).await?,
            ProjectAction::Update => project_cmd::run_update(&cfg, mode).await?,
        },
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json, mode).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
