//! # docshelf CLI (`shelf`)
//!
//! The `shelf` binary is the primary interface for docshelf. It provides
//! commands for database initialization, provider settings management,
//! incremental sync, semantic search, and question answering.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database and seed AI settings from the environment |
//! | `shelf sources` | List provider settings and their live status |
//! | `shelf settings list` | Show persisted provider and AI settings |
//! | `shelf settings set --file <toml>` | Upsert provider/AI settings from a TOML file |
//! | `shelf settings rm <kind> <name>` | Remove one provider's settings |
//! | `shelf sync <target>` | Incrementally sync `all`, a kind, or `kind:name` |
//! | `shelf search "<query>"` | Semantic search over indexed chunks |
//! | `shelf ask "<question>"` | Answer a question over the indexed corpus |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use docshelf::catalog::{Catalog, ConfigurationService};
use docshelf::config::{load_config, Config};
use docshelf::db;
use docshelf::indexer::{execute_plan, CancelFlag};
use docshelf::migrate::run_migrations;
use docshelf::provider::DocumentProvider;
use docshelf::seed::{seed_ai_settings, EnvDefaults, SeedOutcome};
use docshelf::settings::{AiSettings, ProviderKey, ProviderKind, ProviderSettings};
use docshelf::settings_store::SettingsStore;
use docshelf::sync_plan::{build_plan, SyncOptions};
use docshelf::{ask, search};

/// docshelf CLI — multi-source document indexing and question answering
/// with incremental sync.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/shelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "docshelf — multi-source document indexing and question answering",
    version,
    long_about = "docshelf keeps a vector-searchable chunk index incrementally synchronized \
    with heterogeneous document sources (local filesystem, S3-compatible object storage, \
    Microsoft Graph drives) and answers questions against the index."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed AI settings.
    ///
    /// Creates the SQLite database, runs idempotent migrations, and on
    /// first run only materializes the AI connector record from the
    /// OPENAI_* environment variables. Existing records are never
    /// overwritten.
    Init,

    /// List provider settings and their live status.
    ///
    /// Shows every persisted provider, whether it is enabled, whether a
    /// live connector could be constructed, and the reason when one
    /// could not.
    Sources,

    /// Manage persisted provider and AI settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Incrementally sync documents from providers into the index.
    ///
    /// Enumerates each selected provider, diffs change-detection tokens
    /// against index metadata, and re-embeds only new or changed
    /// documents. Orphaned documents are deleted or retained per the
    /// `cleanup_orphaned_documents` setting.
    ///
    /// Target format: `all`, `<kind>`, or `<kind>:<name>`.
    /// Examples: `all`, `local`, `local:docs`, `object_storage:runbooks`.
    Sync {
        /// Provider selector: `all`, a kind (`local`, `object_storage`,
        /// `cloud_drive`), or a specific instance (`local:docs`).
        target: String,

        /// Ignore change-detection tokens and re-embed everything.
        #[arg(long)]
        full: bool,

        /// Show planned actions without touching the index.
        #[arg(long)]
        dry_run: bool,

        /// Cap re-embedded documents per provider (overrides config).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Semantic search over indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Answer a question over the indexed corpus.
    ///
    /// Refines the question with the small chat model, retrieves the
    /// best-matching chunks, and answers with the large chat model.
    Ask {
        /// The question to answer.
        question: String,
    },
}

/// `shelf settings` subcommands.
#[derive(Subcommand)]
enum SettingsAction {
    /// Show all persisted settings.
    List,

    /// Upsert provider and AI settings from a TOML file.
    ///
    /// The file may contain any number of `[[provider]]` tables plus an
    /// optional `[ai]` table. Each entry is validated before writing;
    /// invalid entries are reported and skipped without affecting the
    /// others.
    Set {
        /// Path to the settings TOML file.
        #[arg(long)]
        file: PathBuf,
    },

    /// Remove one provider's settings record.
    Rm {
        /// Provider kind: `local`, `object_storage`, or `cloud_drive`.
        kind: String,
        /// Provider instance name.
        name: String,
    },
}

/// On-disk shape accepted by `shelf settings set`.
#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    provider: Vec<ProviderSettings>,
    #[serde(default)]
    ai: Option<AiSettings>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    // Environment is read exactly once, here, and threaded explicitly.
    let env_defaults = EnvDefaults::from_env();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config, &env_defaults).await,
        Commands::Sources => run_sources(&config).await,
        Commands::Settings { action } => run_settings(&config, action).await,
        Commands::Sync {
            target,
            full,
            dry_run,
            limit,
        } => run_sync(&config, &target, full, dry_run, limit).await,
        Commands::Search { query, limit } => {
            let pool = db::connect(&config.db.path).await?;
            let store = SettingsStore::new(pool.clone());
            search::run_search(&pool, &store, &query, limit).await?;
            pool.close().await;
            Ok(())
        }
        Commands::Ask { question } => {
            let pool = db::connect(&config.db.path).await?;
            let store = SettingsStore::new(pool.clone());
            ask::run_ask(&pool, &store, &question).await?;
            pool.close().await;
            Ok(())
        }
    }
}

async fn run_init(config: &Config, env_defaults: &EnvDefaults) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    run_migrations(&pool).await?;

    let store = SettingsStore::new(pool.clone());
    let outcome = seed_ai_settings(&store, env_defaults).await?;

    println!("shelf initialized at {}", config.db.path.display());
    match outcome {
        SeedOutcome::Seeded(ai) if ai.enabled => println!("  ai connector: seeded (enabled)"),
        SeedOutcome::Seeded(_) => {
            println!("  ai connector: seeded (disabled: OPENAI_API_KEY not set)");
        }
        SeedOutcome::AlreadyPresent => println!("  ai connector: already configured"),
    }

    pool.close().await;
    Ok(())
}

async fn run_sources(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = SettingsStore::new(pool.clone());
    let service = Arc::new(ConfigurationService::new(store.clone()));
    service.refresh().await?;

    let snapshot = service.snapshot();
    let diagnostics = service.diagnostics();

    println!("{:<36} {:<9} {:<6} NOTES", "PROVIDER", "ENABLED", "LIVE");
    for key in snapshot.sorted_keys() {
        let Some(setting) = snapshot.setting(key) else {
            continue;
        };
        let live = snapshot.provider(key).is_some();
        let note = if !setting.enabled() {
            "disabled".to_string()
        } else if live {
            String::new()
        } else {
            diagnostics
                .iter()
                .find(|issue| issue.key == *key)
                .map(|issue| issue.error.clone())
                .unwrap_or_else(|| "construction failed".to_string())
        };
        println!(
            "{:<36} {:<9} {:<6} {}",
            key.to_string(),
            setting.enabled(),
            live,
            note
        );
    }

    match store.get_ai().await? {
        Some(ai) => println!(
            "{:<36} {:<9} {:<6} {}",
            "ai",
            ai.enabled,
            "-",
            if ai.enabled { "" } else { "no api key" }
        ),
        None => println!("{:<36} {:<9} {:<6} not seeded; run `shelf init`", "ai", "-", "-"),
    }

    pool.close().await;
    Ok(())
}

async fn run_settings(config: &Config, action: SettingsAction) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = SettingsStore::new(pool.clone());

    match action {
        SettingsAction::List => {
            let all = store.list().await?;
            if all.is_empty() {
                println!("No provider settings. Add some with `shelf settings set --file <toml>`.");
            }
            for settings in &all {
                let extensions = settings
                    .file_extensions()
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{:<36} enabled={:<5} extensions=[{}]",
                    settings.key().to_string(),
                    settings.enabled(),
                    extensions
                );
            }
            if let Some(ai) = store.get_ai().await? {
                println!(
                    "{:<36} enabled={:<5} base_url={} models=({}, {})",
                    "ai", ai.enabled, ai.base_url, ai.chat_model_small, ai.chat_model_large
                );
            }
        }
        SettingsAction::Set { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read settings file: {}", file.display()))?;
            let parsed: SettingsFile =
                toml::from_str(&content).with_context(|| "Failed to parse settings file")?;

            let mut stored = 0usize;
            let mut rejected = 0usize;
            for settings in parsed.provider {
                let key = settings.key();
                match store.upsert(settings).await {
                    Ok(_) => {
                        println!("stored {key}");
                        stored += 1;
                    }
                    Err(e) => {
                        eprintln!("Warning: rejected {key}: {e}");
                        rejected += 1;
                    }
                }
            }
            if let Some(ai) = parsed.ai {
                match store.upsert_ai(ai).await {
                    Ok(_) => {
                        println!("stored ai");
                        stored += 1;
                    }
                    Err(e) => {
                        eprintln!("Warning: rejected ai: {e}");
                        rejected += 1;
                    }
                }
            }
            println!("{stored} stored, {rejected} rejected");
        }
        SettingsAction::Rm { kind, name } => {
            let Some(kind) = ProviderKind::parse(&kind) else {
                bail!("Unknown provider kind '{kind}'. Use local, object_storage, or cloud_drive.");
            };
            let key = ProviderKey::new(kind, &name);
            if store.delete(&key).await? {
                println!("removed {key}");
            } else {
                println!("no settings for {key}");
            }
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_sync(
    config: &Config,
    target: &str,
    full: bool,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = SettingsStore::new(pool.clone());
    let service = Arc::new(ConfigurationService::new(store.clone()));
    service.refresh().await?;
    let catalog = Catalog::new(service.clone());

    for issue in service.diagnostics().iter() {
        eprintln!("Warning: {} excluded: {}", issue.key, issue.error);
    }

    let providers = select_providers(&catalog, target)?;
    if providers.is_empty() {
        println!("No live providers matched '{target}'.");
        pool.close().await;
        return Ok(());
    }

    let ai = store.get_ai().await?;
    let opts = SyncOptions {
        cleanup_orphaned_documents: config.indexing.cleanup_orphaned_documents,
        force_full_reindex: config.indexing.force_full_reindex || full,
        max_files: limit.or(config.indexing.max_files),
    };

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    for provider in providers {
        if cancel.is_cancelled() {
            println!("cancelled");
            break;
        }

        let key = provider.key().clone();
        // A failing provider aborts only its own plan
        let plan = match build_plan(&pool, provider.as_ref(), &opts).await {
            Ok(plan) => plan,
            Err(e) => {
                eprintln!("Warning: {e}");
                continue;
            }
        };

        if dry_run {
            println!("sync {key} (dry-run)");
            println!("  reembed: {}", plan.reembed_count());
            println!("  skip:    {}", plan.skip_count());
            println!("  delete:  {}", plan.delete_count());
            println!("  retain:  {}", plan.retain_count());
            continue;
        }

        match execute_plan(
            &pool,
            provider.as_ref(),
            &plan,
            ai.as_ref(),
            &config.indexing,
            &cancel,
        )
        .await
        {
            Ok(outcome) => {
                println!("sync {key}");
                println!("  reembedded: {}", outcome.reembedded);
                println!("  skipped:    {}", outcome.skipped);
                println!("  deleted:    {}", outcome.deleted);
                if outcome.retained > 0 {
                    println!("  retained:   {}", outcome.retained);
                }
                println!("  chunks written: {}", outcome.chunks_written);
                if ai.as_ref().map(|a| a.enabled).unwrap_or(false) {
                    println!("  embeddings written: {}", outcome.embeddings_written);
                    println!("  embeddings pending: {}", outcome.embeddings_pending);
                }
                if outcome.cancelled {
                    println!("cancelled");
                    break;
                }
                println!("ok");
            }
            Err(e) => {
                eprintln!("Warning: sync failed for {key}: {e}");
            }
        }
    }

    pool.close().await;
    Ok(())
}

/// Resolve a sync target against the current snapshot.
fn select_providers(
    catalog: &Catalog,
    target: &str,
) -> Result<Vec<Arc<dyn DocumentProvider>>> {
    if target == "all" {
        return Ok(catalog.list_providers());
    }

    if let Some((kind_str, name)) = target.split_once(':') {
        let Some(kind) = ProviderKind::parse(kind_str) else {
            bail!("Unknown provider kind '{kind_str}'. Use local, object_storage, or cloud_drive.");
        };
        return match catalog.find_provider(kind, name) {
            Some(provider) => Ok(vec![provider]),
            None => {
                let key = ProviderKey::new(kind, name);
                match catalog.snapshot().setting(&key) {
                    Some(settings) if !settings.enabled() => {
                        bail!("Provider '{key}' is disabled.")
                    }
                    Some(_) => bail!(
                        "Provider '{key}' failed to construct; see `shelf sources` for the reason."
                    ),
                    None => bail!("No settings for provider '{key}'."),
                }
            }
        };
    }

    let Some(kind) = ProviderKind::parse(target) else {
        bail!(
            "Unknown sync target '{target}'. Use all, a kind (local, object_storage, \
             cloud_drive), or kind:name."
        );
    };
    Ok(catalog
        .list_providers()
        .into_iter()
        .filter(|p| p.key().kind == kind)
        .collect())
}
