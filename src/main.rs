//! Basic Memory CLI — a thin front-end: argument parsing, config
//! loading, and formatted output only. All business logic lives in the
//! library crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use basic_memory::config::Config;
use basic_memory::schema::ValidationMode;
use basic_memory::search::SearchMode;
use basic_memory::sync::SyncOptions;
use basic_memory::Engine;

#[derive(Parser)]
#[command(name = "basic-memory")]
#[command(about = "A local-first Markdown knowledge graph with bidirectional sync", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config document (TOML or YAML); created on first `init`.
    #[arg(short, long, default_value = "basic-memory.toml", global = true)]
    config: PathBuf,

    /// Project to operate on (defaults to the config's default project).
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Output format.
    #[arg(short, long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchModeArg {
    Fts,
    Vector,
    Hybrid,
}

impl From<SearchModeArg> for SearchMode {
    fn from(mode: SearchModeArg) -> Self {
        match mode {
            SearchModeArg::Fts => SearchMode::Fts,
            SearchModeArg::Vector => SearchMode::Vector,
            SearchModeArg::Hybrid => SearchMode::Hybrid,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ValidationModeArg {
    Warn,
    Strict,
    Off,
}

impl From<ValidationModeArg> for ValidationMode {
    fn from(mode: ValidationModeArg) -> Self {
        match mode {
            ValidationModeArg::Warn => ValidationMode::Warn,
            ValidationModeArg::Strict => ValidationMode::Strict,
            ValidationModeArg::Off => ValidationMode::Off,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a project in the config document and open its store.
    Init {
        name: String,
        path: PathBuf,
        #[arg(long)]
        default: bool,
    },

    /// Reconcile the project directory with the derived graph store.
    Sync {
        /// Re-scan and re-derive everything, including every
        /// Dataview-bearing note's relations.
        #[arg(long)]
        force_full: bool,
    },

    /// Show entity/relation counts and watch-service health.
    Status,

    /// Full-text, vector, or hybrid search over a project's notes.
    Search {
        query: String,
        #[arg(long, value_enum, default_value = "fts")]
        mode: SearchModeArg,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Picoschema inference, validation, and drift detection.
    Schema {
        #[command(subcommand)]
        action: SchemaCommands,
    },

    /// Run the debounced watch service in the foreground.
    Watch,
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Suggest a Picoschema from current usage across all notes of this type.
    Infer { entity_type: String },
    /// Check notes of this type against their declared (or inferred) schema.
    Validate {
        entity_type: String,
        #[arg(long, value_enum)]
        mode: Option<ValidationModeArg>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        if let Some(err) = e.downcast_ref::<basic_memory::Error>() {
            if let Some(suggestion) = err.suggestion() {
                eprintln!("Hint: {suggestion}");
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { name, path, default } => cmd_init(&cli.config, name, path, default, cli.format).await,
        Commands::Sync { force_full } => {
            let engine = build_engine(&cli.config).await?;
            cmd_sync(&engine, cli.project.as_deref(), force_full, cli.format).await
        }
        Commands::Status => {
            let engine = build_engine(&cli.config).await?;
            cmd_status(&engine, cli.project.as_deref(), cli.format).await
        }
        Commands::Search { query, mode, limit, offset } => {
            let engine = build_engine(&cli.config).await?;
            cmd_search(&engine, cli.project.as_deref(), &query, mode, limit, offset, cli.format).await
        }
        Commands::Schema { action } => {
            let engine = build_engine(&cli.config).await?;
            cmd_schema(&engine, cli.project.as_deref(), action, cli.format).await
        }
        Commands::Watch => {
            let engine = build_engine(&cli.config).await?;
            cmd_watch(&engine, cli.project.as_deref()).await
        }
    }
}

/// Loads the config document if it exists; a missing document is not an
/// error here (`init` is how one gets created), so callers fall back to
/// an empty config rather than failing every other subcommand too.
async fn build_engine(config_path: &Path) -> anyhow::Result<Engine> {
    let config = if config_path.exists() { Config::load(config_path).await? } else { Config::default() };
    Ok(Engine::new(config))
}

async fn cmd_init(config_path: &Path, name: String, path: PathBuf, is_default: bool, format: OutputFormat) -> anyhow::Result<()> {
    let mut engine = build_engine(config_path).await?;
    tokio::fs::create_dir_all(&path).await?;
    engine.register_project(name.clone(), path.clone(), is_default);
    engine.save_config(config_path).await?;
    // Open once so the database file and schema exist immediately.
    engine.project(Some(&name)).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({"project": name, "path": path.display().to_string()}));
        }
        OutputFormat::Table => println!("Project '{}' registered at {}", name, path.display()),
    }
    Ok(())
}

async fn cmd_sync(engine: &Engine, project: Option<&str>, force_full: bool, format: OutputFormat) -> anyhow::Result<()> {
    let handle = engine.project(project).await?;
    let mut sync_engine = handle.sync_engine(engine.config().ignore_file_name.clone());
    let report = sync_engine.sync(SyncOptions { force_full, include_dataview: true }).await?;

    match format {
        OutputFormat::Json => {
            let errors: Vec<_> =
                report.errors.iter().map(|e| serde_json::json!({"path": e.path, "message": e.message})).collect();
            println!(
                "{}",
                serde_json::json!({
                    "created": report.created,
                    "updated": report.updated,
                    "deleted": report.deleted,
                    "moved": report.moved,
                    "dataview_refreshed": report.dataview_refreshed,
                    "errors": errors,
                })
            );
        }
        OutputFormat::Table => {
            println!("Sync complete:");
            println!("  created:            {}", report.created);
            println!("  updated:            {}", report.updated);
            println!("  deleted:            {}", report.deleted);
            println!("  moved:              {}", report.moved);
            println!("  dataview refreshed: {}", report.dataview_refreshed);
            if !report.errors.is_empty() {
                println!("  errors:");
                for e in &report.errors {
                    println!("    {}: {}", e.path, e.message);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_status(engine: &Engine, project: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let handle = engine.project(project).await?;
    let entities = handle.store.list_entities(handle.id).await?;
    let mut relation_count = 0;
    for entity in &entities {
        relation_count += handle.store.list_outgoing_relations(entity.id).await?.len();
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "project": handle.config.name,
                "path": handle.config.path.display().to_string(),
                "entities": entities.len(),
                "relations": relation_count,
            })
        ),
        OutputFormat::Table => {
            println!("Project: {}", handle.config.name);
            println!("Path:    {}", handle.config.path.display());
            println!("Entities:  {}", entities.len());
            println!("Relations: {}", relation_count);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_search(
    engine: &Engine,
    project: Option<&str>,
    query: &str,
    mode: SearchModeArg,
    limit: usize,
    offset: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let handle = engine.project(project).await?;
    let semantic_enabled = engine.config().semantic_search_enabled;
    let results = handle.search.search(handle.id, query, mode.into(), semantic_enabled, limit, offset).await?;

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = results
                .iter()
                .map(|r| serde_json::json!({"permalink": r.permalink, "title": r.title, "snippet": r.snippet, "score": r.score}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            if results.is_empty() {
                println!("No results.");
            }
            for r in &results {
                println!("{}  ({})", r.title, r.permalink);
                println!("  {}", r.snippet);
            }
            println!("\n({} result(s))", results.len());
        }
    }
    Ok(())
}

async fn cmd_schema(engine: &Engine, project: Option<&str>, action: SchemaCommands, format: OutputFormat) -> anyhow::Result<()> {
    let handle = engine.project(project).await?;
    match action {
        SchemaCommands::Infer { entity_type } => {
            let result = handle.schema.infer(handle.id, &entity_type).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "entity_type": result.entity_type,
                        "notes_analyzed": result.notes_analyzed,
                        "suggested_schema": result.suggested_schema,
                        "required": result.suggested_required,
                        "optional": result.suggested_optional,
                        "excluded": result.excluded,
                    })
                ),
                OutputFormat::Table => {
                    println!("Inferred schema for '{}' ({} notes analyzed):", result.entity_type, result.notes_analyzed);
                    for (name, declaration) in &result.suggested_schema {
                        println!("  {}: {}", name, declaration);
                    }
                    if !result.excluded.is_empty() {
                        println!("  excluded (below threshold): {}", result.excluded.join(", "));
                    }
                }
            }
        }
        SchemaCommands::Validate { entity_type, mode } => {
            let report = handle.schema.validate(handle.id, &entity_type, mode.map(Into::into)).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "entity_type": report.entity_type,
                        "total_notes": report.total_notes,
                        "valid": report.valid_count,
                        "warnings": report.warning_count,
                        "errors": report.error_count,
                    })
                ),
                OutputFormat::Table => {
                    println!(
                        "Validation for '{}': {}/{} valid, {} warning(s), {} error(s)",
                        report.entity_type, report.valid_count, report.total_notes, report.warning_count, report.error_count
                    );
                    for issue in &report.issues {
                        println!("  [{:?}] {} ({}): {}", issue.severity, issue.identifier, issue.field, issue.message);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn cmd_watch(engine: &Engine, project: Option<&str>) -> anyhow::Result<()> {
    let handle = engine.project(project).await?;
    let debounce_ms = engine.config().watch_debounce_ms;
    let watch_service = handle.watch_service(debounce_ms);
    let sync_engine = Arc::new(tokio::sync::Mutex::new(handle.sync_engine(engine.config().ignore_file_name.clone())));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    println!("Watching {} (press Ctrl-C to stop)...", handle.config.path.display());
    watch_service.run(sync_engine, shutdown_rx).await?;
    Ok(())
}
