//! coderag CLI - resumable code indexing and semantic search

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use coderag::{
    format_results, format_results_json, CancellationFlag, Config, EmbeddingModel, HitFilter,
    IndexStatus, IndexWatcher, IndexingPipeline, LocalEmbedder, LocalVectorStore, PendingMarker,
    ProgressRecord, ReindexCoordinator, ReindexReport, RunOutcome, Searcher, VectorStore,
};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "coderag")]
#[command(author, version, about = "Resumable incremental code indexing for semantic search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory (holds .coderag/ and the pending-reindex marker)
    #[arg(short = 'w', long, default_value = ".", env = "CODERAG_WORK_DIR")]
    work_dir: PathBuf,

    /// Embedding model to use (overrides the saved config)
    #[arg(long, env = "CODERAG_MODEL")]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a directory, resuming an interrupted run if there is one
    Index {
        /// Path to index
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Comma-separated extensions to index (e.g. "go,py,rs")
        #[arg(short, long, value_delimiter = ',')]
        extensions: Option<Vec<String>>,

        /// Forget saved progress and start from scratch
        #[arg(long)]
        reset: bool,
    },

    /// Delete and rebuild the chunks of specific files
    Reindex {
        /// Files to reindex (missing files are removed from the index)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Reindex the files listed in the pending-reindex marker
    ReindexPending,

    /// Show progress of the current or last indexing run
    Progress {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search the index
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'm', long, env = "CODERAG_MAX_COUNT")]
        max_count: Option<usize>,

        /// Minimum similarity score
        #[arg(long)]
        min_score: Option<f32>,

        /// Only show results in these languages
        #[arg(short, long, value_delimiter = ',')]
        lang: Option<Vec<String>>,

        /// Only show files whose path matches this regex
        #[arg(long)]
        path_pattern: Option<String>,

        /// Hide files whose path matches this regex
        #[arg(long)]
        exclude: Option<String>,

        /// Show locations only
        #[arg(long)]
        compact: bool,

        /// Lines of each chunk to show
        #[arg(long, default_value = "15")]
        excerpt_lines: usize,

        /// Output as JSON
        #[arg(long, env = "CODERAG_JSON")]
        json: bool,
    },

    /// Show index statistics
    Stats,

    /// Index, then watch for file changes and reindex them
    Watch {
        /// Path to watch
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List available embedding models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let work_dir = cli
        .work_dir
        .canonicalize()
        .with_context(|| format!("Working directory {:?} not found", cli.work_dir))?;
    let mut config = Config::load_or_default(work_dir)?;
    if let Some(model) = cli.model {
        config = config.with_model(model.parse::<EmbeddingModel>()?);
    }

    match cli.command {
        Commands::Index {
            path,
            extensions,
            reset,
        } => {
            if let Some(extensions) = extensions {
                config = config.with_extensions(extensions);
            }
            cmd_index(config, path, reset).await
        }
        Commands::Reindex { files } => cmd_reindex(config, files),
        Commands::ReindexPending => cmd_reindex_pending(config),
        Commands::Progress { json } => cmd_progress(&config, json),
        Commands::Search {
            query,
            max_count,
            min_score,
            lang,
            path_pattern,
            exclude,
            compact,
            excerpt_lines,
            json,
        } => {
            let mut filter = HitFilter::new();
            if let Some(lang) = lang {
                filter = filter.with_languages(lang);
            }
            if let Some(pattern) = path_pattern {
                filter = filter.with_path_pattern(&pattern)?;
            }
            if let Some(pattern) = exclude {
                filter = filter.with_exclude_pattern(&pattern)?;
            }

            let limit = max_count.unwrap_or(config.top_k);
            let min_score = min_score.unwrap_or(config.min_score);
            cmd_search(&config, &query, limit, min_score, &filter, compact, excerpt_lines, json)
        }
        Commands::Stats => cmd_stats(&config),
        Commands::Watch { path } => cmd_watch(config, path).await,
        Commands::Models => cmd_models(),
    }
}

fn open_backends(config: &Config) -> Result<(Arc<LocalEmbedder>, Arc<LocalVectorStore>)> {
    let embedder = LocalEmbedder::new(config.model)?;
    let store = LocalVectorStore::open(config.store_dir())?;
    Ok((Arc::new(embedder), Arc::new(store)))
}

/// Set `cancel` on the first Ctrl+C
fn cancel_on_ctrl_c(cancel: CancellationFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} finishing current batch...", "Interrupted,".yellow());
            cancel.cancel();
        }
    });
}

fn resolve(work_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        work_dir.join(path)
    }
}

async fn cmd_index(config: Config, path: PathBuf, reset: bool) -> Result<()> {
    let root = resolve(&config.work_dir, path)
        .canonicalize()
        .context("Path to index not found")?;
    println!("{} {:?}", "Indexing".cyan().bold(), root);
    config.save()?;

    let cancel = CancellationFlag::new();
    cancel_on_ctrl_c(cancel.clone());

    let (outcome, record) = tokio::task::spawn_blocking(move || -> Result<_> {
        let (embedder, store) = open_backends(&config)?;
        let pipeline = IndexingPipeline::new(config, embedder, store)?;
        if reset {
            pipeline.reset_state()?;
        }
        let outcome = pipeline.index_directory(&root, &cancel)?;
        Ok((outcome, pipeline.progress()))
    })
    .await??;

    match outcome {
        RunOutcome::Completed => println!("\n{} Indexing complete", "✓".green()),
        RunOutcome::Interrupted => println!(
            "\n{} Indexing interrupted; run {} again to resume",
            "!".yellow(),
            "coderag index".yellow()
        ),
    }
    if let Some(record) = record {
        print_progress(&record);
    }

    Ok(())
}

fn cmd_reindex(config: Config, files: Vec<PathBuf>) -> Result<()> {
    let files: Vec<PathBuf> = files
        .into_iter()
        .map(|f| resolve(&config.work_dir, f))
        .collect();

    let (embedder, store) = open_backends(&config)?;
    let coordinator = ReindexCoordinator::new(&config, embedder, store);
    let report = coordinator.reindex_files(&files)?;
    print_report(&report);

    Ok(())
}

fn cmd_reindex_pending(config: Config) -> Result<()> {
    let marker = PendingMarker::new(config.marker_path());
    if !marker.path().exists() {
        println!("No pending reindex requests");
        return Ok(());
    }

    let (embedder, store) = open_backends(&config)?;
    let coordinator = ReindexCoordinator::new(&config, embedder, store);
    match coordinator.reindex_from_marker(&marker)? {
        Some(report) => print_report(&report),
        None => println!("No pending reindex requests"),
    }

    Ok(())
}

fn cmd_progress(config: &Config, json: bool) -> Result<()> {
    let path = config.state_path();
    if !path.exists() {
        println!("No indexing run recorded. Run {} first.", "coderag index".yellow());
        return Ok(());
    }

    let record = ProgressRecord::load(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_progress(&record);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_search(
    config: &Config,
    query: &str,
    limit: usize,
    min_score: f32,
    filter: &HitFilter,
    compact: bool,
    excerpt_lines: usize,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Search query must not be empty");
    }

    let (embedder, store) = open_backends(config)?;
    let searcher = Searcher::new(embedder, store, config.collection_name.clone());
    let hits = searcher.search(query, limit, min_score, filter)?;

    if json {
        println!("{}", format_results_json(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results found for: {}", query.yellow());
        return Ok(());
    }

    println!(
        "\n{} results for \"{}\":\n",
        hits.len().to_string().green().bold(),
        query.cyan()
    );
    print!("{}", format_results(&hits, compact, excerpt_lines));

    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let store = LocalVectorStore::open(config.store_dir())?;
    let info = store.collection_info(&config.collection_name)?;

    println!("{}", "Index Statistics".cyan().bold());
    println!("  Collection: {}", config.collection_name.green());
    println!("  Chunks:     {}", info.points_count.to_string().green());
    println!("  Dimension:  {}", info.vector_dimension.to_string().green());
    println!("  Model:      {}", config.model.model_name().yellow());

    if let Ok(record) = ProgressRecord::load(&config.state_path()) {
        println!("  Files:      {}", record.indexed_files.to_string().green());
        println!("  Last run:   {}", record.status);
    }

    Ok(())
}

async fn cmd_watch(config: Config, path: PathBuf) -> Result<()> {
    let root = resolve(&config.work_dir, path)
        .canonicalize()
        .context("Path to watch not found")?;
    println!("{} {:?}", "Watching".cyan().bold(), root);
    config.save()?;

    let cancel = CancellationFlag::new();
    cancel_on_ctrl_c(cancel.clone());

    tokio::task::spawn_blocking(move || -> Result<()> {
        let (embedder, store) = open_backends(&config)?;

        let pipeline = IndexingPipeline::new(config.clone(), embedder.clone(), store.clone())?;
        if pipeline.index_directory(&root, &cancel)? == RunOutcome::Interrupted {
            return Ok(());
        }
        if let Some(record) = pipeline.progress() {
            println!(
                "\n{} Index ready ({} files, {} chunks)",
                "✓".green(),
                record.indexed_files,
                record.total_chunks
            );
        }
        println!("  Watching for changes. Press Ctrl+C to stop.\n");

        let coordinator = ReindexCoordinator::new(&config, embedder, store);
        IndexWatcher::new(&root, &config, coordinator)?.watch(&cancel)?;
        Ok(())
    })
    .await??;

    Ok(())
}

fn print_progress(record: &ProgressRecord) {
    let status = match record.status {
        IndexStatus::Completed => record.status.to_string().green(),
        IndexStatus::InProgress => record.status.to_string().yellow(),
        IndexStatus::Failed => record.status.to_string().red(),
    };

    println!("{}", "Indexing Progress".cyan().bold());
    println!("  Root:     {}", record.root_path.display());
    println!("  Status:   {}", status);
    println!(
        "  Files:    {}/{} ({:.1}%)",
        record.indexed_files,
        record.total_files,
        record.progress_percent()
    );
    println!("  Chunks:   {}", record.total_chunks);
    if let Some(duration) = record.duration() {
        println!("  Duration: {}s", duration.num_seconds());
    }

    if !record.failed_files.is_empty() {
        println!("  {}:", "Failed files".red());
        for (file, error) in &record.failed_files {
            println!("    {} ({})", file, error.dimmed());
        }
    }
}

fn print_report(report: &ReindexReport) {
    println!(
        "{} Reindexed {} of {} files ({} removed), {} chunks",
        "✓".green(),
        report.reindexed_files,
        report.requested,
        report.missing,
        report.chunks
    );

    for (file, error) in report.delete_failures.iter().chain(&report.chunk_failures) {
        println!("  {} {} ({})", "!".yellow(), file, error.dimmed());
    }
}

fn cmd_models() -> Result<()> {
    println!("{}", "Available Embedding Models".cyan().bold());
    println!();
    println!("  {}", "minilm".green().bold());
    println!("    Fast, lightweight model (384 dims, ~30MB)");
    println!();
    println!("  {}", "bge".green().bold());
    println!("    High quality retrieval model (384 dims, ~90MB)");
    println!();
    println!("  {} (default)", "nomic".green().bold());
    println!("    Optimized for code and technical content (768 dims, ~90MB)");
    println!();
    println!("  {}", "multilingual".green().bold());
    println!("    Supports 100+ languages (384 dims, ~470MB)");
    println!();
    println!("Usage: {} --model bge index .", "coderag".yellow());

    Ok(())
}
