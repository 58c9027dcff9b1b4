use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use luma_rag::{
    config::Config,
    embeddings,
    indexer::Indexer,
    query::{build_prompt, SearchFilter, SearchOutcome},
    service::RagService,
    utils,
    watcher::FolderWatcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "luma-rag")]
#[command(about = "Local retrieval index over your documents, with cited search results")]
#[command(version)]
struct Cli {
    /// Config file (default: config/rag.toml or ~/.config/luma/rag.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index folders (defaults to the configured folders)
    Index {
        #[arg(value_name = "DIR")]
        folders: Vec<PathBuf>,
        /// Directory names to skip (adds to the configured excludes)
        #[arg(long, value_name = "NAME")]
        exclude: Vec<String>,
        /// Drop the existing index so it only holds these folders
        #[arg(long)]
        replace: bool,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Search indexed chunks
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
        /// Only chunks whose parent folder has exactly this name
        #[arg(long)]
        folder: Option<String>,
        /// Earliest modification time (ISO-8601)
        #[arg(long)]
        from: Option<String>,
        /// Latest modification time (ISO-8601)
        #[arg(long)]
        to: Option<String>,
        /// Prefer files under these path prefixes
        #[arg(long, value_name = "PATH")]
        prefix: Vec<String>,
    },
    /// Print the system and user messages for answering a question
    Prompt {
        #[arg(value_name = "QUESTION")]
        question: String,
        /// Number of snippets to include
        #[arg(long)]
        n_ctx: Option<usize>,
    },
    /// Show index status
    Status,
    /// Keep the index up to date as files change
    Watch {
        #[arg(value_name = "DIR")]
        folders: Vec<PathBuf>,
    },
    /// Rebuild the index without deleted chunks
    Compact,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("luma_rag=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_time(value: Option<&str>) -> Result<Option<chrono::NaiveDateTime>> {
    value
        .map(|v| utils::parse_iso(v).with_context(|| format!("Invalid timestamp: {v}")))
        .transpose()
}

fn folders_or_configured(folders: Vec<PathBuf>, config: &Config) -> Result<Vec<PathBuf>> {
    let folders = if folders.is_empty() {
        config.index_folders()
    } else {
        folders
    };
    if folders.is_empty() {
        anyhow::bail!("No folders given and none configured under [index] folders");
    }
    Ok(folders)
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files ({msg})")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_default(),
    };

    let embedder = embeddings::from_config(&config.embedding).context("Failed to set up embeddings")?;
    let service = Arc::new(
        RagService::open(&config, embedder)
            .await
            .context("Failed to open index")?,
    );
    for warning in service.status().warnings {
        eprintln!("Warning: {}", warning);
    }

    match cli.command {
        Commands::Index {
            folders,
            exclude,
            replace,
            yes,
        } => {
            let folders = folders_or_configured(folders, &config)?;
            let mut excludes = config.index.excludes.clone();
            excludes.extend(exclude);

            if replace && !yes {
                use dialoguer::Confirm;
                let proceed = Confirm::new()
                    .with_prompt("Replace the existing index with only these folders?")
                    .default(false)
                    .interact()
                    .context("Failed to read user input")?;

                if !proceed {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            for folder in &folders {
                println!("Indexing: {}", folder.display());
            }
            let pb = progress_bar()?;
            let report = {
                let pb = pb.clone();
                move |n: usize, total: usize, path: &Path| {
                    pb.set_length(total as u64);
                    pb.set_position(n as u64);
                    pb.set_message(
                        path.file_name()
                            .map(|f| f.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    );
                }
            };
            let summary = service
                .ensure_index_started(&folders, &excludes, replace, Some(&report))
                .await?;
            pb.finish_and_clear();

            let status = service.status();
            println!(
                "✓ {} chunks added, {} removed ({} active, {} rows)",
                summary.added, summary.deleted, status.active_chunks, status.chunks
            );
        }
        Commands::Search {
            query,
            k,
            folder,
            from,
            to,
            prefix,
        } => {
            let filter = SearchFilter {
                folder,
                time_from: parse_time(from.as_deref())?,
                time_to: parse_time(to.as_deref())?,
                prefilter_paths: prefix,
            };
            let k = k.unwrap_or(config.query.k);

            match service.search(&query, k, &filter).await {
                SearchOutcome::IndexEmpty => println!("The index is empty. Run `luma-rag index` first."),
                SearchOutcome::ModelUnavailable(reason) => {
                    anyhow::bail!("Embedding model unavailable: {}", reason)
                }
                SearchOutcome::NoMatches => println!("No matching files."),
                SearchOutcome::Ranked(hits) => {
                    println!("Found {} results:", hits.len());
                    for (i, hit) in hits.iter().enumerate() {
                        let preview: String = hit.meta.text.chars().take(160).collect();
                        println!("\n[{}] {:.3}  {}", i + 1, hit.score, hit.citation_tag());
                        println!("    {}", preview.replace('\n', " "));
                    }
                    if service.is_low_confidence(&hits) {
                        println!("\n⚠️  Low confidence: results may not answer the query");
                    }
                }
            }
        }
        Commands::Prompt { question, n_ctx } => {
            let n_ctx = n_ctx.unwrap_or(config.query.n_ctx);
            let k = config.query.k.max(n_ctx * 2);
            let hits = service
                .search(&question, k, &SearchFilter::default())
                .await
                .into_hits();
            if service.is_low_confidence(&hits) {
                eprintln!("Warning: low confidence ({} hits)", hits.len());
            }
            let (system, user) = build_prompt(&question, &hits, n_ctx);
            println!("{}\n\n{}", system, user);
        }
        Commands::Status => {
            let mut status = service.status();
            status.folders = config
                .index_folders()
                .iter()
                .map(|f| f.display().to_string())
                .collect();
            println!("Storage: {}", service.index().paths().home.display());
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Watch { folders } => {
            let folders = folders_or_configured(folders, &config)?;
            let watcher = FolderWatcher::new(
                &folders,
                &config.index.excludes,
                Duration::from_millis(config.watcher.debounce_ms),
            );
            if watcher.roots().is_empty() {
                anyhow::bail!("None of the given folders can be watched");
            }
            let mut rx = watcher.subscribe();
            service.set_watching(true);
            println!("Watcher started. Press Ctrl+C to stop.");

            let indexer: Arc<dyn Indexer> = service.clone();
            let run = watcher.run(indexer);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    result = &mut run => {
                        result?;
                        break;
                    }
                    update = rx.recv() => {
                        if let Ok(update) = update {
                            println!(
                                "{}: +{} -{}",
                                update.path.display(),
                                update.summary.added,
                                update.summary.deleted
                            );
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            service.set_watching(false);
        }
        Commands::Compact => {
            let stats = service.compact().await?;
            println!(
                "✓ Compacted: {} rows -> {} rows ({} reclaimed)",
                stats.rows_before,
                stats.rows_after,
                stats.reclaimed()
            );
        }
    }

    Ok(())
}
