mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use lore_core::config::Config;
use lore_core::knowledge::embedder::WaveOptions;
use lore_core::knowledge::{Corpus, GraphStore, IndexBuilder, RetrievalService, SearchRequest};

#[derive(Parser)]
#[command(name = "lore")]
#[command(about = "Hybrid graph and vector retrieval over code, client UI, game data and docs", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./lore.toml, then ~/.config/lore/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, the store and a lore.toml
    Init {
        /// Overwrite an existing lore.toml
        #[arg(long)]
        force: bool,
    },
    /// Serve the tool surface over stdio
    Serve,
    /// Search one corpus
    Search {
        /// code, client, gamedata or docs
        corpus: String,
        #[arg(required = true)]
        query: Vec<String>,
        /// Only results of this data type or node type
        #[arg(long = "type")]
        type_filter: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Skip cross-corpus expansion
        #[arg(long)]
        no_expand: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show corpus statistics
    Stats {
        /// Limit to one corpus
        corpus: Option<String>,
    },
    /// Embed a corpus and rebuild its vector index
    BuildIndex {
        corpus: String,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path).wrap_err_with(|| format!("loading {}", path.display()))?,
        None => Config::load().wrap_err("loading configuration")?,
    };

    match cli.command {
        Commands::Init { force } => init(&config, force),
        Commands::Serve => {
            let service = RetrievalService::open(&config).await?;
            serve::run(Arc::new(service)).await?;
            Ok(())
        }
        Commands::Search {
            corpus,
            query,
            type_filter,
            limit,
            no_expand,
            json,
        } => {
            let corpus: Corpus = corpus.parse()?;
            let service = RetrievalService::open(&config).await?;

            let mut request = SearchRequest::new(query.join(" ")).corpus(corpus).expand(!no_expand);
            if let Some(limit) = limit {
                request = request.limit(limit);
            }
            if let Some(type_filter) = type_filter {
                request = request.type_filter(type_filter);
            }

            let response = service.search(request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response.results)?);
                return Ok(());
            }

            println!("Route: {:?}", response.route.strategy);
            if response.results.is_empty() {
                println!("No results.");
            }
            for (rank, r) in response.results.iter().enumerate() {
                println!(
                    "{:>2}. [{:.3}] {} ({}, {})",
                    rank + 1,
                    r.score,
                    r.display_name,
                    r.corpus,
                    r.data_type.as_deref().unwrap_or(&r.node_type)
                );
                if let Some(path) = &r.file_path {
                    match r.line_start {
                        Some(line) => println!("    {}:{}", path, line),
                        None => println!("    {}", path),
                    }
                }
                if let Some(from) = &r.bridged_from {
                    println!("    via {} from {}", r.bridge_edge_type.map(|e| e.to_string()).unwrap_or_default(), from);
                }
            }
            Ok(())
        }
        Commands::Stats { corpus } => {
            let corpora = match corpus {
                Some(name) => vec![name.parse::<Corpus>()?],
                None => Corpus::ALL.to_vec(),
            };
            let service = RetrievalService::open(&config).await?;
            for corpus in corpora {
                let stats = service.corpus_stats(corpus).await?;
                println!("{}", corpus.display_name());
                println!("  Nodes: {}", stats.node_count);
                println!("  Edges: {}", stats.edge_count);
                println!("  Vector index: {}", if stats.vector_index_loaded { "loaded" } else { "none" });
                for (kind, count) in &stats.type_breakdown {
                    println!("    {:<24} {}", kind, count);
                }
            }
            Ok(())
        }
        Commands::BuildIndex { corpus } => {
            let corpus: Corpus = corpus.parse()?;
            let service = RetrievalService::open(&config).await?;
            service
                .embedder()
                .validate()
                .await
                .wrap_err("embedding provider is not usable")?;

            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                    .map_err(|e| eyre!("progress template: {}", e))?
                    .progress_chars("#>-"),
            );

            let report = IndexBuilder::new(&service, WaveOptions::from_config(&config.embedding))
                .build_corpus_index(corpus, |done, total| {
                    pb.set_length(total as u64);
                    pb.set_position(done as u64);
                })
                .await?;
            pb.finish_and_clear();

            println!(
                "Indexed {} {} chunks ({} dimensions) in {} ms",
                report.vectors,
                corpus.display_name(),
                report.dimension,
                report.elapsed_ms
            );
            println!("  {}", config.storage.index_path(corpus).display());
            Ok(())
        }
    }
}

fn init(config: &Config, force: bool) -> color_eyre::Result<()> {
    let data_dir = PathBuf::from(&config.storage.data_dir);
    std::fs::create_dir_all(config.storage.vectors_path())
        .wrap_err_with(|| format!("creating {}", data_dir.display()))?;

    let store = GraphStore::open_with_config(&config.storage)?;
    println!("Store ready at {} (schema v{})", config.storage.db_path().display(), store.schema_version()?);

    let config_path = PathBuf::from("lore.toml");
    if config_path.exists() && !force {
        println!("lore.toml already exists (use --force to overwrite)");
    } else {
        std::fs::write(&config_path, Config::default_config_string())
            .wrap_err_with(|| format!("writing {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }
    Ok(())
}

/// Logs go to stderr so `serve` keeps stdout for protocol frames.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LORE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("lore_core=info,lore=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
