use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use lookalike::{build_index, catalog, EngineConfig, ItemId, Searcher};
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "lookalike", about = "Build and query image similarity indexes")]
struct Cli {
    /// Path to config file (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an index from precomputed embeddings and persist it.
    Build {
        /// JSON-lines file, one `{"id": "...", "vector": [...]}` per line
        #[arg(long)]
        embeddings: PathBuf,
        /// Output directory (overrides `index_dir` from the config)
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },

    /// Query an existing index with a raw embedding.
    Query {
        /// JSON array of floats; read from stdin when omitted
        #[arg(long)]
        vector: Option<String>,
        /// Number of results (defaults to `default_k` from the config)
        #[arg(long, short = 'k', allow_negative_numbers = true)]
        top_k: Option<i64>,
        /// Index directory (overrides `index_dir` from the config)
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },

    /// List the item ids of every image under the corpus root.
    Discover {
        /// Corpus root (overrides `corpus_root` from the config)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

#[derive(Deserialize)]
struct EmbeddingLine {
    id: ItemId,
    vector: Vec<f32>,
}

fn main() -> anyhow::Result<()> {
    init_telemetry();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Build {
            embeddings,
            index_dir,
        } => cmd_build(config, &embeddings, index_dir),
        Commands::Query {
            vector,
            top_k,
            index_dir,
        } => cmd_query(config, vector, top_k, index_dir),
        Commands::Discover { root } => cmd_discover(config, root),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn cmd_build(
    mut config: EngineConfig,
    embeddings: &Path,
    index_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(dir) = index_dir {
        config.index_dir = dir;
    }

    let corpus = read_embeddings(embeddings)?;
    let artifacts = build_index(corpus, &config.build_params())?;
    artifacts
        .save(&config.index_dir)
        .with_context(|| format!("saving index to {}", config.index_dir.display()))?;

    println!("{}", artifacts.manifest.to_json()?);
    Ok(())
}

fn read_embeddings(path: &Path) -> anyhow::Result<Vec<(ItemId, Vec<f32>)>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut corpus = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EmbeddingLine = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
        corpus.push((record.id, record.vector));
    }
    tracing::info!(path = %path.display(), items = corpus.len(), "read embeddings");
    Ok(corpus)
}

fn cmd_query(
    mut config: EngineConfig,
    vector: Option<String>,
    top_k: Option<i64>,
    index_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(dir) = index_dir {
        config.index_dir = dir;
    }

    let text = match vector {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let raw: Vec<f32> = serde_json::from_str(&text).context("query vector must be a JSON array")?;
    if raw.is_empty() {
        bail!("query vector is empty");
    }

    let k = top_k.unwrap_or(config.default_k as i64);
    let searcher = Searcher::open(config)?;
    let hits = searcher.search(&raw, k)?;
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

fn cmd_discover(config: EngineConfig, root: Option<PathBuf>) -> anyhow::Result<()> {
    let root = root.unwrap_or(config.corpus_root);
    for path in catalog::discover_images(&root)? {
        println!("{}", catalog::relative_asset_path(&root, &path)?);
    }
    Ok(())
}
