//! `kengine` — CLI entry point for the knowledge engine.
//!
//! ```text
//! kengine ingest <dir>                          ingest a YAML document tree
//! kengine query <question> [--mode MODE]        retrieve/answer (MODE: keyword|semantic|hybrid|fusion|enhanced)
//! kengine get <store_type> <document_id>         print a document's chunks
//! kengine stats                                  print corpus counts
//! kengine sync-sidecars                          rebuild missing embedding sidecars
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use knowledge_engine_core::store::Store;

use knowledge_engine::config;
use knowledge_engine::db;
use knowledge_engine::get;
use knowledge_engine::ingest;
use knowledge_engine::migrate;
use knowledge_engine::search::{self, SearchMode};
use knowledge_engine::sidecar::SidecarStore;
use knowledge_engine::sqlite_store::SqliteStore;

#[derive(Parser)]
#[command(name = "kengine", about = "A local-first retrieval-augmented knowledge engine", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Ingest a directory of YAML documents
    Ingest {
        /// Root directory to walk for `.yaml`/`.yml` files
        dir: PathBuf,

        /// Directory for content-addressed embedding sidecars
        #[arg(long, default_value = ".embeddings")]
        sidecar_dir: PathBuf,
    },

    /// Query the indexed corpus
    Query {
        /// The question or search text
        question: String,

        /// Retrieval mode: keyword, semantic, hybrid, fusion, or enhanced
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a document's chunks by id
    Get {
        store_type: String,
        document_id: String,
    },

    /// Print corpus statistics
    Stats,

    /// Rebuild any embedding sidecars missing from disk
    SyncSidecars {
        #[arg(long, default_value = ".embeddings")]
        sidecar_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let exit_code = run(cli).await;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    match run_command(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            match err.downcast_ref::<knowledge_engine_core::error::EngineError>() {
                Some(engine_err) => engine_err.exit_tier() as i32,
                None => 2,
            }
        }
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dir, sidecar_dir } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let store = SqliteStore::new(pool.clone());

            let source = ingest::YamlDirectorySource::new(dir);
            let embedder = search::build_embedder(&cfg)?;
            let mut sidecars = SidecarStore::open(&sidecar_dir, &cfg.embedding.model, cfg.embedding.dims)?;

            let report = ingest::ingest_all(&source, &store, embedder.as_ref(), &mut sidecars, cfg.embedding.batch_size).await?;
            pool.close().await;

            println!(
                "ingested {} documents, {} chunks, {} sidecars written, {} sequential edges, {} hierarchical edges",
                report.documents, report.chunks, report.sidecars_written, report.sequential_edges, report.hierarchical_edges
            );
        }
        Commands::Query { question, mode, limit } => {
            let mode = SearchMode::from_str(&mode)?;
            search::run_query(&cfg, &question, mode, limit).await?;
        }
        Commands::Get { store_type, document_id } => {
            get::run_get(&cfg, &store_type, &document_id).await?;
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());
            let stats = store.get_stats().await?;
            pool.close().await;

            println!("documents: {}", stats.totals.documents);
            println!("chunks: {}", stats.totals.chunks);
            println!("embeddings: {}", stats.totals.embeddings);
            for (store_type, counts) in &stats.by_store_type {
                println!("  {store_type}: {} documents, {} chunks, {} embeddings", counts.documents, counts.chunks, counts.embeddings);
            }
            for (chunk_type, count) in &stats.by_chunk_type {
                println!("  chunk_type {chunk_type}: {count}");
            }
        }
        Commands::SyncSidecars { sidecar_dir } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());
            let mut sidecars = SidecarStore::open(&sidecar_dir, &cfg.embedding.model, cfg.embedding.dims)?;
            let written = sidecars.sync(&store).await?;
            pool.close().await;
            println!("wrote {written} sidecar(s)");
        }
    }

    Ok(())
}
