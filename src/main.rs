use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mettarag::config::{Config, DEFAULT_CONFIG_PATH};
use mettarag::db::Db;
use mettarag::deps::add_function_dependencies;
use mettarag::config::ModelConfig;
use mettarag::embedder::download::{all_files_present, download_model_files};
use mettarag::embedder::{Embedder, OnnxEmbedder};
use mettarag::indexer::Indexer;
use mettarag::mcp::server::{McpContext, McpServer};
use mettarag::rag::Document;
use mettarag::rag::context::assemble_context;
use mettarag::rag::retriever::Retriever;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mettarag", version)]
#[command(about = "MeTTa code retrieval with function-dependency expansion")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP tools on stdio (default)
    Serve,

    /// Chunk, embed and store a repository checkout
    Ingest {
        /// Repository root
        dir: PathBuf,
        #[arg(long)]
        project: String,
        #[arg(long)]
        repo: String,
        /// Delete the project/repo's existing chunks first
        #[arg(long)]
        replace: bool,
    },

    /// Link code chunks to the chunks defining the functions they call
    ResolveDeps {
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Re-resolve chunks that were already resolved
        #[arg(long)]
        force: bool,
    },

    /// Print the dependency closure of stored chunks
    Expand {
        #[arg(required = true, value_name = "CHUNK_ID")]
        chunk_ids: Vec<String>,
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,
    },

    /// Retrieve context for a query
    Search {
        query: String,
        #[arg(long, value_name = "N")]
        top_k: Option<usize>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        /// Skip dependency expansion of retrieved code
        #[arg(long)]
        no_expand: bool,
    },
}

/// Logs go to stderr; stdout belongs to the MCP transport and command output.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the ONNX embedder, downloading model files first when allowed.
async fn load_embedder(model: &ModelConfig) -> Result<OnnxEmbedder> {
    let dir = PathBuf::from(&model.dir);
    if !all_files_present(&dir) {
        anyhow::ensure!(
            model.auto_download,
            "model files missing in {} and model.auto_download is off",
            dir.display()
        );
        let (target, repo) = (dir.clone(), model.repo.clone());
        tokio::task::spawn_blocking(move || download_model_files(&target, &repo))
            .await
            .context("model download task failed")??;
    }
    OnnxEmbedder::new(Path::new(&model.dir), model.dimensions)
        .context("Failed to load embedding model")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    let db = Db::open(&config.db_path).context("Failed to open database")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("Starting mettarag MCP server...");
            let embedder = load_embedder(&config.model).await?;
            let mcp_ctx = McpContext {
                db: Arc::new(TokioMutex::new(db)),
                config: Arc::new(config),
                embedder: Arc::new(embedder) as Arc<dyn Embedder>,
            };
            McpServer::new(mcp_ctx).start().await?;
        }

        Command::Ingest {
            dir,
            project,
            repo,
            replace,
        } => {
            let embedder = load_embedder(&config.model).await?;
            let db = Arc::new(TokioMutex::new(db));
            let mut indexer = Indexer::new(db, &embedder, config.max_chunk_size);
            let stats = indexer
                .index_repository(&dir, &project, &repo, replace)
                .await
                .with_context(|| format!("failed to index {}", dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::ResolveDeps { batch_size, force } => {
            let batch_size = batch_size.unwrap_or(config.dependencies.batch_size);
            let stats = add_function_dependencies(&db, batch_size, force)?;
            info!(
                "Total processed: {}, updated: {}, dependencies added: {}, failed: {}, average dependencies per updated chunk: {:.2}",
                stats.total_processed,
                stats.total_updated,
                stats.total_dependencies_added,
                stats.total_failed,
                stats.average_dependencies()
            );
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Expand {
            chunk_ids,
            max_depth,
        } => {
            let mut seeds = Vec::with_capacity(chunk_ids.len());
            for id in &chunk_ids {
                match db.get_chunk(id)? {
                    Some(chunk) => seeds.push(Document::from_chunk(chunk)),
                    None => warn!("Chunk {id} not found"),
                }
            }

            let expanded = config.dependencies.expander(max_depth).expand(&db, &seeds)?;
            for doc in &expanded {
                println!(
                    "{}\t{}\t{}",
                    doc.chunk_key(),
                    if doc.metadata.is_dependency { "dependency" } else { "seed" },
                    doc.metadata.file.join("/")
                );
            }
        }

        Command::Search {
            query,
            top_k,
            project,
            repo,
            no_expand,
        } => {
            let embedder = load_embedder(&config.model).await?;
            let retriever = Retriever::new(
                &db,
                &embedder,
                top_k.unwrap_or(config.search_top_k),
            )
            .scoped(project.as_deref(), repo.as_deref());

            let context = if no_expand || !config.dependencies.expand_on_search {
                retriever.retrieve(&query)?
            } else {
                retriever.retrieve_with_dependencies(&query, &config.dependencies.expander(None))?
            };
            println!("{}", assemble_context(&context));
        }
    }

    Ok(())
}
