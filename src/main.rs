mod cli;
mod codegen;
mod config;
mod error;
mod knowledge;
mod ollama_client;
mod server;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::{Result, WrapErr};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::ChatContext;
use crate::codegen::{ConversationOrchestrator, OllamaResponder, RetrievalSettings};
use crate::config::Config;
use crate::knowledge::{KnowledgeBase, OllamaEmbedder};
use crate::ollama_client::OllamaClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Prompt to send instead of starting an interactive session
    #[arg(short, long)]
    input: Option<String>,

    /// Write extracted files below this directory
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Chat model to use (overrides OLLAMA_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Ollama server URL (overrides OLLAMA_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Knowledge base directory (overrides CODEGEN_KNOWLEDGE_DIR)
    #[arg(long, global = true)]
    knowledge_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Prompt to send instead of starting an interactive session
        #[arg(short, long)]
        input: Option<String>,

        /// Write extracted files below this directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Serve the /generate HTTP endpoint
    Serve {
        /// Address to listen on (overrides CODEGEN_BIND)
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Build the knowledge base index from a text file
    Index {
        /// Reference text to split and embed
        source: PathBuf,

        /// Rebuild even if an index already exists
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("Failed to set tracing subscriber")?;

    let config = load_config(&cli)?;
    info!("Using model {} at {}", config.model, config.base_url);

    let client = Arc::new(OllamaClient::new(config.base_url.clone()));
    let embedder = Arc::new(OllamaEmbedder::new(client.clone(), config.embed_model.clone()));

    match cli.command {
        Some(Commands::Index { source, force }) => {
            let index_path = config.index_path();
            knowledge::ensure_index(&source, &index_path, force, embedder.as_ref())
                .await
                .wrap_err_with(|| format!("Failed to index {}", source.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Serve { bind }) => {
            let orchestrator = build_orchestrator(&config, client, embedder)?;
            let state = Arc::new(server::AppState::new(orchestrator, config.session_idle));
            server::serve(state, bind.unwrap_or(config.bind)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Chat { input, out_dir }) => {
            let orchestrator = build_orchestrator(&config, client, embedder)?;
            let mut chat_context = ChatContext::new(
                Box::new(io::stdout()),
                input,
                true,
                Arc::new(orchestrator),
                out_dir,
            );
            chat_context.run().await
        }
        None => {
            // Default to chat if no subcommand is provided
            let orchestrator = build_orchestrator(&config, client, embedder)?;
            let mut chat_context = ChatContext::new(
                Box::new(io::stdout()),
                cli.input,
                true,
                Arc::new(orchestrator),
                cli.out_dir,
            );
            chat_context.run().await
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    if let Some(model) = &cli.model {
        config = config.with_model(model.clone());
    }
    if let Some(dir) = &cli.knowledge_dir {
        config.knowledge_dir = dir.clone();
    }
    Ok(config)
}

fn build_orchestrator(
    config: &Config,
    client: Arc<OllamaClient>,
    embedder: Arc<OllamaEmbedder>,
) -> Result<ConversationOrchestrator> {
    let knowledge_base = KnowledgeBase::open(&config.index_path(), embedder, config.fetch_k)
        .wrap_err("Failed to load knowledge base")?;
    info!("Knowledge base has {} chunks", knowledge_base.len());

    let responder = OllamaResponder::new(client, config.model.clone(), config.temperature);
    let retrieval = RetrievalSettings {
        k: config.retrieval_k,
        diversity: config.diversity,
    };

    Ok(ConversationOrchestrator::new(
        Arc::new(knowledge_base),
        Arc::new(responder),
        retrieval,
    )?)
}
