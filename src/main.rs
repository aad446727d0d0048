use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gemini_rag::{config::Config, console, create_router, types::AppError, AppState, RagContext};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "gemini-rag", version, about = "Retrieval-augmented question answering with Gemini")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Ingest every document in a directory into the collection
    Build {
        /// Defaults to `paths.documents_dir`
        #[arg(long)]
        docs: Option<PathBuf>,
    },
    /// Ask questions against the collection from the terminal
    Chat {
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = gemini_rag::utils::init_logger();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Build { docs } => {
            config.require_api_key()?;
            let rag = RagContext::open(&config).await?;
            let docs = docs.unwrap_or_else(|| config.paths.documents_dir.clone());
            console::run_build(&rag, &docs).await?;
            rag.shutdown().await?;
            Ok(())
        }
        Command::Chat { top_k } => {
            config.require_api_key()?;
            if !config.paths.persist_dir.exists() {
                return Err(AppError::NotFound(format!(
                    "Could not find database at {}. Run the build command first.",
                    config.paths.persist_dir.display()
                ))
                .into());
            }
            let rag = RagContext::open(&config).await?;
            let top_k = top_k.unwrap_or(config.store.top_k);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            console::run_chat_loop(&rag, top_k, stdin, tokio::io::stdout()).await?;
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    if !config.has_api_key() {
        warn!("GOOGLE_API_KEY is not set; embedding and chat requests will fail");
    }

    let rag = Arc::new(RagContext::open(&config).await?);
    let state = AppState {
        config: config.clone(),
        rag: rag.clone(),
    };
    let app = create_router(state);

    let addr = config.server_addr()?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    if let Err(e) = rag.shutdown().await {
        error!(error = %e, "Failed to flush vector collection");
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
