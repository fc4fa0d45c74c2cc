use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prompthub_http::{create_router, parse_api_keys, AppState};
use prompthub_service::{
    CallLogSink, ProjectService, PromptService, ResolveCache, SceneEngine, SceneService,
    ServiceConfig,
};
use prompthub_storage::Storage;

#[derive(Parser)]
#[command(name = "prompthub")]
#[command(about = "Centralized management plane for LLM prompts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server.
    Serve {
        #[arg(short, long, default_value_t = default_port())]
        port: u16,
        #[arg(short = 'H', long, default_value_t = default_host())]
        host: String,
    },
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Print storage statistics as JSON.
    Stats,
}

fn get_db_path() -> PathBuf {
    std::env::var("PROMPTHUB_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("prompthub.db"))
}

fn default_port() -> u16 {
    match std::env::var("PROMPTHUB_PORT") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(%raw, "invalid PROMPTHUB_PORT, listening on 8080");
            8080
        }),
        Err(_) => 8080,
    }
}

fn default_host() -> String {
    std::env::var("PROMPTHUB_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let db_path = get_db_path();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match cli.command {
        Commands::Serve { port, host } => {
            let storage = Arc::new(Storage::open(&db_path)?);
            let config = ServiceConfig::from_env();
            let cache = Arc::new(ResolveCache::new());
            let sink = CallLogSink::start(
                Arc::clone(&storage),
                config.call_log_capacity,
                config.call_log_max_content,
            );

            let api_keys_raw = std::env::var("PROMPTHUB_API_KEYS").unwrap_or_default();
            let api_keys = parse_api_keys(&api_keys_raw);
            if api_keys.is_empty() {
                tracing::warn!("PROMPTHUB_API_KEYS is empty, every request will be rejected");
            }

            let state = Arc::new(AppState {
                prompts: PromptService::new(
                    Arc::clone(&storage),
                    Arc::clone(&cache),
                    sink.clone(),
                    config,
                ),
                scenes: SceneService::new(Arc::clone(&storage), Arc::clone(&cache), config),
                projects: ProjectService::new(Arc::clone(&storage), config),
                engine: SceneEngine::new(
                    Arc::clone(&storage),
                    Arc::clone(&cache),
                    sink.clone(),
                    Duration::from_secs(config.cache_ttl_secs),
                    Duration::from_secs(config.request_timeout_secs),
                ),
                storage,
                cache,
                sink,
                api_keys,
            });

            let router = create_router(state);
            let addr = format!("{host}:{port}");
            tracing::info!("Starting HTTP server on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, router).await?;
        }
        Commands::Migrate => {
            // Opening the database runs pending migrations.
            let _storage = Storage::open(&db_path)?;
            tracing::info!("Migrations applied to {}", db_path.display());
        }
        Commands::Stats => {
            let storage = Storage::open(&db_path)?;
            let stats = storage.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
