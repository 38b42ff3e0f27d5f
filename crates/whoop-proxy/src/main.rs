//! WHOOP OAuth2 Proxy - Entry Point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use whoop_proxy::config::Config;
use whoop_proxy::server::ProxyServer;
use whoop_proxy::token::{FileTokenStore, MemoryTokenStore, TokenStore};

#[derive(Parser, Debug)]
#[command(name = "whoop-proxy")]
#[command(about = "OAuth2 proxy for the WHOOP developer API")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value = "4000", env = "PORT")]
    port: u16,

    /// Token log file (overrides TOKEN_STORE_PATH from the environment)
    #[arg(long, env = "TOKEN_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Keep tokens in memory only (lost on restart)
    #[arg(long)]
    memory_store: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting WHOOP OAuth proxy");

    let mut config = Config::from_env()?;
    if let Some(path) = cli.store_path {
        config = config.with_store_path(path);
    }

    let store: Arc<dyn TokenStore> = if cli.memory_store {
        tracing::warn!("Using in-memory token store; tokens will not survive a restart");
        Arc::new(MemoryTokenStore::new())
    } else {
        let store = FileTokenStore::open(&config.store_path).await?;
        tracing::info!(path = %store.path().display(), "Using file token store");
        Arc::new(store)
    };

    let server = ProxyServer::new(&config, store)?;
    server.run_http(cli.port).await
}
