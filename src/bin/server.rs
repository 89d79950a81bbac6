//! EntityKV Server Binary
//!
//! Serves an in-memory keyspace over TCP.

use clap::Parser;
use entitykv::network::Server;
use entitykv::{Config, MemoryBackend};
use tracing_subscriber::{fmt, EnvFilter};

/// EntityKV Server
#[derive(Parser, Debug)]
#[command(name = "entitykv-server")]
#[command(about = "Key-value server backing EntityKV typed stores")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: String,

    /// Snapshot file for SAVE/BGSAVE, restored on startup
    #[arg(short, long)]
    snapshot: Option<String>,

    /// Maximum queued connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Worker threads serving connections
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Idle read timeout per connection, in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,entitykv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("EntityKV Server v{}", entitykv::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let mut builder = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .worker_threads(args.workers)
        .read_timeout_ms(args.read_timeout_ms);
    if let Some(path) = &args.snapshot {
        tracing::info!("Snapshot file: {}", path);
        builder = builder.snapshot_path(path);
    }
    let config = builder.build();

    let backend = match MemoryBackend::from_config(&config) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("Failed to open backend: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Backend ready with {} keys", backend.len());

    let mut server = Server::new(config, backend);
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
