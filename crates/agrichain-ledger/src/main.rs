//! AgriChain Ledger Server Binary
//!
//! Runs the ledger's HTTP query API.

use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use agrichain_core::Actor;
use agrichain_ledger::{
    create_router, storage::key_file, AppState, EventLog, FileLog, Ledger, LedgerConfig, MemoryLog,
    MemoryRegistry, ServerConfig,
};

#[tokio::main]
async fn main() {
    let server = ServerConfig::from_env().expect("Invalid server configuration");

    // Initialize logging
    let log_level = server.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = LedgerConfig::from_env().expect("Invalid ledger configuration");

    // Initialize receipt key
    let kid = config.receipt_kid.as_deref();
    let receipt_key = match server.receipt_key_file() {
        Some(path) => key_file::load_or_create(&path, kid)
            .await
            .expect("Failed to load receipt key"),
        None => key_file::ephemeral(kid),
    };
    let receipt_kid = receipt_key.kid().to_string();

    // Initialize registry
    let registry = match &server.registry_file {
        Some(path) => {
            let raw = std::fs::read(path).expect("Failed to read registry file");
            let actors: Vec<Actor> =
                serde_json::from_slice(&raw).expect("Registry file must be a JSON list of actors");
            MemoryRegistry::from_actors(actors)
        }
        None => MemoryRegistry::new(),
    };

    // Initialize storage
    let log: Arc<dyn EventLog> = match &server.data_dir {
        Some(dir) => Arc::new(
            FileLog::open(dir)
                .await
                .expect("Failed to open data directory")
                .with_signer(receipt_key),
        ),
        None => Arc::new(MemoryLog::new().with_signer(receipt_key)),
    };

    info!(
        receipt_kid = %receipt_kid,
        actors = registry.len(),
        data_dir = ?server.data_dir,
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        port = server.port,
        "Starting AgriChain ledger"
    );

    let ledger = Arc::new(Ledger::new(config, Arc::new(registry), log));
    let app = create_router(Arc::new(AppState::new(ledger)));

    // Start server
    let addr = format!("0.0.0.0:{}", server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "AgriChain ledger listening");

    axum::serve(listener, app).await.expect("Server error");
}
