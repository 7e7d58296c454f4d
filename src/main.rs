use std::sync::Arc;

use tracing::{error, info};

use recman::config::StorageBackend;
use recman::record::RecordStore;
use recman::web::WebServer;
use recman::{
    open_blob_store, Config, Database, ElapsedFormatter, MemoryRecordStore, RecordService,
    SqliteRecordStore, SystemClock,
};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = recman::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        recman::logging::init_console_only(&config.logging.level);
    }

    info!("recman - Record Management Service");

    if let Err(e) = run(config).await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> recman::Result<()> {
    config.validate()?;

    let blobs = open_blob_store(&config.storage).await?;

    let records: Arc<dyn RecordStore> = match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory record store");
            Arc::new(MemoryRecordStore::new())
        }
        _ => {
            let db = Database::open(&config.database.path).await?;
            Arc::new(SqliteRecordStore::new(db.pool().clone()))
        }
    };

    let formatter = ElapsedFormatter::from_name(&config.server.timezone);
    let mut service = RecordService::new(blobs, records, Arc::new(SystemClock), formatter);
    if !config.storage.temp_dir.is_empty() {
        std::fs::create_dir_all(&config.storage.temp_dir)?;
        service = service.with_temp_dir(&config.storage.temp_dir);
    }

    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );
    WebServer::new(&config, Arc::new(service))?.run().await
}
