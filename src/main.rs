use std::sync::Arc;
use actix_web::{middleware::Logger, web, App, HttpServer};

use schoolhub::config::{AppConfig, Backend};
use schoolhub::db_migrate::MigrationTool;
use schoolhub::server;
use schoolhub::sweeper::run_expiry_sweeper;
use schoolhub::{MemoryStore, NotificationManager, NotificationStore, ScyllaConnector};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();
    tracing::info!("Starting schoolhub");

    let config = AppConfig::from_env()?;

    let store: Arc<dyn NotificationStore> = match config.backend {
        Backend::Scylla => {
            let session = Arc::new(ScyllaConnector::connect(&config.scylla).await?);
            MigrationTool::new(config.scylla.keyspace.clone(), config.scylla.schema_dir.clone())
                .migrate_to_version(&session, config.scylla.schema_version)
                .await?;
            Arc::new(ScyllaConnector::with_session(session, &config.scylla.keyspace).await?)
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory notification store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let manager = Arc::new(NotificationManager::new(store, config.storage_timeout));

    tokio::spawn(run_expiry_sweeper(manager.clone(), config.sweep_interval));

    let manager_data = web::Data::new(manager);

    tracing::info!("Starting HTTP server on {}", config.bind_addr);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(manager_data.clone())
            .wrap(Logger::default())
            .configure(server::configure)
    })
    .bind(&config.bind_addr)?
    .run();

    server.await?;

    Ok(())
}
