//! # TravelPanel API Server
//!
//! Serves the access-request workflow, code-gated signup and tenant-scoped
//! agency data.
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=... ADMIN_API_KEY=... DATABASE_URL=postgresql://... \
//!     cargo run -p travelpanel-api
//! ```
//!
//! Set `STORAGE_BACKEND=memory` to run without PostgreSQL and
//! `LOG_FORMAT=json` for structured logs.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use travelpanel_api::{
    app::{build_router, AppState},
    config::{Config, StorageBackend},
};
use travelpanel_shared::{
    db::{
        migrations::{ensure_database_exists, run_migrations},
        pool::{create_pool, DatabaseConfig},
    },
    store::{MemoryStore, PgStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!(
        "TravelPanel API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env().context("Failed to load configuration")?;
    let store = connect_store(&config).await?;

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid API_HOST/API_PORT")?;

    let app = build_router(AppState::new(store, config));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "travelpanel_api=debug,travelpanel_shared=debug,tower_http=debug".into()
    });

    let json = std::env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;

            ensure_database_exists(url)
                .await
                .context("Failed to create database")?;

            let pool = create_pool(DatabaseConfig {
                max_connections: config.storage.max_connections,
                ..DatabaseConfig::from_url(url)
            })
            .await
            .context("Failed to connect to database")?;

            run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;

            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
