//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcast_api::{create_router, ApiConfig, AppState};
use vcast_worker::{FilePassageSource, LocalSynthesis, SynthesisRunner};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vcast=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vcast-api");

    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, data_file={}",
        config.host,
        config.port,
        config.data_file.display()
    );

    let runner = Arc::new(SynthesisRunner::new(
        Arc::new(FilePassageSource::from_env()),
        Arc::new(LocalSynthesis::from_env()),
    ));
    let state = AppState::new(config.clone(), runner);

    // Re-admit jobs recovered from the snapshot, then keep the
    // retention sweeper running for the life of the process.
    state.scheduler.fill_capacity().await;
    state.scheduler.spawn_retention_sweeper();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
