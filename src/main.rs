//! OmniPage Server
//!
//! Exposes the OmniPage recognition engine over HTTP: plain-text OCR of
//! every page of an image, and template-guided zone extraction.

use anyhow::Context;
use std::net::SocketAddr;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omnipage_server::config::{Config, EngineConfig};
use omnipage_server::engine::RecognitionEngine;
use omnipage_server::routes;
use omnipage_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "omnipage_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load engine license from env: {}, leaving it empty", e);
        Config::from_env_optional()
    });

    tracing::info!("Starting OmniPage Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Staging directory: {}", config.staging.tmp_dir.display());

    let engines = start_engines(&config.engine).context("Failed to start recognition engine")?;
    tracing::info!(
        handles = engines.len(),
        language = %config.engine.language,
        code_page = %config.engine.code_page,
        "Recognition engine ready"
    );

    let app_state = AppState::new(config.clone(), engines);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::app(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("OmniPage Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.shutdown().await.context("Failed to release engine handles")?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Create, initialize and license one engine session per pool slot
#[cfg(feature = "omnipage")]
fn start_engines(config: &EngineConfig) -> anyhow::Result<Vec<Box<dyn RecognitionEngine>>> {
    use omnipage_server::engine::OmniPage;

    (0..config.pool_size)
        .map(|slot| {
            let engine = OmniPage::start(config)
                .with_context(|| format!("Engine slot {slot} failed to start"))?;
            tracing::debug!(slot, "Engine session started");
            Ok(Box::new(engine) as Box<dyn RecognitionEngine>)
        })
        .collect()
}

#[cfg(not(feature = "omnipage"))]
fn start_engines(_config: &EngineConfig) -> anyhow::Result<Vec<Box<dyn RecognitionEngine>>> {
    anyhow::bail!("built without the `omnipage` feature; rebuild with `--features omnipage` to link the engine")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
