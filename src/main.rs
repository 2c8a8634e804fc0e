use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use credentialing_service::config::Config;
use credentialing_service::pipeline::{DocumentImager, PdfiumRenderer, worker};
use credentialing_service::telemetry::init_telemetry;
use credentialing_service::{AppState, build_router, db, llm};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        "Starting credentialing-service"
    );

    let state = build_state(&config).await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let worker_handle = if config.pipeline_worker_enabled {
        Some(tokio::spawn(worker::run_worker(
            state.clone(),
            shutdown_tx.subscribe(),
        )))
    } else {
        tracing::info!("Pipeline worker disabled");
        None
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    if let Some(handle) = worker_handle
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "Pipeline worker panicked");
    }

    tracing::info!("Server shutdown complete");
    telemetry_guard.shutdown();

    Ok(())
}

/// Opens and migrates the database and wires the model client and page
/// renderer the server and worker share.
async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    if !config.has_llm_credentials() {
        tracing::warn!(
            provider = %config.llm_provider,
            "no API key for the primary model provider, document verification will fail"
        );
    }

    let renderer = PdfiumRenderer::new(config.pdfium_library_path.clone(), config.render_dpi);
    Ok(AppState {
        pool,
        config: config.clone(),
        llm_client: Arc::new(llm::client_from_config(config)),
        imager: DocumentImager::new(Arc::new(renderer)),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
