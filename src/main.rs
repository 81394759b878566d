use std::sync::Arc;
use std::time::Duration;

use imagegen_gateway::{
    app_state::AppState,
    config::AppConfig,
    routes, telemetry,
    services::{
        browser::WebDriverSession,
        fetcher::AssetFetcher,
        generation::GenerationService,
        progress::ProgressHub,
        provider::ProviderClient,
        queue::JobQueue,
        status::StatusStore,
        storage::{AssetStore, LocalStore, R2Client},
        throttle::AdmissionThrottle,
        worker::BrowserWorker,
    },
};

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing imagegen-gateway");

    let prometheus_handle =
        telemetry::install_metrics().expect("Failed to install Prometheus metrics recorder");

    let store: Arc<dyn AssetStore> = match config.r2_settings() {
        Some(r2) => {
            tracing::info!(bucket = r2.bucket, "Storing images in R2");
            Arc::new(
                R2Client::new(r2.bucket, r2.endpoint, r2.access_key, r2.secret_key)
                    .expect("Failed to initialize R2 client"),
            )
        }
        None => {
            tracing::info!(dir = %config.storage_dir, "Storing images on local disk");
            Arc::new(LocalStore::new(&config.storage_dir))
        }
    };

    let fetcher = Arc::new(
        AssetFetcher::new(store, Duration::from_secs(60)).expect("Failed to build HTTP client"),
    );

    let provider = config.provider_settings().map(|settings| {
        tracing::info!(endpoint = %settings.endpoint, "Provider fast path enabled");
        Arc::new(ProviderClient::new(settings).expect("Failed to build provider client"))
    });

    let status = Arc::new(StatusStore::new());
    let queue = Arc::new(JobQueue::new(config.max_queue_size));
    let progress = ProgressHub::default();

    let generation = Arc::new(GenerationService::new(
        status.clone(),
        queue.clone(),
        AdmissionThrottle::new(config.throttle_interval()),
        provider,
        fetcher.clone(),
        progress,
    ));

    let driver = WebDriverSession::new(&config.webdriver_url, config.browser_headless)
        .expect("Failed to build WebDriver client");
    let worker = BrowserWorker::new(
        Box::new(driver),
        queue,
        status,
        fetcher,
        config.browser_settings(),
    )
    .expect("Invalid browser selectors");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let state = AppState::new(generation, config.api_key.clone()).with_metrics(prometheus_handle);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("HTTP server stopped, waiting for browser worker");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Browser worker task failed");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
