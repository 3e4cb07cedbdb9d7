use std::sync::Arc;

use showmyai::config::AppConfig;
use showmyai::rate_limit::RateLimiter;
use showmyai::relay::ChatRelay;
use showmyai::selector::ProviderSelector;
use showmyai::server::{self, AppState};
use showmyai::session::{SessionStore, spawn_sweeper};
use showmyai::telemetry::init_subscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let _log_guard = init_subscriber(config.telemetry.clone())?;

    let selector = ProviderSelector::from_config(&config).await?;
    let model = selector.model_info();
    tracing::info!(
        provider = %selector.active(),
        model = %model.model,
        initialized = selector.is_initialized(),
        "AI provider selected"
    );

    let sessions = Arc::new(SessionStore::new(config.session.timeout));
    let sweeper = spawn_sweeper(Arc::clone(&sessions), config.session.sweep_interval);

    let relay = ChatRelay::new(sessions, Arc::new(selector));
    let state = AppState::new(relay, RateLimiter::new(config.rate_limit.clone()));

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "Show My AI server listening");

    server::serve(listener, state, shutdown_signal()).await?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
