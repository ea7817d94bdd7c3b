//! sessiond entry point.

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use sessiond::AppState;
use sessiond::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::new(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        tracking = ?config.tracking,
        session_timeout = config.session_timeout,
        max_sessions = config.max_sessions,
        "sessiond starting",
    );

    let app = sessiond::router(state.clone());

    let addr = SocketAddr::new(config.host.parse().expect("invalid host"), config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    // Spawn session + rate-limiter cleanup task
    let sweep_state = state.clone();
    let purge_interval = config.purge_interval.max(1);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(purge_interval)).await;
            let removed = sweep_state.registry().purge_expired();
            if removed > 0 {
                tracing::info!(removed, "purged expired sessions");
            }
            sweep_state.rate_limiter().cleanup();
        }
    });

    tracing::info!(%addr, "sessiond ready");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("sessiond shut down");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install signal handler");
    tracing::info!("Shutdown signal received");
}
