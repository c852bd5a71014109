//! voxbridge gateway binary.
//!
//! Ingress: carrier media WebSocket per call, plus ops endpoints. Config is
//! strict YAML; vendor secrets come from the environment (.env honoured).

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use voxbridge_gateway::{app_state, config, router};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "voxbridge.yaml".into());
    let mut cfg = config::load_from_file(&path).expect("config load failed");
    cfg.apply_env();

    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .expect("gateway.listen must be a valid SocketAddr");

    let state = app_state::AppState::from_config(cfg).expect("service wiring failed");
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "voxbridge-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state))
    .await
    .expect("server failed");
}

async fn shutdown_signal(state: app_state::AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    state.metrics().set_draining();
    tracing::info!("signal received, starting graceful shutdown");
}
