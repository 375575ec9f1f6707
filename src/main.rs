// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use academic_hub::{
    api::router,
    config::{ServerConfig, LOG_FORMAT_ENV},
    state::AppState,
    store::InMemoryStore,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let addr = config.bind_address();
    let seed_admin = config.seed_admin.clone();

    // Initialize application state
    let state = AppState::new(InMemoryStore::new(), config);

    if let Some((email, password)) = seed_admin {
        match state.seed_admin(&email, &password).await {
            Ok(admin) => tracing::info!(user_id = admin.id, "Seeded admin account"),
            Err(e) => tracing::warn!(error = %e.message, "Failed to seed admin account"),
        }
    }

    let app = router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!(%addr, "Academic Hub API listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .expect("HTTP server failed");

    tracing::info!("Server stopped");
}
