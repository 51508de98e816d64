//! Switchboard gateway entrypoint.
//!
//! Startup order:
//! 1. Resolve configuration from the environment.
//! 2. Install the tracing subscriber.
//! 3. Read the agent `Settings` payload from disk.
//! 4. Build the shared state, including the skill registry.
//! 5. Assemble the router.
//! 6. Serve until Ctrl+C.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use switchboard_gateway::{
    config::{Config, load_agent_settings},
    router::create_router,
    state::AppState,
};
use switchboard_skills::SkillRegistry;
use tracing::info;

/// Resolves once `Ctrl+C` arrives, which drains the server gracefully.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Ctrl+C handler could not be installed");
    info!("Shutdown signal received, stopping...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Configuration ---
    let config = Config::from_env().context("could not load configuration")?;

    // --- 2. Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded, building application state...");

    // --- 3. Agent Settings ---
    let agent_settings = load_agent_settings(&config.agent_settings_path)?;

    // --- 4. Shared State ---
    let skills = Arc::new(SkillRegistry::new());
    info!(skills = skills.names().len(), "skill registry ready");

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        skills,
        agent_settings: Arc::new(agent_settings),
    });

    // --- 5. Router ---
    let app = create_router(app_state);

    // --- 6. Serve ---
    info!(
        bind_address = %config.bind_address,
        agent_url = %config.agent_url,
        "Gateway configured, starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gateway stopped.");
    Ok(())
}
