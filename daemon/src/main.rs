mod config;
mod engine;
mod generator;
mod pipeline;
mod protocol;
mod server;

use anyhow::Result;
use config::DaemonConfig;
use engine::Engine;
use server::CommandServer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = DaemonConfig::load()?;
    info!(
        socket = %config.server.socket_path.display(),
        backend = ?config.model.backend,
        hover_delay_ms = config.highlight.hover_delay_ms,
        selection_delay_ms = config.highlight.selection_delay_ms,
        mutation_delay_ms = config.highlight.mutation_delay_ms,
        cache_capacity = config.highlight.cache_capacity,
        rate_limit_requests = config.highlight.rate_limit_requests,
        whitespace = ?config.highlight.whitespace,
        stale_guard = ?config.highlight.stale_guard,
        highlighting_enabled = config.startup.highlighting_enabled,
        auto_highlight = config.startup.auto_highlight,
        "loaded lexilight config"
    );

    let engine = Engine::new(config.model.clone(), config.highlight.clone());
    let startup = &config.startup;
    match startup.api_key() {
        Some(key) => {
            if !engine.configure(Some(&key), startup.highlighting_enabled, startup.auto_highlight) {
                warn!("starting without a generation client");
            }
        }
        None if startup.highlighting_enabled => engine.start_highlighting(startup.auto_highlight),
        None => info!(env = %startup.api_key_env, "no API key in environment"),
    }

    info!(
        configured = engine.is_configured(),
        highlighting = engine.highlighting_enabled(),
        "engine ready"
    );

    let server = CommandServer::new(config.server.clone(), engine);
    server.run().await
}
