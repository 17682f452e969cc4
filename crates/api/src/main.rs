use anyhow::Context;
use chrono::Utc;

use rolegate_api::app::{AppState, build_app};
use rolegate_api::config::ConfigLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::from_env().load()?;
    rolegate_observability::init(config.log.format);

    let state = AppState::from_config(&config, Utc::now())?;

    let keys = state.tokens().keys();
    let retired: Vec<&str> = keys.retired_key_ids().into_iter().map(|k| k.as_str()).collect();
    tracing::info!(
        issuer = %config.tokens.issuer,
        access_ttl_secs = config.tokens.access_ttl_secs,
        refresh_ttl_secs = config.tokens.refresh_ttl_secs,
        key_id = %keys.current_key_id(),
        retired_key_ids = ?retired,
        hierarchy_edges = config.roles.hierarchy().edge_count(),
        seed_file = ?config.directory.seed_file,
        "rolegate starting"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
