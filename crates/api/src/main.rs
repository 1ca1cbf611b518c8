use anyhow::Context;

use contentgate_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    contentgate_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(bind = %config.bind, database = config.database_url.is_some(), "configuration loaded");

    let app = contentgate_api::app::build_app(&config)
        .await
        .context("failed to build application")?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
