use anyhow::Context;

use boxoffice_infra::AppConfig;
use boxoffice_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Real environment variables win over `.env`.
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    boxoffice_observability::init(if config.environment.is_dev() {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    });

    if config.uses_default_jwt_secret() {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let app = boxoffice_api::app::build_app(&config)
        .await
        .context("failed to initialise services")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
