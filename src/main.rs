use std::net::SocketAddr;

use anyhow::{Context, Result};
use sign_interpreter::{default_loader, download, router, AppState, Config};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sign_interpreter=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.uses_default_api_key() {
        tracing::warn!("UPLOAD_API_KEY is not set, model uploads accept the placeholder key");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating {}", config.upload_dir.display()))?;
    if let Some(dir) = config.model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    if let Some(url) = &config.model_url {
        let client = reqwest::Client::new();
        if let Err(err) = download::ensure_model_present(&client, url, &config.model_path).await {
            tracing::warn!(error = %err, "could not fetch model, continuing without it");
        }
    }

    let state = AppState::new(config.clone(), default_loader(&config));
    if state.gate().reload().await {
        tracing::info!("serving model-backed interpretations");
    } else {
        tracing::info!("no usable model, serving simulated interpretations");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://0.0.0.0:{}", config.port);
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await?;

    Ok(())
}
