//! Downloads the model artifact ahead of deployment. Reads `MODEL_URL` and
//! `MODEL_PATH` like the server does.

use anyhow::{bail, Result};
use sign_interpreter::{
    download::{ensure_model_present, Outcome},
    Config,
};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sign_interpreter=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let Some(url) = config.model_url.as_deref() else {
        bail!("MODEL_URL environment variable not set");
    };

    let client = reqwest::Client::new();
    match ensure_model_present(&client, url, &config.model_path).await? {
        Outcome::AlreadyPresent => {}
        Outcome::Downloaded { bytes } => {
            tracing::info!(bytes, "model saved to {}", config.model_path.display())
        }
    }

    Ok(())
}
