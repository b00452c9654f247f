use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to write model file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadyPresent,
    Downloaded { bytes: u64 },
}

/// Streams `url` into `path`. The body lands in a sibling `.part` file first and
/// is renamed into place once complete.
pub async fn download_file(client: &reqwest::Client, url: &str, path: &Path) -> Result<u64, DownloadError> {
    info!("downloading {} from {}", path.display(), url);

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let mut response = client.get(url).headers(headers).send().await?;
    if !response.status().is_success() {
        return Err(DownloadError::Status(response.status()));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = path.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await?;

    let mut written = 0u64;
    let copied = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;
        Ok::<(), DownloadError>(())
    }
    .await;

    if let Err(err) = copied {
        drop(file);
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }

    drop(file);
    tokio::fs::rename(&partial, path).await?;
    info!(bytes = written, "downloaded {}", path.display());
    Ok(written)
}

/// Fetches the model only when nothing is at `path` yet.
pub async fn ensure_model_present(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<Outcome, DownloadError> {
    if tokio::fs::try_exists(path).await? {
        info!("model {} already exists, skipping download", path.display());
        return Ok(Outcome::AlreadyPresent);
    }
    let bytes = download_file(client, url, path).await?;
    Ok(Outcome::Downloaded { bytes })
}
