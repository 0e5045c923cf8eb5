use std::{
    env, io,
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use futures_util::StreamExt;
use rand::Rng;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use url::Url;

use super::paths::partial_path;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
    #[error("download size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Request(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().is_some_and(|status| {
                        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
                    })
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Upper bound on simultaneous downloads.
    pub concurrency: usize,
    pub attempts: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: read_limit("WELEARN_WORKERS", default_concurrency()),
            attempts: 3,
            retry_base: Duration::from_millis(250),
            retry_max: Duration::from_secs(4),
        }
    }
}

impl TransferConfig {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    /// Exponential delay before retry number `attempt` (0-based), with full jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.retry_base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.retry_max.as_millis().min(u128::from(u64::MAX)) as u64;
        let ceiling = base_ms.saturating_mul(1u64 << attempt.min(16)).min(max_ms);
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}

#[derive(Clone)]
pub struct TransferClient {
    http: Client,
    download_limit: Arc<Semaphore>,
    config: TransferConfig,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    pub fn with_config(config: TransferConfig) -> Self {
        Self {
            http: Client::new(),
            download_limit: Arc::new(Semaphore::new(config.concurrency.max(1))),
            config,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Streams `url` into `target`. Every attempt writes its own `.partial`
    /// sibling, which replaces `target` only once complete; on failure nothing
    /// is left behind.
    /// Returns the number of bytes written.
    pub async fn download_to_path(
        &self,
        url: &Url,
        target: &Path,
        expected_size: Option<u64>,
    ) -> Result<u64, TransferError> {
        let _permit = self
            .download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;

        let attempts = self.config.attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.download_once(url, target, expected_size).await {
                Ok(written) => return Ok(written),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.config.retry_delay(attempt);
                    tracing::warn!(
                        target = %target.display(),
                        attempt = attempt + 1,
                        "download failed, retrying in {delay:?}: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn download_once(
        &self,
        url: &Url,
        target: &Path,
        expected_size: Option<u64>,
    ) -> Result<u64, TransferError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target, rand::random());
        let result = write_stream(response, &partial, expected_size).await;
        match result {
            Ok(written) => {
                if let Err(err) = tokio::fs::rename(&partial, target).await {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(err.into());
                }
                Ok(written)
            }
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(err)
            }
        }
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_stream(
    response: reqwest::Response,
    partial: &Path,
    expected_size: Option<u64>,
) -> Result<u64, TransferError> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(partial)
        .await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;

    if let Some(expected) = expected_size.filter(|expected| *expected != written) {
        return Err(TransferError::SizeMismatch {
            expected,
            actual: written,
        });
    }
    Ok(written)
}

fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn read_limit(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
