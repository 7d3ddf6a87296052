//! Pulling file content from the peer.
//!
//! A plain `GET /<relative-path>` against the peer's static-file side, with
//! the body streamed chunk by chunk to disk so large files never sit in
//! memory. No retries at this layer.

use crate::local_apply::LocalFs;
use async_trait::async_trait;
use futures::StreamExt;
use mirror_core::{PathError, normalize_path};
use reqwest::header::HeaderMap;
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("invalid peer URL: {0}")]
    Url(String),

    #[error("peer responded {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A completed transfer.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Local file written
    pub saved_to: PathBuf,
    /// Wall-clock duration of the transfer
    pub elapsed: Duration,
    /// Bytes written
    pub bytes: u64,
}

/// Source of file content for the dispatcher.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `relative_path` from the peer and write it under the sync root.
    async fn fetch(&self, relative_path: &str) -> Result<Fetched, FetchError>;
}

/// HTTP implementation backed by the peer's listener.
pub struct FetchEngine {
    client: Client,
    peer_url: Url,
    headers: HeaderMap,
    local: LocalFs,
}

impl FetchEngine {
    pub fn new(
        client: Client,
        peer_url: &str,
        headers: HeaderMap,
        local: LocalFs,
    ) -> Result<Self, FetchError> {
        let peer_url = Url::parse(peer_url).map_err(|e| FetchError::Url(e.to_string()))?;
        Ok(Self {
            client,
            peer_url,
            headers,
            local,
        })
    }

    /// URL of a relative path on the peer, each segment percent-encoded.
    pub fn file_url(&self, relative_path: &str) -> Result<Url, FetchError> {
        let relative = normalize_path(relative_path)?;
        let mut url = self.peer_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Url(self.peer_url.to_string()))?
            .pop_if_empty()
            .extend(relative.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl ContentFetcher for FetchEngine {
    async fn fetch(&self, relative_path: &str) -> Result<Fetched, FetchError> {
        let start = Instant::now();
        let dest = self.local.full_path(relative_path)?;
        let url = self.file_url(relative_path)?;

        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url.clone())
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let fallback = status.canonical_reason().unwrap_or("request failed");
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: stated_reason(&body, fallback),
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut stream = response.bytes_stream();
        let mut file = File::create(&dest).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;

        let elapsed = start.elapsed();
        info!("Fetched {} ({} bytes) in {:?}", url, written, elapsed);
        Ok(Fetched {
            saved_to: dest,
            elapsed,
            bytes: written,
        })
    }
}

/// Longest reason taken from an error body.
const MAX_REASON_CHARS: usize = 200;

/// The peer's own explanation: first line of the error body, else `fallback`.
fn stated_reason(body: &str, fallback: &str) -> String {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty());
    match line {
        Some(line) => line.chars().take(MAX_REASON_CHARS).collect(),
        None => fallback.to_string(),
    }
}
