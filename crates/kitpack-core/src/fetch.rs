//! Timeout-bounded artifact downloads.
//!
//! A fetch streams the response body into an anonymous temporary file next
//! to the destination and only renames it into place once the whole body
//! has been written. Failures, timeouts and dropped futures leave nothing at
//! the destination path.

use std::path::{Path, PathBuf};

use reqwest::header::HeaderMap;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::github::{GitHubClient, rejected, transport};

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Streams remote files to local storage.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: GitHubClient,
}

impl ArtifactFetcher {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    /// Download `url` with the upstream authorization header.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchedFile> {
        let headers = self.client.auth_headers(false)?;
        self.fetch_with_headers(url, headers, dest).await
    }

    /// Download `url` to `dest` with explicit request headers.
    pub async fn fetch_with_headers(
        &self,
        url: &str,
        headers: HeaderMap,
        dest: &Path,
    ) -> Result<FetchedFile> {
        let timeout = self.client.timeout();
        let transfer = stream_to_file(self.client.http(), url, headers, dest);

        match tokio::time::timeout(timeout, transfer).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(url, secs = timeout.as_secs(), "download timed out");
                Err(Error::Timeout {
                    url: url.to_string(),
                    after: timeout,
                })
            }
        }
    }
}

/// One attempt: GET, check status, stream body chunks to `dest`.
pub(crate) async fn stream_to_file(
    http: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    dest: &Path,
) -> Result<FetchedFile> {
    tracing::debug!(url, dest = %dest.display(), "starting download");

    let mut response = http
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|source| transport(url, source))?;

    let status = response.status();
    if !status.is_success() {
        return Err(rejected(url, status));
    }

    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::io(format!("failed to create file in {}", dir.display()), e))?;
    let handle = staging
        .reopen()
        .map_err(|e| Error::io("failed to open download file", e))?;
    let mut file = tokio::fs::File::from_std(handle);

    let mut bytes = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| transport(url, source))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io(format!("failed to write download from {url}"), e))?;
        bytes += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| Error::io(format!("failed to flush download from {url}"), e))?;
    drop(file);

    staging
        .persist(dest)
        .map_err(|e| Error::io(format!("failed to move download to {}", dest.display()), e.error))?;

    tracing::info!(url, bytes, "download complete");
    Ok(FetchedFile {
        path: dest.to_path_buf(),
        bytes,
    })
}
