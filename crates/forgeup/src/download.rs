//! Verified streaming downloads.
//!
//! Artifacts stream to a uniquely-named temporary file colocated with the
//! cache (same volume, so the later publish rename stays atomic). Each
//! chunk feeds the progress callback; transient failures retry with
//! backoff, resuming via HTTP `Range` from the bytes already on disk when
//! the server cooperates. After the stream completes the file is re-read
//! and its sha-256 compared against the manifest's digest; a mismatch
//! deletes the file and fails, so corrupted bytes never reach extraction.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::manifest::ResolvedArtifact;
use crate::progress::Progress;
use crate::retry::retry_with_backoff;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read buffer size for digest verification.
const DIGEST_BUF_SIZE: usize = 8192;

/// Streams artifacts to disk and verifies them.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl Downloader {
    /// Create a downloader using the given HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Download and verify `artifact`, returning the temp file path.
    ///
    /// The file lands in `dest_dir` under a process-unique name; the caller
    /// owns it afterwards (extraction, then removal). On any failure the
    /// partial file is deleted.
    ///
    /// # Errors
    /// [`Error::Download`] after retries are exhausted,
    /// [`Error::Integrity`] when the digest does not match (the temp file
    /// is deleted first), [`Error::Cancelled`] when the token fires.
    pub async fn download(
        &self,
        artifact: &ResolvedArtifact,
        dest_dir: &Path,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let temp_path = dest_dir.join(format!(
            "dl-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        info!(url = %artifact.url, temp = %temp_path.display(), "Downloading artifact");

        let streamed = retry_with_backoff(&self.retry, cancel, "artifact_download", || {
            self.fetch_to_file(&artifact.url, &temp_path, progress, cancel)
        })
        .await;
        if let Err(err) = streamed {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err);
        }

        let actual = compute_file_digest(&temp_path).await?;
        if !actual.eq_ignore_ascii_case(&artifact.sha256) {
            warn!(
                url = %artifact.url,
                expected = %artifact.sha256,
                actual = %actual,
                "Digest mismatch, deleting download"
            );
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::integrity(
                artifact.sha256.to_ascii_lowercase(),
                actual,
            ));
        }

        debug!(url = %artifact.url, sha256 = %actual, "Artifact verified");
        Ok(temp_path)
    }

    /// One streaming attempt. Leaves any partial file in place so the next
    /// attempt can resume from it.
    async fn fetch_to_file(
        &self,
        url: &str,
        temp_path: &Path,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Resume from whatever a previous attempt already wrote.
        let start_pos = match tokio::fs::metadata(temp_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(url);
        if start_pos > 0 {
            request = request.header(RANGE, format!("bytes={start_pos}-"));
        }

        let send = async {
            request
                .send()
                .await
                .map_err(|e| Error::download_transport(url, &e))
        };
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::download_status(url, status.as_u16()));
        }

        // A 206 means the server honored the range; anything else restarts
        // the file from scratch.
        let resuming = start_pos > 0 && status == StatusCode::PARTIAL_CONTENT;
        if start_pos > 0 {
            debug!(url, start_pos, resuming, "Partial file present");
        }
        let mut downloaded = if resuming { start_pos } else { 0 };
        let total = response.content_length().map(|len| len + downloaded);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(resuming)
            .truncate(!resuming)
            .open(temp_path)
            .await?;

        progress.report(downloaded, total);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let chunk = chunk.map_err(|e| Error::download_transport(url, &e))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress.report(downloaded, total);
        }
        file.flush().await?;
        Ok(())
    }
}

/// Compute the hex sha-256 of a file by re-reading it from disk.
pub(crate) async fn compute_file_digest(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; DIGEST_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
