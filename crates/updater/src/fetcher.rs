use crate::cancel::CancelToken;
use crate::error::{Result, UpdateError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Callback invoked with cumulative bytes received for the current file and
/// the remote size when the server supplied a content length.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Abstraction over transferring one remote file to a local path. The
/// pipeline owns sequencing; an implementation only ever sees one file at a
/// time.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Transfer `url` into `dest`, reporting progress as bytes arrive.
    /// Returns the number of bytes written. Must observe `cancel`
    /// mid-transfer and return [`UpdateError::Cancelled`] on abort.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelToken,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64>;
}

/// HTTP(S) fetcher streaming response bodies to disk.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher around an existing reqwest client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelToken,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes_total = response.content_length();
        let mut stream = response.bytes_stream();

        let mut file = File::create(dest).await?;
        let mut bytes_received = 0u64;
        on_progress(0, bytes_total);

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(%url, bytes_received, "transfer aborted");
                    return Err(UpdateError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    bytes_received += chunk.len() as u64;
                    on_progress(bytes_received, bytes_total);
                }
                None => break,
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(bytes_received)
    }
}
