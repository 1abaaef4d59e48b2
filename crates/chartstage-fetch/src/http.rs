//! Generic HTTP(S) downloads

use futures::StreamExt;
use std::path::Path;
use std::time::Duration;

use crate::error::{FetchError, Result};
use crate::staging::StagedFile;

/// HTTP client used for everything that is not object storage
#[derive(Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Create a downloader; `timeout` bounds each request when set
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "chartstage/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| FetchError::Network {
            url: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }

    /// Stream `url` into `dest`.
    ///
    /// Anything but a 2xx status is an error and leaves `dest` untouched.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        tracing::info!(%url, "Getting file from URL");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut staged = StagedFile::create(dest)?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::network(url, e))?;
            staged.write(&chunk).await?;
        }
        let written = staged.commit().await?;
        tracing::info!(dest = %dest.display(), bytes = written, "Downloaded");
        Ok(written)
    }
}
