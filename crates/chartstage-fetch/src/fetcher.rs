//! Source fetcher
//!
//! Routes a source URL to object storage or to plain HTTP based on its
//! scheme, and reports failures in the core error taxonomy.

use chartstage_core::{CoreError, ProviderSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{FetchError, Result};
use crate::http::HttpDownloader;
use crate::object_store::{ObjectLocation, ObjectStore, S3Store};

/// Downloads charts, values documents and kubeconfigs
#[derive(Clone)]
pub struct SourceFetcher {
    http: HttpDownloader,
    store: Arc<dyn ObjectStore>,
}

impl SourceFetcher {
    pub fn new(http: HttpDownloader, store: Arc<dyn ObjectStore>) -> Self {
        Self { http, store }
    }

    /// Build the HTTP client and the S3 store from provider settings
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let timeout = settings.fetch_timeout_seconds.map(Duration::from_secs);
        let http = HttpDownloader::new(timeout)?;
        let store = S3Store::new(settings.object_storage_endpoint.as_deref(), timeout)?;
        Ok(Self::new(http, Arc::new(store)))
    }

    /// Download `source` into `dest`, returning the bytes written.
    ///
    /// `dest` is either fully written or left as it was.
    pub async fn fetch(&self, source: &str, dest: &Path) -> chartstage_core::Result<u64> {
        let url = Url::parse(source).map_err(|e| {
            CoreError::validation(format!("Downloading file: invalid URL '{source}': {e}"))
        })?;

        match ObjectLocation::from_url(&url) {
            Some(location) => self.fetch_object(&location, dest).await,
            None => self
                .http
                .download(source, dest)
                .await
                .map_err(|e| e.into_core("Downloading file")),
        }
    }

    async fn fetch_object(
        &self,
        location: &ObjectLocation,
        dest: &Path,
    ) -> chartstage_core::Result<u64> {
        if location.key.is_empty() {
            return Err(FetchError::InvalidUrl {
                url: format!("s3://{}", location.bucket),
                reason: "no object key".to_string(),
            }
            .into_core("Downloading file"));
        }

        let region = self
            .store
            .bucket_region(&location.bucket)
            .await
            .map_err(|e| e.into_core("Getting bucket location"))?;
        tracing::info!(bucket = %location.bucket, %region, "Getting file from object storage");

        let written = self
            .store
            .download(&region, &location.bucket, &location.key, dest)
            .await
            .map_err(|e| e.into_core("Downloading file"))?;
        tracing::info!(dest = %dest.display(), bytes = written, "Downloaded");
        Ok(written)
    }
}
