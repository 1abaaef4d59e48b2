//! Object storage access
//!
//! Object storage is reached through the [`ObjectStore`] trait: one call to
//! find the region a bucket lives in, one to download an object from that
//! region. [`S3Store`] speaks the S3 REST API directly and works against
//! public buckets, buckets readable from the calling network, and
//! S3-compatible stores behind a custom endpoint.
//!
//! Requests are not signed. A private bucket answers `403 AccessDenied`,
//! reported as an object storage error carrying that code.

use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{FetchError, Result};
use crate::staging::StagedFile;

/// Scheme that routes a source URL to object storage
pub const OBJECT_STORAGE_SCHEME: &str = "s3";

const REGION_HEADER: &str = "x-amz-bucket-region";

static ERROR_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Code>([^<]*)</Code>").expect("static regex"));
static ERROR_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Message>([^<]*)</Message>").expect("static regex"));

/// Region lookup and scoped download.
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Region the bucket lives in
    async fn bucket_region(&self, bucket: &str) -> Result<String>;

    /// Download `bucket/key` from `region` into `dest`, returning the size
    async fn download(&self, region: &str, bucket: &str, key: &str, dest: &Path) -> Result<u64>;
}

/// Bucket and key of an object storage URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    /// `s3://bucket/some/key` → (`bucket`, `some/key`). `None` for other schemes.
    pub fn from_url(url: &Url) -> Option<Self> {
        if !url.scheme().eq_ignore_ascii_case(OBJECT_STORAGE_SCHEME) {
            return None;
        }
        let bucket = url.host_str()?.to_string();
        let key = url.path().trim_start_matches('/').to_string();
        Some(Self { bucket, key })
    }
}

/// S3 REST client. Sends anonymous (unsigned) requests only.
pub struct S3Store {
    client: reqwest::Client,
    endpoint: Option<Url>,
}

impl S3Store {
    /// `endpoint` replaces the AWS endpoints with a path-style base URL
    pub fn new(endpoint: Option<&str>, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = endpoint
            .map(|e| {
                Url::parse(e).map_err(|err| FetchError::InvalidUrl {
                    url: e.to_string(),
                    reason: err.to_string(),
                })
            })
            .transpose()?;

        // Region lookup relies on reading the redirect response itself
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| FetchError::Network {
            url: String::new(),
            message: e.to_string(),
        })?;

        Ok(Self { client, endpoint })
    }

    fn base_url(&self, region: Option<&str>) -> Result<Url> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let host = match region {
            Some(region) => format!("https://s3.{region}.amazonaws.com"),
            None => "https://s3.amazonaws.com".to_string(),
        };
        Ok(Url::parse(&host)?)
    }

    fn object_url(&self, region: Option<&str>, bucket: &str, key: &str) -> Result<Url> {
        let mut url = self.base_url(region)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| FetchError::InvalidUrl {
                url: bucket.to_string(),
                reason: "endpoint cannot be a base URL".to_string(),
            })?;
            segments.pop_if_empty().push(bucket);
            if !key.is_empty() {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let url = self.object_url(None, bucket, "")?;
        tracing::debug!(%bucket, %url, "looking up bucket region");
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::network(url.as_str(), e))?;

        if let Some(region) = response
            .headers()
            .get(REGION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            return Ok(region.to_string());
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::ObjectStorage {
                operation: "GetBucketRegion".to_string(),
                code: "NoSuchBucket".to_string(),
                message: format!("The specified bucket does not exist: {bucket}"),
            });
        }
        Err(FetchError::RegionNotFound {
            bucket: bucket.to_string(),
        })
    }

    async fn download(&self, region: &str, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let url = self.object_url(Some(region), bucket, key)?;
        tracing::info!(%bucket, %key, %region, "downloading object");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(service_error("GetObject", status.as_u16(), &body));
        }

        let mut staged = StagedFile::create(dest)?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::network(url.as_str(), e))?;
            staged.write(&chunk).await?;
        }
        staged.commit().await
    }
}

/// Build an error from an S3 XML error body, falling back to the status
fn service_error(operation: &str, status: u16, body: &str) -> FetchError {
    let capture = |re: &Regex| {
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    FetchError::ObjectStorage {
        operation: operation.to_string(),
        code: capture(&ERROR_CODE).unwrap_or_else(|| format!("Http{status}")),
        message: capture(&ERROR_MESSAGE).unwrap_or_else(|| format!("request failed with status {status}")),
    }
}
