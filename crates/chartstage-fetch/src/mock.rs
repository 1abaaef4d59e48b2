//! In-memory object store for testing
//!
//! Lets the fetch pipeline and the stage controller run without network
//! access. Every call is counted so tests can assert on what was touched.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{FetchError, Result};
use crate::object_store::ObjectStore;
use crate::staging::StagedFile;

/// Operation counts for a [`MockObjectStore`]
#[derive(Debug, Default, Clone)]
pub struct ObjectStoreCounts {
    pub region_lookups: usize,
    pub downloads: usize,
}

#[derive(Default)]
struct MockState {
    /// bucket -> region
    regions: HashMap<String, String>,
    /// (bucket, key) -> bytes
    objects: HashMap<(String, String), Vec<u8>>,
    counts: ObjectStoreCounts,
}

/// Buckets and objects held in memory
#[derive(Clone, Default)]
pub struct MockObjectStore {
    state: Arc<RwLock<MockState>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket in `region`
    pub fn with_bucket(self, bucket: &str, region: &str) -> Self {
        self.state
            .write()
            .unwrap()
            .regions
            .insert(bucket.to_string(), region.to_string());
        self
    }

    /// Store an object; the bucket must be registered for downloads to find it
    pub fn with_object(self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) -> Self {
        self.state
            .write()
            .unwrap()
            .objects
            .insert((bucket.to_string(), key.to_string()), data.into());
        self
    }

    pub fn counts(&self) -> ObjectStoreCounts {
        self.state.read().unwrap().counts.clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let mut state = self.state.write().unwrap();
        state.counts.region_lookups += 1;
        state
            .regions
            .get(bucket)
            .cloned()
            .ok_or_else(|| FetchError::ObjectStorage {
                operation: "GetBucketRegion".into(),
                code: "NoSuchBucket".into(),
                message: format!("The specified bucket does not exist: {bucket}"),
            })
    }

    async fn download(&self, region: &str, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let data = {
            let mut state = self.state.write().unwrap();
            state.counts.downloads += 1;
            if state.regions.get(bucket).map(String::as_str) != Some(region) {
                return Err(FetchError::ObjectStorage {
                    operation: "GetObject".into(),
                    code: "PermanentRedirect".into(),
                    message: format!("bucket {bucket} is not in {region}"),
                });
            }
            state
                .objects
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| FetchError::ObjectStorage {
                    operation: "GetObject".into(),
                    code: "NoSuchKey".into(),
                    message: "The specified key does not exist.".into(),
                })?
        };

        let mut staged = StagedFile::create(dest)?;
        staged.write(&data).await?;
        staged.commit().await
    }
}
