//! Source fetching for chartstage
//!
//! Everything a lifecycle poll downloads goes through [`SourceFetcher`]:
//!
//! - **Object storage** (`s3://bucket/key`): the bucket region is looked up
//!   first, then the object is downloaded from that region
//! - **HTTP(S)**: a plain GET that must answer 2xx
//!
//! Downloads are staged next to their destination and renamed into place,
//! so a failed transfer never leaves a partial file behind.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartstage_core::ProviderSettings;
//! use chartstage_fetch::SourceFetcher;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = SourceFetcher::from_settings(&ProviderSettings::default())?;
//! fetcher
//!     .fetch("s3://team-charts/values/prod.yaml", Path::new("/tmp/values.yaml"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fetcher;
pub mod http;
pub mod mock;
pub mod object_store;
pub mod overrides;
pub mod staging;

// Re-exports for convenience
pub use error::{FetchError, Result};
pub use fetcher::SourceFetcher;
pub use http::HttpDownloader;
pub use mock::{MockObjectStore, ObjectStoreCounts};
pub use object_store::{OBJECT_STORAGE_SCHEME, ObjectLocation, ObjectStore, S3Store};
pub use overrides::build_override_values;
pub use staging::StagedFile;
