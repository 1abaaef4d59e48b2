//! chartstage Core - types shared by every chartstage crate
//!
//! - `Identifier`: the opaque physical identifier handed to the invoker
//! - `ChartResolver`: turns a chart reference into a `ChartDescriptor`
//! - `Values`: inline assignments and the override merge
//! - `CallbackContext`/`Stage`: the resumable state carried between polls
//! - `CoreError`/`classify`: the error taxonomy reported to the invoker

pub mod chart;
pub mod classify;
pub mod config;
pub mod error;
pub mod identifier;
pub mod stage;
pub mod values;

pub use chart::{ChartDescriptor, ChartResolver, ChartType, DEFAULT_REPOSITORY_ALIAS, STABLE_REPOSITORY_URL};
pub use classify::{ExternalError, ServiceFault, classify};
pub use config::{DEFAULT_NAMESPACE, DEFAULT_TIMEOUT_MINUTES, ProviderSettings};
pub use error::{CoreError, HandlerErrorCode, Result};
pub use identifier::{ClusterTarget, Identifier, encode_id};
pub use stage::{CallbackContext, Stage, StartTime, TimeoutPolicy};
pub use values::{Values, merge_maps, parse_assignments};
