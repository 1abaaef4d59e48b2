//! chartstage Kube - release lifecycle against a Kubernetes cluster
//!
//! This crate provides:
//! - **Chart Engine**: install, upgrade, uninstall and status through the `helm` executable
//! - **Cluster Access**: kubeconfig resolution from inline documents, URLs, paths or cluster ids
//! - **Stage Controller**: the resumable, poll-driven state machine behind every operation
//! - **Invocation Types**: the request and progress event exchanged with the invoker
//! - **Mocks**: in-memory engine and cluster provider for tests

pub mod cluster;
pub mod controller;
pub mod engine;
pub mod error;
pub mod handler;
pub mod mock;

pub use cluster::{ClusterHandle, ClusterProvider, KubeconfigClusterProvider};
pub use controller::StageController;
pub use engine::{ChartEngine, HelmCliEngine, ReleaseSpec, ReleaseStatus};
pub use error::{KubeError, Result};
pub use handler::{Action, InvocationRequest, OperationStatus, ProgressEvent, ResourceModel};
pub use mock::{EngineCounts, MockChartEngine, MockClusterProvider};
