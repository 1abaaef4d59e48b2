//! Error types for chartstage-kube

use chartstage_core::{CoreError, ExternalError, classify};
use thiserror::Error;

/// Result type for chartstage-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised by the chart engine and the cluster credential provider
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// The engine executable could not be started
    #[error("cannot run '{binary}': {source}")]
    EngineUnavailable {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and reported a failure
    #[error("{command} failed (exit code {code:?}): {stderr}")]
    EngineFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Engine output did not have the expected shape
    #[error("unexpected output from {command}: {message}")]
    EngineOutput { command: String, message: String },

    /// Kubeconfig could not be read or parsed
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    /// Cluster identifier does not name a context in the kubeconfig
    #[error("cluster '{cluster}' not found in kubeconfig")]
    ClusterNotFound { cluster: String },

    /// Kubernetes client configuration error
    #[error("Kubernetes client configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failure already expressed in the reportable taxonomy
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl KubeError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        KubeError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Check if the engine reported a missing release.
    ///
    /// Only helm's release-specific messages count; other failures that
    /// happen to say "not found" (a missing credential plugin, an unknown
    /// namespace) are real errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KubeError::EngineFailed { stderr, .. }
                if stderr.contains("release: not found") || stderr.contains("Release not loaded")
        )
    }

    /// Convert into the reportable taxonomy, tagging with `operation`
    pub fn into_core(self, operation: &str) -> CoreError {
        match self {
            KubeError::Core(err) => err,
            KubeError::Kubeconfig(message) | KubeError::Config(message) => {
                CoreError::validation(format!("{operation}: invalid kubeconfig: {message}"))
            }
            KubeError::ClusterNotFound { cluster } => CoreError::validation(format!(
                "{operation}: cluster '{cluster}' not found in kubeconfig"
            )),
            other => classify(operation, &other),
        }
    }
}

impl ExternalError for KubeError {}

impl From<kube::config::KubeconfigError> for KubeError {
    fn from(e: kube::config::KubeconfigError) -> Self {
        KubeError::Kubeconfig(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Kubeconfig(e.to_string())
    }
}
