//! Provider settings
//!
//! Stored in `~/.config/chartstage/settings.yaml`. Every field has a default,
//! so a missing file or a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chart::STABLE_REPOSITORY_URL;
use crate::error::{CoreError, Result};

/// Default deadline for a lifecycle operation
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 60;

/// Namespace used when the model does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// Where downloaded chart archives are written
    pub chart_cache_path: PathBuf,

    /// Where a fetched override-values document is written
    pub values_scratch_path: PathBuf,

    /// Where the resolved kubeconfig is written
    pub kubeconfig_path: PathBuf,

    /// Repository URL used when the model does not supply one
    pub default_repository_url: String,

    /// Deadline used when the model does not supply one
    pub default_timeout_minutes: u32,

    /// How long the invoker should wait before polling again
    pub callback_delay_seconds: u64,

    /// Upper bound for a single network request, unbounded when unset
    pub fetch_timeout_seconds: Option<u64>,

    /// Chart engine executable
    pub helm_binary: String,

    /// Override for the object storage endpoint (S3-compatible stores, tests).
    ///
    /// Object storage requests are unsigned with or without this override,
    /// so `s3://` sources must be publicly readable; private buckets fail
    /// with `AccessDenied`.
    pub object_storage_endpoint: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            chart_cache_path: PathBuf::from("/tmp/chart.tgz"),
            values_scratch_path: PathBuf::from("/tmp/values.yaml"),
            kubeconfig_path: PathBuf::from("/tmp/kubeConfig"),
            default_repository_url: STABLE_REPOSITORY_URL.to_string(),
            default_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            callback_delay_seconds: 30,
            fetch_timeout_seconds: None,
            helm_binary: "helm".to_string(),
            object_storage_endpoint: None,
        }
    }
}

impl ProviderSettings {
    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::validation(format!("cannot read settings {}: {e}", path.display()))
        })?;
        let settings: Self = serde_yaml::from_str(&content)
            .map_err(|e| CoreError::parse(path.display().to_string(), e.to_string()))?;
        settings.validate()?;
        tracing::debug!(path = %path.display(), "loaded provider settings");
        Ok(settings)
    }

    /// Get default settings path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CoreError::validation("Could not determine config directory"))?;
        Ok(config_dir.join("chartstage").join("settings.yaml"))
    }

    fn validate(&self) -> Result<()> {
        if self.default_timeout_minutes == 0 {
            return Err(CoreError::validation(
                "defaultTimeoutMinutes must be greater than zero",
            ));
        }
        if self.helm_binary.trim().is_empty() {
            return Err(CoreError::validation("helmBinary must not be empty"));
        }
        Ok(())
    }
}
