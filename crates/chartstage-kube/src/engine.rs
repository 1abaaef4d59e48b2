//! Chart engine
//!
//! The [`ChartEngine`] trait is the seam between the stage controller and
//! whatever installs charts. [`HelmCliEngine`] drives the `helm` executable.
//! Actions are submitted without waiting; progress is observed afterwards
//! through [`ChartEngine::status`].

use async_trait::async_trait;
use chartstage_core::{ChartDescriptor, Values};
use serde::Deserialize;
use std::io::Write as _;
use std::path::Path;
use tokio::process::Command;

use crate::cluster::ClusterHandle;
use crate::error::{KubeError, Result};

/// A release to install or upgrade
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseSpec {
    pub name: String,
    pub namespace: String,
    pub chart: ChartDescriptor,
    pub values: Values,
}

/// What the engine reports about a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// The last action finished successfully
    Deployed,
    /// An action is still running
    Running(String),
    /// The last action failed
    Failed(String),
    /// The engine has no record of the release
    NotFound,
}

impl ReleaseStatus {
    /// Map an engine status string (`deployed`, `pending-install`, ...)
    pub fn from_engine(status: &str, description: Option<&str>) -> Self {
        let description = description.unwrap_or_default().to_string();
        match status {
            "deployed" | "superseded" => Self::Deployed,
            "failed" => Self::Failed(if description.is_empty() {
                "release failed".to_string()
            } else {
                description
            }),
            "uninstalled" => Self::NotFound,
            other => Self::Running(other.to_string()),
        }
    }
}

/// Installs, upgrades, removes and inspects releases.
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ChartEngine: Send + Sync {
    /// Register (or refresh) a chart repository under `alias`
    async fn ensure_repository(&self, alias: &str, url: &str) -> Result<()>;

    async fn install(&self, release: &ReleaseSpec, cluster: &ClusterHandle) -> Result<()>;

    async fn upgrade(&self, release: &ReleaseSpec, cluster: &ClusterHandle) -> Result<()>;

    async fn uninstall(&self, name: &str, namespace: &str, cluster: &ClusterHandle) -> Result<()>;

    async fn status(
        &self,
        name: &str,
        namespace: &str,
        cluster: &ClusterHandle,
    ) -> Result<ReleaseStatus>;
}

#[derive(Deserialize)]
struct StatusOutput {
    info: StatusInfo,
}

#[derive(Deserialize)]
struct StatusInfo {
    status: String,
    #[serde(default)]
    description: Option<String>,
}

/// Engine backed by the `helm` executable
#[derive(Debug, Clone)]
pub struct HelmCliEngine {
    binary: String,
}

impl Default for HelmCliEngine {
    fn default() -> Self {
        Self::new("helm")
    }
}

impl HelmCliEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        let command = format!(
            "{} {}",
            self.binary,
            args.first().map(String::as_str).unwrap_or_default()
        );
        tracing::debug!(%command, ?args, "running chart engine");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| KubeError::EngineUnavailable {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(KubeError::EngineFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn submit(&self, action: &str, release: &ReleaseSpec, cluster: &ClusterHandle) -> Result<()> {
        let values_file = write_values(&release.values)?;
        let args = release_args(action, release, values_file.path(), cluster);
        self.run(&args).await?;
        tracing::info!(
            release = %release.name,
            namespace = %release.namespace,
            chart = %release.chart.chart,
            "{action} submitted"
        );
        Ok(())
    }
}

#[async_trait]
impl ChartEngine for HelmCliEngine {
    async fn ensure_repository(&self, alias: &str, url: &str) -> Result<()> {
        let args = vec![
            "repo".to_string(),
            "add".to_string(),
            alias.to_string(),
            url.to_string(),
            "--force-update".to_string(),
        ];
        self.run(&args).await?;
        tracing::info!(%alias, %url, "repository registered");
        Ok(())
    }

    async fn install(&self, release: &ReleaseSpec, cluster: &ClusterHandle) -> Result<()> {
        self.submit("install", release, cluster).await
    }

    async fn upgrade(&self, release: &ReleaseSpec, cluster: &ClusterHandle) -> Result<()> {
        self.submit("upgrade", release, cluster).await
    }

    async fn uninstall(&self, name: &str, namespace: &str, cluster: &ClusterHandle) -> Result<()> {
        let mut args = vec![
            "uninstall".to_string(),
            name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        args.extend(cluster.engine_flags());
        self.run(&args).await?;
        tracing::info!(release = %name, %namespace, "uninstall submitted");
        Ok(())
    }

    async fn status(
        &self,
        name: &str,
        namespace: &str,
        cluster: &ClusterHandle,
    ) -> Result<ReleaseStatus> {
        let mut args = vec![
            "status".to_string(),
            name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        args.extend(cluster.engine_flags());

        let stdout = match self.run(&args).await {
            Ok(stdout) => stdout,
            Err(err) if err.is_not_found() => return Ok(ReleaseStatus::NotFound),
            Err(err) => return Err(err),
        };
        parse_status(&stdout)
    }
}

/// Arguments for `install` / `upgrade`
fn release_args(
    action: &str,
    release: &ReleaseSpec,
    values_file: &Path,
    cluster: &ClusterHandle,
) -> Vec<String> {
    let mut args = vec![
        action.to_string(),
        release.name.clone(),
        release.chart.chart.clone(),
        "--namespace".to_string(),
        release.namespace.clone(),
    ];
    if action == "install" {
        args.push("--create-namespace".to_string());
    }
    args.push("--values".to_string());
    args.push(values_file.display().to_string());
    if let Some(version) = &release.chart.chart_version {
        args.push("--version".to_string());
        args.push(version.clone());
    }
    args.extend(cluster.engine_flags());
    args
}

fn write_values(values: &Values) -> Result<tempfile::NamedTempFile> {
    let yaml = serde_yaml::to_string(values.inner())?;
    let mut file = tempfile::Builder::new()
        .prefix("chartstage-values-")
        .suffix(".yaml")
        .tempfile()
        .map_err(|e| KubeError::io(std::env::temp_dir(), e))?;
    file.write_all(yaml.as_bytes())
        .map_err(|e| KubeError::io(file.path(), e))?;
    Ok(file)
}

fn parse_status(stdout: &[u8]) -> Result<ReleaseStatus> {
    let output: StatusOutput =
        serde_json::from_slice(stdout).map_err(|e| KubeError::EngineOutput {
            command: "status".to_string(),
            message: e.to_string(),
        })?;
    Ok(ReleaseStatus::from_engine(
        &output.info.status,
        output.info.description.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartstage_core::ChartResolver;
    use std::path::PathBuf;

    fn cluster() -> ClusterHandle {
        ClusterHandle {
            kubeconfig_path: PathBuf::from("/tmp/kubeConfig"),
            context: None,
            impersonate: None,
        }
    }

    fn release(chart: &str, version: Option<&str>) -> ReleaseSpec {
        ReleaseSpec {
            name: "web".into(),
            namespace: "apps".into(),
            chart: ChartResolver::default()
                .resolve(Some(chart), version, None)
                .unwrap(),
            values: Values::new(),
        }
    }

    #[test]
    fn test_install_args() {
        let args = release_args(
            "install",
            &release("bitnami/nginx", Some("15.0.0")),
            Path::new("/tmp/v.yaml"),
            &cluster(),
        );
        assert_eq!(
            args,
            vec![
                "install",
                "web",
                "bitnami/nginx",
                "--namespace",
                "apps",
                "--create-namespace",
                "--values",
                "/tmp/v.yaml",
                "--version",
                "15.0.0",
                "--kubeconfig",
                "/tmp/kubeConfig",
            ]
        );
    }

    #[test]
    fn test_upgrade_args_local_chart() {
        let args = release_args(
            "upgrade",
            &release("https://example.com/charts/nginx-1.2.3.tgz", None),
            Path::new("/tmp/v.yaml"),
            &cluster(),
        );
        assert_eq!(args[2], "/tmp/chart.tgz");
        assert!(!args.contains(&"--create-namespace".to_string()));
        assert!(!args.contains(&"--version".to_string()));
    }

    #[test]
    fn test_parse_status() {
        let deployed = br#"{"name":"web","info":{"status":"deployed","description":"Install complete"}}"#;
        assert_eq!(parse_status(deployed).unwrap(), ReleaseStatus::Deployed);

        let pending = br#"{"info":{"status":"pending-install"}}"#;
        assert_eq!(
            parse_status(pending).unwrap(),
            ReleaseStatus::Running("pending-install".into())
        );

        let failed = br#"{"info":{"status":"failed","description":"timed out waiting for the condition"}}"#;
        assert_eq!(
            parse_status(failed).unwrap(),
            ReleaseStatus::Failed("timed out waiting for the condition".into())
        );

        assert!(matches!(
            parse_status(b"Error: not json"),
            Err(KubeError::EngineOutput { .. })
        ));
    }

    #[test]
    fn test_values_file_contents() {
        let values = chartstage_core::parse_assignments(&["image.tag=v2".to_string()]).unwrap();
        let file = write_values(&values).unwrap();
        let written = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(Values::from_yaml(&written).unwrap(), values);
    }

    #[cfg(unix)]
    fn fake_helm(dir: &Path, stderr: &str) -> HelmCliEngine {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("helm");
        std::fs::write(&path, format!("#!/bin/sh\necho '{stderr}' >&2\nexit 1\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        HelmCliEngine::new(path.display().to_string())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_status_of_missing_release() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = fake_helm(dir.path(), "Error: release: not found");
        assert_eq!(
            engine.status("web", "apps", &cluster()).await.unwrap(),
            ReleaseStatus::NotFound
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_status_failure_mentioning_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = fake_helm(
            dir.path(),
            "Error: Kubernetes cluster unreachable: exec: executable aws not found",
        );
        let err = engine.status("web", "apps", &cluster()).await.unwrap_err();
        assert!(matches!(err, KubeError::EngineFailed { .. }));
        assert!(!err.is_not_found());

        let err = engine.uninstall("web", "apps", &cluster()).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = HelmCliEngine::new("/nonexistent/chartstage-helm");
        let err = engine.ensure_repository("stable", "https://charts.helm.sh/stable").await.unwrap_err();
        assert!(matches!(err, KubeError::EngineUnavailable { .. }));
    }
}
