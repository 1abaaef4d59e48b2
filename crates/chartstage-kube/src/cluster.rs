//! Cluster credentials
//!
//! A [`ClusterProvider`] turns a cluster target into a [`ClusterHandle`]: a
//! kubeconfig file on disk, the context to use inside it, and an optional
//! identity to impersonate. The chart engine only ever sees the handle.

use async_trait::async_trait;
use chartstage_core::ClusterTarget;
use chartstage_fetch::SourceFetcher;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{KubeError, Result};

/// Access to one cluster, as handed to the chart engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
    pub kubeconfig_path: PathBuf,
    pub context: Option<String>,
    pub impersonate: Option<String>,
}

impl ClusterHandle {
    /// Global engine flags selecting this cluster
    pub fn engine_flags(&self) -> Vec<String> {
        let mut flags = vec![
            "--kubeconfig".to_string(),
            self.kubeconfig_path.display().to_string(),
        ];
        if let Some(context) = &self.context {
            flags.push("--kube-context".to_string());
            flags.push(context.clone());
        }
        if let Some(user) = &self.impersonate {
            flags.push("--kube-as-user".to_string());
            flags.push(user.clone());
        }
        flags
    }
}

/// Resolves cluster targets to handles.
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Build a handle for `target`.
    ///
    /// `inline_kubeconfig` wins over whatever the target points at. `role`
    /// becomes the impersonated identity.
    async fn connect(
        &self,
        target: &ClusterTarget,
        role: Option<&str>,
        inline_kubeconfig: Option<&str>,
    ) -> Result<ClusterHandle>;
}

/// Kubeconfig-backed provider
pub struct KubeconfigClusterProvider {
    fetcher: SourceFetcher,
    /// Where the resolved kubeconfig is written for the engine
    output_path: PathBuf,
    /// Kubeconfig searched for cluster identifiers; kube defaults when unset
    cluster_kubeconfig: Option<PathBuf>,
}

impl KubeconfigClusterProvider {
    pub fn new(fetcher: SourceFetcher, output_path: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            output_path: output_path.into(),
            cluster_kubeconfig: None,
        }
    }

    /// Look up cluster identifiers in this kubeconfig instead of the default one
    pub fn with_cluster_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.cluster_kubeconfig = Some(path.into());
        self
    }

    async fn load_reference(&self, reference: &str) -> Result<Kubeconfig> {
        match Url::parse(reference) {
            Ok(url) if url.scheme() != "file" && url.has_host() => {
                tracing::info!(%reference, "fetching kubeconfig");
                self.fetcher.fetch(reference, &self.output_path).await?;
                read_kubeconfig(&self.output_path)
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| KubeError::Kubeconfig(format!("bad file URL '{reference}'")))?;
                read_kubeconfig(&path)
            }
            _ => read_kubeconfig(Path::new(reference)),
        }
    }

    fn load_for_cluster(&self, cluster: &str) -> Result<(Kubeconfig, String)> {
        let kubeconfig = match &self.cluster_kubeconfig {
            Some(path) => read_kubeconfig(path)?,
            None => Kubeconfig::read()?,
        };
        let context = context_for_cluster(&kubeconfig, cluster).ok_or_else(|| {
            KubeError::ClusterNotFound {
                cluster: cluster.to_string(),
            }
        })?;
        Ok((kubeconfig, context))
    }
}

#[async_trait]
impl ClusterProvider for KubeconfigClusterProvider {
    async fn connect(
        &self,
        target: &ClusterTarget,
        role: Option<&str>,
        inline_kubeconfig: Option<&str>,
    ) -> Result<ClusterHandle> {
        let (kubeconfig, context) = match (inline_kubeconfig.filter(|k| !k.trim().is_empty()), target)
        {
            (Some(raw), _) => (Kubeconfig::from_yaml(raw)?, None),
            (None, ClusterTarget::KubeConfig(reference)) => {
                (self.load_reference(reference).await?, None)
            }
            (None, ClusterTarget::ClusterId(cluster)) => {
                let (kubeconfig, context) = self.load_for_cluster(cluster)?;
                (kubeconfig, Some(context))
            }
        };

        validate(&kubeconfig, context.as_deref()).await?;
        write_kubeconfig(&kubeconfig, &self.output_path)?;
        tracing::debug!(
            path = %self.output_path.display(),
            context = context.as_deref().unwrap_or("<current>"),
            "kubeconfig ready"
        );

        Ok(ClusterHandle {
            kubeconfig_path: self.output_path.clone(),
            context,
            impersonate: role.filter(|r| !r.is_empty()).map(str::to_string),
        })
    }
}

fn read_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KubeError::io(path, e))?;
    Ok(Kubeconfig::from_yaml(&content)?)
}

/// A context named after the cluster, else the first context pointing at a
/// cluster entry with that name
fn context_for_cluster(kubeconfig: &Kubeconfig, cluster: &str) -> Option<String> {
    if kubeconfig.contexts.iter().any(|c| c.name == cluster) {
        return Some(cluster.to_string());
    }
    kubeconfig
        .contexts
        .iter()
        .find(|c| c.context.as_ref().is_some_and(|ctx| ctx.cluster == cluster))
        .map(|c| c.name.clone())
}

/// Make sure the kube client could be configured from this kubeconfig
async fn validate(kubeconfig: &Kubeconfig, context: Option<&str>) -> Result<()> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };
    kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
        .await
        .map_err(|e| KubeError::Config(e.to_string()))?;
    Ok(())
}

fn write_kubeconfig(kubeconfig: &Kubeconfig, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(kubeconfig)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| KubeError::io(parent, e))?;
    }
    std::fs::write(path, yaml).map_err(|e| KubeError::io(path, e))
}
