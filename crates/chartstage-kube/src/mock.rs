//! Mock chart engine and cluster provider for testing
//!
//! Both keep their state in memory so the stage controller can be driven
//! poll by poll without a cluster or a `helm` binary.

use async_trait::async_trait;
use chartstage_core::ClusterTarget;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::cluster::{ClusterHandle, ClusterProvider};
use crate::engine::{ChartEngine, ReleaseSpec, ReleaseStatus};
use crate::error::{KubeError, Result};

/// Counts of engine operations for assertions
#[derive(Debug, Default, Clone)]
pub struct EngineCounts {
    pub repositories: usize,
    pub installs: usize,
    pub upgrades: usize,
    pub uninstalls: usize,
    pub status_checks: usize,
}

#[derive(Default)]
struct EngineState {
    /// (namespace, name) -> statuses still to report; the last one repeats
    releases: HashMap<(String, String), VecDeque<ReleaseStatus>>,
    /// Statuses a release reports after the next install or upgrade
    after_submit: Vec<ReleaseStatus>,
    repositories: Vec<(String, String)>,
    submitted: Vec<ReleaseSpec>,
    fail_next: Option<String>,
    fail_next_install: Option<String>,
    counts: EngineCounts,
}

/// In-memory chart engine
#[derive(Clone)]
pub struct MockChartEngine {
    state: Arc<RwLock<EngineState>>,
}

impl Default for MockChartEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChartEngine {
    /// Releases report `Deployed` right after being submitted
    pub fn new() -> Self {
        let engine = Self {
            state: Arc::new(RwLock::new(EngineState::default())),
        };
        engine.state.write().unwrap().after_submit = vec![ReleaseStatus::Deployed];
        engine
    }

    /// Statuses reported, in order, by releases submitted from now on
    pub fn with_progress(self, statuses: Vec<ReleaseStatus>) -> Self {
        self.state.write().unwrap().after_submit = statuses;
        self
    }

    /// Pre-populate an existing release
    pub fn with_release(self, namespace: &str, name: &str, statuses: Vec<ReleaseStatus>) -> Self {
        self.state
            .write()
            .unwrap()
            .releases
            .insert((namespace.to_string(), name.to_string()), statuses.into());
        self
    }

    /// Make the next engine call fail with `stderr`
    pub fn fail_next(&self, stderr: &str) {
        self.state.write().unwrap().fail_next = Some(stderr.to_string());
    }

    /// Make the next install fail with `stderr`, leaving no release behind
    pub fn fail_next_install(&self, stderr: &str) {
        self.state.write().unwrap().fail_next_install = Some(stderr.to_string());
    }

    pub fn operation_counts(&self) -> EngineCounts {
        self.state.read().unwrap().counts.clone()
    }

    /// Every install/upgrade request seen so far
    pub fn submitted(&self) -> Vec<ReleaseSpec> {
        self.state.read().unwrap().submitted.clone()
    }

    /// Repositories registered so far, as (alias, url)
    pub fn repositories(&self) -> Vec<(String, String)> {
        self.state.read().unwrap().repositories.clone()
    }

    pub fn has_release(&self, namespace: &str, name: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .releases
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    fn take_failure(state: &mut EngineState, command: &str) -> Result<()> {
        match state.fail_next.take() {
            Some(stderr) => Err(KubeError::EngineFailed {
                command: command.to_string(),
                code: Some(1),
                stderr,
            }),
            None => Ok(()),
        }
    }

    fn submit(&self, command: &str, release: &ReleaseSpec) -> Result<()> {
        let mut state = self.state.write().unwrap();
        Self::take_failure(&mut state, command)?;
        let statuses = state.after_submit.clone().into();
        state.releases.insert(
            (release.namespace.clone(), release.name.clone()),
            statuses,
        );
        state.submitted.push(release.clone());
        Ok(())
    }
}

#[async_trait]
impl ChartEngine for MockChartEngine {
    async fn ensure_repository(&self, alias: &str, url: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.counts.repositories += 1;
        Self::take_failure(&mut state, "helm repo")?;
        state.repositories.push((alias.to_string(), url.to_string()));
        Ok(())
    }

    async fn install(&self, release: &ReleaseSpec, _cluster: &ClusterHandle) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            state.counts.installs += 1;
            if let Some(stderr) = state.fail_next_install.take() {
                return Err(KubeError::EngineFailed {
                    command: "helm install".to_string(),
                    code: Some(1),
                    stderr,
                });
            }
            let key = (release.namespace.clone(), release.name.clone());
            if state.releases.contains_key(&key) {
                return Err(KubeError::EngineFailed {
                    command: "helm install".to_string(),
                    code: Some(1),
                    stderr: "Error: INSTALLATION FAILED: cannot re-use a name that is still in use"
                        .to_string(),
                });
            }
        }
        self.submit("helm install", release)
    }

    async fn upgrade(&self, release: &ReleaseSpec, _cluster: &ClusterHandle) -> Result<()> {
        self.state.write().unwrap().counts.upgrades += 1;
        self.submit("helm upgrade", release)
    }

    async fn uninstall(&self, name: &str, namespace: &str, _cluster: &ClusterHandle) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.counts.uninstalls += 1;
        Self::take_failure(&mut state, "helm uninstall")?;
        let key = (namespace.to_string(), name.to_string());
        if state.releases.remove(&key).is_none() {
            return Err(KubeError::EngineFailed {
                command: "helm uninstall".to_string(),
                code: Some(1),
                stderr: format!("Error: uninstall: Release not loaded: {name}: release: not found"),
            });
        }
        Ok(())
    }

    async fn status(
        &self,
        name: &str,
        namespace: &str,
        _cluster: &ClusterHandle,
    ) -> Result<ReleaseStatus> {
        let mut state = self.state.write().unwrap();
        state.counts.status_checks += 1;
        Self::take_failure(&mut state, "helm status")?;
        let Some(queue) = state
            .releases
            .get_mut(&(namespace.to_string(), name.to_string()))
        else {
            return Ok(ReleaseStatus::NotFound);
        };
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(status.unwrap_or(ReleaseStatus::Deployed))
    }
}

/// Cluster provider that hands out a fixed handle
#[derive(Clone)]
pub struct MockClusterProvider {
    kubeconfig_path: PathBuf,
    failure: Option<String>,
    connects: Arc<RwLock<Vec<(ClusterTarget, Option<String>)>>>,
}

impl MockClusterProvider {
    pub fn new(kubeconfig_path: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig_path: kubeconfig_path.into(),
            failure: None,
            connects: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Every connect fails with `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Targets and roles seen so far
    pub fn connects(&self) -> Vec<(ClusterTarget, Option<String>)> {
        self.connects.read().unwrap().clone()
    }
}

#[async_trait]
impl ClusterProvider for MockClusterProvider {
    async fn connect(
        &self,
        target: &ClusterTarget,
        role: Option<&str>,
        _inline_kubeconfig: Option<&str>,
    ) -> Result<ClusterHandle> {
        self.connects
            .write()
            .unwrap()
            .push((target.clone(), role.map(str::to_string)));
        if let Some(message) = &self.failure {
            return Err(KubeError::Kubeconfig(message.clone()));
        }
        Ok(ClusterHandle {
            kubeconfig_path: self.kubeconfig_path.clone(),
            context: target.cluster_id().map(str::to_string),
            impersonate: role.map(str::to_string),
        })
    }
}
