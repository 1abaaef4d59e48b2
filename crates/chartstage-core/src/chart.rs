//! Chart reference resolution
//!
//! A chart reference is either a URL with a host (an archive that has to be
//! downloaded to the local chart cache first) or `repo/chart` / `chart`
//! naming a chart in a repository the engine knows about.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::config::ProviderSettings;
use crate::error::{CoreError, Result};

/// Well-known stable charts repository
pub const STABLE_REPOSITORY_URL: &str = "https://charts.helm.sh/stable";

/// Repository alias used for bare chart names
pub const DEFAULT_REPOSITORY_ALIAS: &str = "stable";

static CHART_NAME: Lazy<Regex> = Lazy::new(|| Regex::new("[A-Za-z]+").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    /// Archive downloaded to the local chart cache
    Local,
    /// Chart served by a configured repository
    Remote,
}

/// Everything the engine needs to locate a chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescriptor {
    /// Reference handed to the engine: the cache path or `repo/chart`
    pub chart: String,
    pub chart_name: String,
    /// Local cache location (Local only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_path: Option<PathBuf>,
    pub chart_type: ChartType,
    /// Repository alias (Remote only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,
    pub chart_repo_url: String,
    /// Where a Local archive is downloaded from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl ChartDescriptor {
    pub fn is_local(&self) -> bool {
        self.chart_type == ChartType::Local
    }
}

/// Resolves chart references against fixed provider settings
#[derive(Debug, Clone)]
pub struct ChartResolver {
    cache_path: PathBuf,
    default_repository_url: String,
}

impl Default for ChartResolver {
    fn default() -> Self {
        Self::from_settings(&ProviderSettings::default())
    }
}

impl ChartResolver {
    pub fn new(cache_path: impl Into<PathBuf>, default_repository_url: impl Into<String>) -> Self {
        Self {
            cache_path: cache_path.into(),
            default_repository_url: default_repository_url.into(),
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self::new(
            settings.chart_cache_path.clone(),
            settings.default_repository_url.clone(),
        )
    }

    /// Resolve a chart reference.
    ///
    /// The result depends only on the arguments and the resolver's settings.
    pub fn resolve(
        &self,
        chart: Option<&str>,
        version: Option<&str>,
        repository: Option<&str>,
    ) -> Result<ChartDescriptor> {
        let reference = chart
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CoreError::validation("Chart is required"))?;

        let mut descriptor = match Url::parse(reference) {
            Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => {
                self.local(reference, &url)?
            }
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => remote(reference),
            Err(e) => {
                return Err(CoreError::validation(format!(
                    "Process chart: cannot parse '{reference}': {e}"
                )));
            }
        };

        descriptor.chart_version = version.map(str::to_string);
        descriptor.chart_repo_url = repository
            .map(str::to_string)
            .unwrap_or_else(|| self.default_repository_url.clone());
        Ok(descriptor)
    }

    fn local(&self, reference: &str, url: &Url) -> Result<ChartDescriptor> {
        let chart_name = archive_chart_name(url).ok_or_else(|| {
            CoreError::validation(format!("cannot derive a chart name from '{reference}'"))
        })?;
        Ok(ChartDescriptor {
            chart: self.cache_path.display().to_string(),
            chart_name,
            chart_path: Some(self.cache_path.clone()),
            chart_type: ChartType::Local,
            chart_repo: None,
            chart_version: None,
            chart_repo_url: String::new(),
            source_url: Some(reference.to_string()),
        })
    }
}

fn remote(reference: &str) -> ChartDescriptor {
    let parts: Vec<&str> = reference.split('/').collect();
    let (repo, name) = if parts.len() > 1 {
        (parts[0], parts[1])
    } else {
        (DEFAULT_REPOSITORY_ALIAS, reference)
    };
    ChartDescriptor {
        chart: format!("{repo}/{name}"),
        chart_name: name.to_string(),
        chart_path: None,
        chart_type: ChartType::Remote,
        chart_repo: Some(repo.to_string()),
        chart_version: None,
        chart_repo_url: String::new(),
        source_url: None,
    }
}

/// Chart name of an archive URL: the first alphabetic run of its file name.
///
/// `MyChart-1.2.tgz` yields `MyChart`; digits and everything after the first
/// non-letter are dropped on purpose.
fn archive_chart_name(url: &Url) -> Option<String> {
    let path = url.path();
    let segments: Vec<&str> = path.split('/').collect();
    let file = if segments.len() > 1 {
        segments[segments.len() - 1].to_string()
    } else {
        let mut request = path.to_string();
        if let Some(query) = url.query() {
            request.push('?');
            request.push_str(query);
        }
        request.trim_start_matches('/').to_string()
    };
    CHART_NAME.find(&file).map(|m| m.as_str().to_string())
}
