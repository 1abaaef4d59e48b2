//! Opaque physical identifier
//!
//! The identifier binds a logical resource to its cluster target, region and
//! Kubernetes release coordinates. It is a JSON object with empty fields
//! omitted, carried as unpadded URL-safe base64 so the invoker can embed it
//! anywhere without escaping.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Which cluster a release lives on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClusterTarget {
    /// A cluster known by its identifier
    ClusterId(String),
    /// A reference to a kubeconfig document (URL or path)
    KubeConfig(String),
}

impl ClusterTarget {
    /// Build a target from the two optional model fields.
    ///
    /// Exactly one must be set; empty strings count as unset.
    pub fn from_parts(cluster_id: Option<&str>, kube_config: Option<&str>) -> Result<Self> {
        let cluster_id = cluster_id.filter(|s| !s.is_empty());
        let kube_config = kube_config.filter(|s| !s.is_empty());
        match (cluster_id, kube_config) {
            (Some(_), Some(_)) => Err(CoreError::validation(
                "Both ClusterID or KubeConfig can not be specified",
            )),
            (Some(id), None) => Ok(Self::ClusterId(id.to_string())),
            (None, Some(cfg)) => Ok(Self::KubeConfig(cfg.to_string())),
            (None, None) => Err(CoreError::validation(
                "Either ClusterID or KubeConfig must be specified",
            )),
        }
    }

    pub fn cluster_id(&self) -> Option<&str> {
        match self {
            Self::ClusterId(id) => Some(id),
            Self::KubeConfig(_) => None,
        }
    }

    pub fn kube_config(&self) -> Option<&str> {
        match self {
            Self::ClusterId(_) => None,
            Self::KubeConfig(cfg) => Some(cfg),
        }
    }
}

/// Decoded physical identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub target: ClusterTarget,
    pub region: String,
    pub name: String,
    pub namespace: String,
}

/// Wire form. Field order and names are part of the format.
#[derive(Serialize, Deserialize)]
struct Payload {
    #[serde(rename = "ClusterID", default, skip_serializing_if = "String::is_empty")]
    cluster_id: String,
    #[serde(rename = "KubeConfig", default, skip_serializing_if = "String::is_empty")]
    kube_config: String,
    #[serde(rename = "Region", default, skip_serializing_if = "String::is_empty")]
    region: String,
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(rename = "Namespace", default, skip_serializing_if = "String::is_empty")]
    namespace: String,
}

impl Identifier {
    /// Create an identifier, rejecting empty release coordinates
    pub fn new(
        target: ClusterTarget,
        name: impl Into<String>,
        namespace: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self> {
        let id = Self {
            target,
            region: region.into(),
            name: name.into(),
            namespace: namespace.into(),
        };
        if id.name.is_empty() || id.namespace.is_empty() || id.region.is_empty() {
            return Err(CoreError::validation(
                "Incorrect values for variable name, namespace, region",
            ));
        }
        if id.target.cluster_id().is_some_and(str::is_empty)
            || id.target.kube_config().is_some_and(str::is_empty)
        {
            return Err(CoreError::validation("cluster target must not be empty"));
        }
        Ok(id)
    }

    /// Encode into the opaque string handed to the invoker
    pub fn encode(&self) -> Result<String> {
        let payload = Payload {
            cluster_id: self.target.cluster_id().unwrap_or_default().to_string(),
            kube_config: self.target.kube_config().unwrap_or_default().to_string(),
            region: self.region.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| CoreError::validation(format!("Json Marshal: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode an opaque string produced by [`Identifier::encode`]
    pub fn decode(opaque: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(opaque.trim())
            .map_err(|e| CoreError::decode(format!("Decode: {e}")))?;
        let payload: Payload = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::decode(format!("Json Unmarshal: {e}")))?;

        let target = ClusterTarget::from_parts(
            Some(payload.cluster_id.as_str()),
            Some(payload.kube_config.as_str()),
        )
        .map_err(|e| CoreError::decode(e.to_string()))?;

        Self::new(target, payload.name, payload.namespace, payload.region)
            .map_err(|e| CoreError::decode(e.to_string()))
    }
}

/// Encode straight from the optional model fields
pub fn encode_id(
    cluster_id: Option<&str>,
    kube_config: Option<&str>,
    name: &str,
    namespace: &str,
    region: &str,
) -> Result<String> {
    let target = ClusterTarget::from_parts(cluster_id, kube_config)?;
    Identifier::new(target, name, namespace, region)?.encode()
}
