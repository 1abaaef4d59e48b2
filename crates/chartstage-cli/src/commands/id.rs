//! Id command - encode and decode physical identifiers

use chartstage_core::{ClusterTarget, Identifier};
use serde_json::json;

use crate::error::Result;

/// Print the opaque identifier for the given coordinates
pub fn encode(
    cluster_id: Option<&str>,
    kube_config: Option<&str>,
    name: &str,
    namespace: &str,
    region: &str,
) -> Result<()> {
    let target = ClusterTarget::from_parts(cluster_id, kube_config)?;
    let id = Identifier::new(target, name, namespace, region)?;
    println!("{}", id.encode()?);
    Ok(())
}

/// Print the fields of an opaque identifier as JSON
pub fn decode(opaque: &str) -> Result<()> {
    let id = Identifier::decode(opaque)?;
    let mut fields = json!({
        "Region": id.region,
        "Name": id.name,
        "Namespace": id.namespace,
    });
    match &id.target {
        ClusterTarget::ClusterId(cluster) => fields["ClusterID"] = json!(cluster),
        ClusterTarget::KubeConfig(config) => fields["KubeConfig"] = json!(config),
    }
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}
