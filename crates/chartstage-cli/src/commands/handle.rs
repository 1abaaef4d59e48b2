//! Handle command - answer one lifecycle poll
//!
//! Reads an invocation request (JSON) from a file or stdin, runs it through
//! the stage controller and writes the progress event (JSON) to stdout.

use chartstage_fetch::SourceFetcher;
use chartstage_kube::{
    HelmCliEngine, InvocationRequest, KubeconfigClusterProvider, OperationStatus, StageController,
};
use std::io::Read as _;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CliError, Result};

/// Run the handle command
pub async fn run(
    config: Option<&Path>,
    request_path: &str,
    cluster_kubeconfig: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let settings = super::load_settings(config)?;
    let request = read_request(request_path)?;

    let fetcher = SourceFetcher::from_settings(&settings)
        .map_err(|e| e.into_core("Building HTTP clients"))?;
    let mut clusters = KubeconfigClusterProvider::new(fetcher.clone(), settings.kubeconfig_path.clone());
    if let Some(path) = cluster_kubeconfig {
        clusters = clusters.with_cluster_kubeconfig(path.to_path_buf());
    }
    let engine = HelmCliEngine::new(settings.helm_binary.clone());
    let controller = StageController::new(Arc::new(engine), Arc::new(clusters), fetcher, settings);

    tracing::info!(action = request.action.as_str(), "handling request");
    let event = controller.handle(&request).await;

    let json = if pretty {
        serde_json::to_string_pretty(&event)?
    } else {
        serde_json::to_string(&event)?
    };
    println!("{json}");

    if event.status == OperationStatus::Failed {
        return Err(CliError::OperationFailed {
            message: event.message.unwrap_or_else(|| "unknown error".to_string()),
        });
    }
    Ok(())
}

fn read_request(path: &str) -> Result<InvocationRequest> {
    let content = if path == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(path).map_err(|e| CliError::Io {
            message: format!("{path}: {e}"),
        })?
    };
    serde_json::from_str(&content).map_err(|e| {
        CliError::validation_with_help(
            format!("invalid invocation request: {e}"),
            "expected a JSON object with at least an \"action\" field",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartstage_kube::Action;

    #[test]
    fn test_read_request_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"action":"DELETE","region":"us-east-1","desiredResourceState":{"ClusterID":"eks"}}"#,
        )
        .unwrap();

        let request = read_request(path.to_str().unwrap()).unwrap();
        assert_eq!(request.action, Action::Delete);
        assert_eq!(request.region, "us-east-1");
    }

    #[test]
    fn test_read_request_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, "{\"action\": \"RESTART\"}").unwrap();

        let err = read_request(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn test_read_request_missing_file() {
        let err = read_request("/nonexistent/request.json").unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
