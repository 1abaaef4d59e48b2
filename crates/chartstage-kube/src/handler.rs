//! Invocation request and progress event
//!
//! These are the shapes exchanged with the lifecycle engine on every poll.
//! Field names follow the invoker's conventions: camelCase on the envelope,
//! PascalCase on the resource model.

use chartstage_core::{CoreError, HandlerErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Lifecycle action requested by the invoker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Desired (or previous) state of a release resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceModel {
    #[serde(rename = "ClusterID", skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Kubeconfig reference: a URL or a local path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<String>,
    /// Raw kubeconfig document, wins over `ClusterID` and `KubeConfig`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_config_content: Option<String>,
    /// Identity the engine acts as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Inline assignments, e.g. `image.tag=v2,replicas=3`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(rename = "ValueOverrideURL", skip_serializing_if = "Option::is_none")]
    pub value_override_url: Option<String>,
    /// Deadline in minutes
    #[serde(rename = "TimeOut", skip_serializing_if = "Option::is_none")]
    pub time_out: Option<u32>,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// One poll from the invoker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub action: Action,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub desired_resource_state: Option<ResourceModel>,
    #[serde(default)]
    pub previous_resource_state: Option<ResourceModel>,
    #[serde(default)]
    pub callback_context: Option<Map<String, JsonValue>>,
}

/// Outcome of a poll as seen by the invoker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    InProgress,
    Success,
    Failed,
}

/// Answer to one poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub status: OperationStatus,
    pub resource_model: ResourceModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_context: Option<Map<String, JsonValue>>,
    pub callback_delay_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<HandlerErrorCode>,
}

impl ProgressEvent {
    /// Ask the invoker to poll again after `delay_seconds`
    pub fn in_progress(
        model: ResourceModel,
        context: Map<String, JsonValue>,
        delay_seconds: u64,
    ) -> Self {
        Self {
            status: OperationStatus::InProgress,
            resource_model: model,
            callback_context: Some(context),
            callback_delay_seconds: delay_seconds,
            message: None,
            error_code: None,
        }
    }

    pub fn success(model: ResourceModel, context: Map<String, JsonValue>) -> Self {
        Self {
            status: OperationStatus::Success,
            resource_model: model,
            callback_context: Some(context),
            callback_delay_seconds: 0,
            message: None,
            error_code: None,
        }
    }

    pub fn failed(
        model: ResourceModel,
        context: Option<Map<String, JsonValue>>,
        error: &CoreError,
    ) -> Self {
        Self {
            status: OperationStatus::Failed,
            resource_model: model,
            callback_context: context,
            callback_delay_seconds: 0,
            message: Some(error.to_string()),
            error_code: Some(error.handler_code()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != OperationStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_json() {
        let request: InvocationRequest = serde_json::from_value(json!({
            "action": "CREATE",
            "region": "eu-west-1",
            "desiredResourceState": {
                "ClusterID": "prod",
                "Chart": "bitnami/nginx",
                "Values": ["image.tag=1.25"],
                "ValueOverrideURL": "s3://cfg/prod.yaml",
                "TimeOut": 15
            }
        }))
        .unwrap();

        assert_eq!(request.action, Action::Create);
        let model = request.desired_resource_state.unwrap();
        assert_eq!(model.cluster_id.as_deref(), Some("prod"));
        assert_eq!(model.values, vec!["image.tag=1.25"]);
        assert_eq!(model.value_override_url.as_deref(), Some("s3://cfg/prod.yaml"));
        assert_eq!(model.time_out, Some(15));
        assert!(request.callback_context.is_none());
    }

    #[test]
    fn test_failed_event_shape() {
        let event = ProgressEvent::failed(
            ResourceModel::default(),
            None,
            &CoreError::Timeout {
                elapsed_secs: 3660,
                timeout_minutes: 60,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], json!("FAILED"));
        assert_eq!(value["errorCode"], json!("NotStabilized"));
        assert_eq!(value["callbackDelaySeconds"], json!(0));
        assert!(value.get("callbackContext").is_none());
        assert!(event.is_terminal());
    }

    #[test]
    fn test_in_progress_event_shape() {
        let mut context = Map::new();
        context.insert("Stage".into(), json!("Pending"));
        let model = ResourceModel {
            id: Some("abc".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(ProgressEvent::in_progress(model, context, 30)).unwrap();
        assert_eq!(value["status"], json!("IN_PROGRESS"));
        assert_eq!(value["resourceModel"], json!({"ID": "abc"}));
        assert_eq!(value["callbackContext"]["Stage"], json!("Pending"));
    }
}
