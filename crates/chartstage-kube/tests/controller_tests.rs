//! End-to-end polls through the stage controller with in-memory collaborators

use chartstage_core::{HandlerErrorCode, Identifier, ProviderSettings};
use chartstage_fetch::{HttpDownloader, MockObjectStore, SourceFetcher};
use chartstage_kube::{
    Action, InvocationRequest, MockChartEngine, MockClusterProvider, OperationStatus,
    ProgressEvent, ReleaseStatus, ResourceModel, StageController,
};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    engine: MockChartEngine,
    clusters: MockClusterProvider,
    store: MockObjectStore,
    controller: StageController,
    settings: ProviderSettings,
}

fn harness_with(engine: MockChartEngine, store: MockObjectStore) -> Harness {
    let dir = TempDir::new().unwrap();
    let settings = ProviderSettings {
        chart_cache_path: dir.path().join("chart.tgz"),
        values_scratch_path: dir.path().join("values.yaml"),
        kubeconfig_path: dir.path().join("kubeConfig"),
        callback_delay_seconds: 5,
        ..Default::default()
    };
    let clusters = MockClusterProvider::new(&settings.kubeconfig_path);
    let fetcher = SourceFetcher::new(HttpDownloader::new(None).unwrap(), Arc::new(store.clone()));
    let controller = StageController::new(
        Arc::new(engine.clone()),
        Arc::new(clusters.clone()),
        fetcher,
        settings.clone(),
    );
    Harness {
        _dir: dir,
        engine,
        clusters,
        store,
        controller,
        settings,
    }
}

fn harness() -> Harness {
    harness_with(MockChartEngine::new(), MockObjectStore::new())
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn model() -> ResourceModel {
    ResourceModel {
        cluster_id: Some("prod".into()),
        chart: Some("bitnami/nginx".into()),
        name: Some("web".into()),
        namespace: Some("apps".into()),
        ..Default::default()
    }
}

fn request(action: Action, model: ResourceModel, context: Option<Map<String, JsonValue>>) -> InvocationRequest {
    InvocationRequest {
        action,
        region: "eu-west-1".into(),
        desired_resource_state: Some(model),
        previous_resource_state: None,
        callback_context: context,
    }
}

fn context(value: JsonValue) -> Option<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(map) => Some(map),
        _ => panic!("not an object"),
    }
}

fn stage(event: &ProgressEvent) -> Option<&str> {
    event.callback_context.as_ref()?.get("Stage")?.as_str()
}

#[tokio::test]
async fn test_create_runs_to_completion() {
    let h = harness();

    let first = h.controller.handle_at(&request(Action::Create, model(), None), t0()).await;
    assert_eq!(first.status, OperationStatus::InProgress);
    assert_eq!(stage(&first), Some("Pending"));
    assert_eq!(first.callback_delay_seconds, 5);
    let ctx = first.callback_context.clone().unwrap();
    assert_eq!(ctx["StartTime"], json!("2024-06-01T12:00:00Z"));
    assert_eq!(ctx["Name"], json!("web"));

    let id = first.resource_model.id.clone().unwrap();
    let identifier = Identifier::decode(&id).unwrap();
    assert_eq!(identifier.name, "web");
    assert_eq!(identifier.namespace, "apps");
    assert_eq!(identifier.region, "eu-west-1");
    assert_eq!(identifier.target.cluster_id(), Some("prod"));

    assert_eq!(h.engine.operation_counts().installs, 1);
    assert_eq!(
        h.engine.repositories(),
        vec![("bitnami".to_string(), "https://charts.helm.sh/stable".to_string())]
    );
    assert_eq!(h.engine.submitted()[0].chart.chart, "bitnami/nginx");

    let second = h
        .controller
        .handle_at(&request(Action::Create, model(), Some(ctx)), t0() + TimeDelta::minutes(1))
        .await;
    assert_eq!(second.status, OperationStatus::Success);
    assert_eq!(stage(&second), Some("Complete"));
    assert_eq!(second.resource_model.id.as_deref(), Some(id.as_str()));
    assert_eq!(
        second.callback_context.as_ref().unwrap()["StartTime"],
        json!("2024-06-01T12:00:00Z")
    );
}

#[tokio::test]
async fn test_running_release_moves_to_in_progress() {
    let engine = MockChartEngine::new().with_progress(vec![
        ReleaseStatus::Running("pending-install".into()),
        ReleaseStatus::Deployed,
    ]);
    let h = harness_with(engine, MockObjectStore::new());

    let first = h.controller.handle_at(&request(Action::Create, model(), None), t0()).await;
    let second = h
        .controller
        .handle_at(
            &request(Action::Create, model(), first.callback_context.clone()),
            t0() + TimeDelta::minutes(2),
        )
        .await;
    assert_eq!(second.status, OperationStatus::InProgress);
    assert_eq!(stage(&second), Some("InProgress"));

    let third = h
        .controller
        .handle_at(
            &request(Action::Create, model(), second.callback_context.clone()),
            t0() + TimeDelta::minutes(4),
        )
        .await;
    assert_eq!(third.status, OperationStatus::Success);
    assert_eq!(h.engine.operation_counts().installs, 1);
}

#[tokio::test]
async fn test_timeout_after_default_deadline() {
    let h = harness();
    let now = t0();
    let started = (now - TimeDelta::minutes(61)).to_rfc3339();
    let ctx = context(json!({"Stage": "Pending", "StartTime": started, "Name": "web"}));

    let event = h.controller.handle_at(&request(Action::Create, model(), ctx), now).await;

    assert_eq!(event.status, OperationStatus::Failed);
    assert_eq!(event.error_code, Some(HandlerErrorCode::NotStabilized));
    assert_eq!(stage(&event), Some("Failed"));
    assert_eq!(
        event.callback_context.as_ref().unwrap()["StartTime"],
        json!(started)
    );
    assert_eq!(h.engine.operation_counts().status_checks, 0);
}

#[tokio::test]
async fn test_recent_start_is_not_timed_out() {
    let engine = MockChartEngine::new().with_release(
        "apps",
        "web",
        vec![ReleaseStatus::Running("pending-upgrade".into())],
    );
    let h = harness_with(engine, MockObjectStore::new());
    let now = t0();
    let started = (now - TimeDelta::minutes(10)).to_rfc3339();
    let ctx = context(json!({"Stage": "Pending", "StartTime": started}));

    let event = h.controller.handle_at(&request(Action::Create, model(), ctx), now).await;
    assert_eq!(event.status, OperationStatus::InProgress);
    assert_eq!(stage(&event), Some("InProgress"));
}

#[tokio::test]
async fn test_configured_timeout_wins() {
    let h = harness();
    let now = t0();
    let ctx = context(json!({
        "Stage": "InProgress",
        "StartTime": (now - TimeDelta::minutes(10)).to_rfc3339(),
    }));
    let mut m = model();
    m.time_out = Some(5);

    let event = h.controller.handle_at(&request(Action::Create, m, ctx), now).await;
    assert_eq!(event.error_code, Some(HandlerErrorCode::NotStabilized));
}

#[tokio::test]
async fn test_release_name_generated_once() {
    let h = harness();
    let mut m = model();
    m.name = None;
    m.chart = Some("nginx".into());

    let first = h.controller.handle_at(&request(Action::Create, m.clone(), None), t0()).await;
    let expected = format!("nginx-{}", t0().timestamp());
    assert_eq!(first.resource_model.name.as_deref(), Some(expected.as_str()));
    assert_eq!(first.callback_context.as_ref().unwrap()["Name"], json!(expected));

    let second = h
        .controller
        .handle_at(
            &request(Action::Create, m, first.callback_context.clone()),
            t0() + TimeDelta::minutes(3),
        )
        .await;
    assert_eq!(second.resource_model.name.as_deref(), Some(expected.as_str()));
    assert_eq!(second.resource_model.id, first.resource_model.id);
}

#[tokio::test]
async fn test_generated_name_survives_retryable_failure() {
    let h = harness();
    let mut m = model();
    m.name = None;
    m.chart = Some("nginx".into());
    h.engine
        .fail_next_install("Error: Kubernetes cluster unreachable: connection refused");

    let first = h.controller.handle_at(&request(Action::Create, m.clone(), None), t0()).await;
    let expected = format!("nginx-{}", t0().timestamp());
    assert_eq!(first.status, OperationStatus::Failed);
    assert_eq!(first.error_code, Some(HandlerErrorCode::GeneralServiceException));
    let ctx = first.callback_context.clone().unwrap();
    assert_eq!(ctx["Stage"], json!("Init"));
    assert_eq!(ctx["Name"], json!(expected));

    let second = h
        .controller
        .handle_at(
            &request(Action::Create, m, first.callback_context),
            t0() + TimeDelta::minutes(1),
        )
        .await;
    assert_eq!(second.status, OperationStatus::InProgress);
    assert_eq!(second.resource_model.name.as_deref(), Some(expected.as_str()));
    assert_eq!(h.engine.submitted()[0].name, expected);
    assert_eq!(h.engine.operation_counts().installs, 2);
}

#[tokio::test]
async fn test_redelivered_create_is_not_reinstalled() {
    let h = harness();

    let first = h.controller.handle_at(&request(Action::Create, model(), None), t0()).await;
    let redelivered = h.controller.handle_at(&request(Action::Create, model(), None), t0()).await;

    assert_eq!(first.status, OperationStatus::InProgress);
    assert_eq!(redelivered.status, OperationStatus::InProgress);
    assert_eq!(stage(&redelivered), Some("Pending"));
    assert_eq!(redelivered.resource_model.id, first.resource_model.id);
    assert_eq!(h.engine.operation_counts().installs, 1);

    let done = h
        .controller
        .handle_at(
            &request(Action::Create, model(), redelivered.callback_context),
            t0() + TimeDelta::minutes(1),
        )
        .await;
    assert_eq!(done.status, OperationStatus::Success);
}

#[tokio::test]
async fn test_namespace_defaults() {
    let h = harness();
    let mut m = model();
    m.namespace = None;

    let event = h.controller.handle_at(&request(Action::Create, m, None), t0()).await;
    assert_eq!(event.resource_model.namespace.as_deref(), Some("default"));
    assert_eq!(h.engine.submitted()[0].namespace, "default");
}

#[tokio::test]
async fn test_terminal_context_is_replayed() {
    let h = harness();
    let ctx = context(json!({"Stage": "Complete", "StartTime": "2024-06-01T12:00:00Z", "Name": "web"}));

    let event = h.controller.handle_at(&request(Action::Create, model(), ctx), t0()).await;
    assert_eq!(event.status, OperationStatus::Success);
    assert!(event.resource_model.id.is_some());

    let failed = context(json!({"Stage": "Failed"}));
    let event = h.controller.handle_at(&request(Action::Create, model(), failed), t0()).await;
    assert_eq!(event.status, OperationStatus::Failed);

    let counts = h.engine.operation_counts();
    assert_eq!(counts.installs + counts.status_checks, 0);
    assert!(h.clusters.connects().is_empty());
}

#[tokio::test]
async fn test_unknown_stage_is_rejected() {
    let h = harness();
    let ctx = context(json!({"Stage": "Stabilizing"}));

    let event = h.controller.handle_at(&request(Action::Create, model(), ctx), t0()).await;
    assert_eq!(event.status, OperationStatus::Failed);
    assert_eq!(event.error_code, Some(HandlerErrorCode::InvalidRequest));
    assert!(event.message.unwrap().contains("Stabilizing"));
}

#[tokio::test]
async fn test_both_cluster_targets_rejected() {
    let h = harness();
    let mut m = model();
    m.kube_config = Some("s3://configs/kubeconfig".into());

    let event = h.controller.handle_at(&request(Action::Create, m, None), t0()).await;
    assert_eq!(event.error_code, Some(HandlerErrorCode::InvalidRequest));
    assert_eq!(stage(&event), Some("Failed"));
    assert_eq!(h.engine.operation_counts().installs, 0);
}

#[tokio::test]
async fn test_local_chart_is_downloaded_first() {
    let store = MockObjectStore::new()
        .with_bucket("charts", "us-east-1")
        .with_object("charts", "nginx-1.2.3.tgz", b"archive".to_vec());
    let h = harness_with(MockChartEngine::new(), store);
    let mut m = model();
    m.chart = Some("s3://charts/nginx-1.2.3.tgz".into());

    let event = h.controller.handle_at(&request(Action::Create, m, None), t0()).await;
    assert_eq!(event.status, OperationStatus::InProgress);
    assert_eq!(std::fs::read(&h.settings.chart_cache_path).unwrap(), b"archive");

    let submitted = &h.engine.submitted()[0];
    assert!(submitted.chart.is_local());
    assert_eq!(submitted.chart.chart_name, "nginx");
    assert!(h.engine.repositories().is_empty());
}

#[tokio::test]
async fn test_override_document_merged_into_values() {
    let store = MockObjectStore::new()
        .with_bucket("cfg", "eu-west-1")
        .with_object("cfg", "prod.yaml", b"image:\n  tag: v2\n".to_vec());
    let h = harness_with(MockChartEngine::new(), store);
    let mut m = model();
    m.values = vec!["image.tag=v1,replicas=3".into()];
    m.value_override_url = Some("s3://cfg/prod.yaml".into());

    h.controller.handle_at(&request(Action::Create, m, None), t0()).await;

    let values = &h.engine.submitted()[0].values;
    assert_eq!(values.get("image.tag"), Some(&json!("v2")));
    assert_eq!(values.get("replicas"), Some(&json!(3)));
}

#[tokio::test]
async fn test_fetch_failure_keeps_context_for_retry() {
    let h = harness_with(
        MockChartEngine::new(),
        MockObjectStore::new().with_bucket("cfg", "eu-west-1"),
    );
    let mut m = model();
    m.value_override_url = Some("s3://cfg/missing.yaml".into());

    let event = h.controller.handle_at(&request(Action::Create, m, None), t0()).await;
    assert_eq!(event.status, OperationStatus::Failed);
    assert_eq!(event.error_code, Some(HandlerErrorCode::ServiceInternalError));
    let ctx = event.callback_context.unwrap();
    assert_eq!(ctx["Stage"], json!("Init"));
    assert_eq!(ctx["Name"], json!("web"));
    assert!(ctx.get("StartTime").is_none());
    assert_eq!(h.engine.operation_counts().installs, 0);
    assert_eq!(h.store.counts().downloads, 1);
}

#[tokio::test]
async fn test_engine_failure_reported() {
    let engine = MockChartEngine::new().with_progress(vec![ReleaseStatus::Failed(
        "context deadline exceeded".into(),
    )]);
    let h = harness_with(engine, MockObjectStore::new());

    let first = h.controller.handle_at(&request(Action::Create, model(), None), t0()).await;
    let second = h
        .controller
        .handle_at(
            &request(Action::Create, model(), first.callback_context),
            t0() + TimeDelta::minutes(1),
        )
        .await;
    assert_eq!(second.status, OperationStatus::Failed);
    assert_eq!(stage(&second), Some("Failed"));
    assert!(second.message.unwrap().contains("context deadline exceeded"));
}

#[tokio::test]
async fn test_update_uses_identifier() {
    let h = harness_with(
        MockChartEngine::new().with_release("apps", "web", vec![ReleaseStatus::Deployed]),
        MockObjectStore::new(),
    );
    let id = chartstage_core::encode_id(Some("prod"), None, "web", "apps", "eu-west-1").unwrap();
    let m = ResourceModel {
        id: Some(id.clone()),
        chart: Some("bitnami/nginx".into()),
        version: Some("15.1.0".into()),
        ..Default::default()
    };

    let event = h.controller.handle_at(&request(Action::Update, m, None), t0()).await;
    assert_eq!(event.status, OperationStatus::InProgress);
    assert_eq!(event.resource_model.id.as_deref(), Some(id.as_str()));

    let counts = h.engine.operation_counts();
    assert_eq!((counts.upgrades, counts.installs), (1, 0));
    let submitted = &h.engine.submitted()[0];
    assert_eq!(submitted.name, "web");
    assert_eq!(submitted.chart.chart_version.as_deref(), Some("15.1.0"));
}

#[tokio::test]
async fn test_delete_missing_release_succeeds() {
    let h = harness();
    let id = chartstage_core::encode_id(Some("prod"), None, "gone", "apps", "eu-west-1").unwrap();
    let m = ResourceModel {
        id: Some(id),
        ..Default::default()
    };

    let event = h.controller.handle_at(&request(Action::Delete, m, None), t0()).await;
    assert_eq!(event.status, OperationStatus::Success);
    assert_eq!(stage(&event), Some("Complete"));
    assert_eq!(h.engine.operation_counts().uninstalls, 0);
}

#[tokio::test]
async fn test_delete_waits_for_release_to_disappear() {
    let h = harness_with(
        MockChartEngine::new().with_release("apps", "web", vec![ReleaseStatus::Deployed]),
        MockObjectStore::new(),
    );
    let id = chartstage_core::encode_id(Some("prod"), None, "web", "apps", "eu-west-1").unwrap();
    let m = ResourceModel {
        id: Some(id),
        role_arn: Some("deployer".into()),
        ..Default::default()
    };

    let first = h.controller.handle_at(&request(Action::Delete, m.clone(), None), t0()).await;
    assert_eq!(first.status, OperationStatus::InProgress);
    assert_eq!(h.engine.operation_counts().uninstalls, 1);
    assert!(!h.engine.has_release("apps", "web"));

    let second = h
        .controller
        .handle_at(
            &request(Action::Delete, m, first.callback_context),
            t0() + TimeDelta::minutes(1),
        )
        .await;
    assert_eq!(second.status, OperationStatus::Success);
    assert_eq!(h.clusters.connects()[0].1.as_deref(), Some("deployer"));
}

#[tokio::test]
async fn test_cluster_access_failure_is_reported() {
    let engine = MockChartEngine::new();
    let dir = TempDir::new().unwrap();
    let settings = ProviderSettings {
        values_scratch_path: dir.path().join("values.yaml"),
        ..Default::default()
    };
    let controller = StageController::new(
        Arc::new(engine.clone()),
        Arc::new(MockClusterProvider::new(dir.path().join("kubeConfig")).failing("no such cluster")),
        SourceFetcher::new(HttpDownloader::new(None).unwrap(), Arc::new(MockObjectStore::new())),
        settings,
    );

    let event = controller.handle_at(&request(Action::Create, model(), None), t0()).await;
    assert_eq!(event.status, OperationStatus::Failed);
    assert!(event.message.unwrap().contains("no such cluster"));
    assert_eq!(engine.operation_counts().installs, 0);
}

/// Write an executable stand-in for `helm` that fails with `stderr`
#[cfg(unix)]
fn failing_helm(dir: &std::path::Path, stderr: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("helm");
    std::fs::write(&path, format!("#!/bin/sh\necho '{stderr}' >&2\nexit 1\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreachable_cluster_does_not_complete_delete() {
    let dir = TempDir::new().unwrap();
    let helm = failing_helm(
        dir.path(),
        "Error: Kubernetes cluster unreachable: getting credentials: exec: executable aws not found",
    );
    let controller = StageController::new(
        Arc::new(chartstage_kube::HelmCliEngine::new(helm)),
        Arc::new(MockClusterProvider::new(dir.path().join("kubeConfig"))),
        SourceFetcher::new(HttpDownloader::new(None).unwrap(), Arc::new(MockObjectStore::new())),
        ProviderSettings::default(),
    );
    let id = chartstage_core::encode_id(Some("prod"), None, "web", "apps", "eu-west-1").unwrap();
    let m = ResourceModel {
        id: Some(id),
        ..Default::default()
    };

    let event = controller.handle_at(&request(Action::Delete, m, None), t0()).await;
    assert_eq!(event.status, OperationStatus::Failed);
    assert_eq!(event.error_code, Some(HandlerErrorCode::GeneralServiceException));
    assert!(event.message.as_ref().unwrap().contains("executable aws not found"));
    assert_eq!(stage(&event), Some("Init"));
}
