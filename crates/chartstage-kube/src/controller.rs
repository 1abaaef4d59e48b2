//! Stage controller
//!
//! Runs one step of a create, update or delete operation per poll. All
//! state that must survive between polls travels in the callback context
//! (stage, start time, release name) or in the opaque identifier; everything
//! else is derived again from the request.
//!
//! ```text
//! Init ──submit──▶ Pending ──engine running──▶ InProgress
//!   │                 │                            │
//!   │                 └──────────┬─────────────────┘
//!   ▼                            ▼
//! Complete / Failed ◀── engine done, engine failed, or deadline reached
//! ```

use chartstage_core::{
    CallbackContext, ChartDescriptor, ChartResolver, ClusterTarget, CoreError, DEFAULT_NAMESPACE,
    Identifier, ProviderSettings, Stage, TimeoutPolicy,
};
use chartstage_fetch::{SourceFetcher, build_override_values};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

use crate::cluster::{ClusterHandle, ClusterProvider};
use crate::engine::{ChartEngine, ReleaseSpec, ReleaseStatus};
use crate::handler::{Action, InvocationRequest, ProgressEvent, ResourceModel};

/// Where a release lives, fixed for the lifetime of the resource
struct Located {
    identifier: Identifier,
    id: String,
}

/// Result of a step that did not error out
enum Step {
    /// Poll again later with this context
    Continue(CallbackContext),
    /// The operation finished
    Done(CallbackContext),
    /// The engine reported a definitive failure
    Rejected(CallbackContext, CoreError),
}

/// Drives lifecycle operations one poll at a time
pub struct StageController {
    engine: Arc<dyn ChartEngine>,
    clusters: Arc<dyn ClusterProvider>,
    fetcher: SourceFetcher,
    resolver: ChartResolver,
    settings: ProviderSettings,
}

impl StageController {
    pub fn new(
        engine: Arc<dyn ChartEngine>,
        clusters: Arc<dyn ClusterProvider>,
        fetcher: SourceFetcher,
        settings: ProviderSettings,
    ) -> Self {
        Self {
            engine,
            clusters,
            fetcher,
            resolver: ChartResolver::from_settings(&settings),
            settings,
        }
    }

    /// Handle one poll at the current time
    pub async fn handle(&self, request: &InvocationRequest) -> ProgressEvent {
        self.handle_at(request, Utc::now()).await
    }

    /// Handle one poll as if the current time were `now`.
    ///
    /// Never fails: every error becomes a `FAILED` event.
    pub async fn handle_at(&self, request: &InvocationRequest, now: DateTime<Utc>) -> ProgressEvent {
        let mut model = request
            .desired_resource_state
            .clone()
            .or_else(|| request.previous_resource_state.clone())
            .unwrap_or_default();

        let context = match CallbackContext::from_map(request.callback_context.as_ref()) {
            Ok(context) => context,
            Err(err) => {
                tracing::error!(error = %err, "cannot decode callback context");
                return ProgressEvent::failed(model, request.callback_context.clone(), &err);
            }
        };
        tracing::info!(action = request.action.as_str(), stage = %context.stage, "handling poll");

        if context.stage.is_terminal() {
            return self.replay(request, model, &context, now);
        }

        let located = match self.locate(request, &model, &context, now) {
            Ok(located) => located,
            Err(err) => return self.fail(request, model, &context, err, now),
        };
        apply_location(&mut model, &located);
        let context = CallbackContext {
            name: Some(located.identifier.name.clone()),
            ..context
        };

        match self.step(request.action, &model, &located, context.clone(), now).await {
            Ok(Step::Continue(next)) => {
                tracing::info!(stage = %next.stage, release = %located.identifier.name, "operation in progress");
                ProgressEvent::in_progress(model, next.to_map(), self.settings.callback_delay_seconds)
            }
            Ok(Step::Done(next)) => {
                tracing::info!(release = %located.identifier.name, "operation complete");
                ProgressEvent::success(model, next.to_map())
            }
            Ok(Step::Rejected(terminal, err)) => {
                tracing::error!(error = %err, "operation failed");
                ProgressEvent::failed(model, Some(terminal.to_map()), &err)
            }
            Err(err) => self.fail(request, model, &context, err, now),
        }
    }

    /// Report an error. Retryable errors keep the incoming context, plus the
    /// release name, so the next poll repeats the step; anything else pins
    /// the context to `Failed`.
    fn fail(
        &self,
        request: &InvocationRequest,
        model: ResourceModel,
        context: &CallbackContext,
        err: CoreError,
        now: DateTime<Utc>,
    ) -> ProgressEvent {
        tracing::error!(error = %err, retryable = err.is_retryable(), "poll failed");
        let context = if err.is_retryable() {
            retry_context(request, context)
        } else {
            context.advance(Stage::Failed, now).ok().map(|c| c.to_map())
        };
        ProgressEvent::failed(model, context, &err)
    }

    /// A context that is already terminal reports the same outcome again
    fn replay(
        &self,
        request: &InvocationRequest,
        mut model: ResourceModel,
        context: &CallbackContext,
        now: DateTime<Utc>,
    ) -> ProgressEvent {
        tracing::info!(stage = %context.stage, "replaying terminal stage");
        if let Ok(located) = self.locate(request, &model, context, now) {
            apply_location(&mut model, &located);
        }
        match context.stage {
            Stage::Complete => ProgressEvent::success(model, context.to_map()),
            _ => ProgressEvent::failed(
                model,
                Some(context.to_map()),
                &CoreError::External {
                    operation: request.action.as_str().to_string(),
                    message: "operation already failed".to_string(),
                },
            ),
        }
    }

    /// Work out the release coordinates: from the identifier when the model
    /// carries one, else from the model fields.
    fn locate(
        &self,
        request: &InvocationRequest,
        model: &ResourceModel,
        context: &CallbackContext,
        now: DateTime<Utc>,
    ) -> chartstage_core::Result<Located> {
        if let Some(id) = model.id.as_deref().filter(|id| !id.is_empty()) {
            let identifier = Identifier::decode(id)?;
            return Ok(Located {
                identifier,
                id: id.to_string(),
            });
        }

        let target = ClusterTarget::from_parts(model.cluster_id.as_deref(), model.kube_config.as_deref())?;
        let namespace = model
            .namespace
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let name = match model.name.clone().filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => match &context.name {
                Some(name) => name.clone(),
                None => {
                    let chart = self.resolve_chart(model)?;
                    format!("{}-{}", chart.chart_name, now.timestamp())
                }
            },
        };

        let identifier = Identifier::new(target, name, namespace, request.region.clone())?;
        let id = identifier.encode()?;
        Ok(Located { identifier, id })
    }

    async fn step(
        &self,
        action: Action,
        model: &ResourceModel,
        located: &Located,
        context: CallbackContext,
        now: DateTime<Utc>,
    ) -> chartstage_core::Result<Step> {
        let policy = TimeoutPolicy::new(model.time_out, self.settings.default_timeout_minutes);
        if let Some(start) = &context.start_time {
            policy.check(start, now)?;
        }

        let cluster = self.connect(model, &located.identifier.target).await?;

        match (context.stage, action) {
            (Stage::Init, Action::Delete) => self.begin_delete(located, &cluster, context, now).await,
            (Stage::Init, _) => self.begin_release(action, model, located, &cluster, context, now).await,
            _ => self.observe(action, located, &cluster, context, now).await,
        }
    }

    async fn begin_release(
        &self,
        action: Action,
        model: &ResourceModel,
        located: &Located,
        cluster: &ClusterHandle,
        context: CallbackContext,
        now: DateTime<Utc>,
    ) -> chartstage_core::Result<Step> {
        let Identifier { name, namespace, .. } = &located.identifier;
        if action == Action::Create
            && self.release_status(name, namespace, cluster).await? != ReleaseStatus::NotFound
        {
            tracing::info!(release = %name, %namespace, "release already submitted");
            return Ok(Step::Continue(context.advance(Stage::Pending, now)?));
        }

        let chart = self.resolve_chart(model)?;
        let values = build_override_values(
            &self.fetcher,
            &model.values,
            model.value_override_url.as_deref(),
            &self.settings.values_scratch_path,
        )
        .await?;
        self.prepare_chart(&chart).await?;

        let release = ReleaseSpec {
            name: located.identifier.name.clone(),
            namespace: located.identifier.namespace.clone(),
            chart,
            values,
        };
        match action {
            Action::Update => self
                .engine
                .upgrade(&release, cluster)
                .await
                .map_err(|e| e.into_core("Upgrading release"))?,
            _ => self
                .engine
                .install(&release, cluster)
                .await
                .map_err(|e| e.into_core("Installing release"))?,
        }

        Ok(Step::Continue(context.advance(Stage::Pending, now)?))
    }

    async fn begin_delete(
        &self,
        located: &Located,
        cluster: &ClusterHandle,
        context: CallbackContext,
        now: DateTime<Utc>,
    ) -> chartstage_core::Result<Step> {
        let Identifier { name, namespace, .. } = &located.identifier;
        if self.release_status(name, namespace, cluster).await? == ReleaseStatus::NotFound {
            tracing::info!(release = %name, %namespace, "release already absent");
            return Ok(Step::Done(context.advance(Stage::Complete, now)?));
        }

        match self.engine.uninstall(name, namespace, cluster).await {
            Ok(()) => Ok(Step::Continue(context.advance(Stage::Pending, now)?)),
            Err(err) if err.is_not_found() => Ok(Step::Done(context.advance(Stage::Complete, now)?)),
            Err(err) => Err(err.into_core("Uninstalling release")),
        }
    }

    async fn observe(
        &self,
        action: Action,
        located: &Located,
        cluster: &ClusterHandle,
        context: CallbackContext,
        now: DateTime<Utc>,
    ) -> chartstage_core::Result<Step> {
        let Identifier { name, namespace, .. } = &located.identifier;
        let status = self.release_status(name, namespace, cluster).await?;
        tracing::debug!(release = %name, ?status, "engine status");

        let step = match (action, status) {
            (Action::Delete, ReleaseStatus::NotFound) => Step::Done(context.advance(Stage::Complete, now)?),
            (Action::Delete, ReleaseStatus::Failed(message)) => Step::Rejected(
                context.advance(Stage::Failed, now)?,
                CoreError::External {
                    operation: "Uninstalling release".to_string(),
                    message,
                },
            ),
            (Action::Delete, _) => Step::Continue(context.advance(Stage::InProgress, now)?),
            (_, ReleaseStatus::Deployed) => Step::Done(context.advance(Stage::Complete, now)?),
            (_, ReleaseStatus::Running(_)) => Step::Continue(context.advance(Stage::InProgress, now)?),
            (_, ReleaseStatus::Failed(message)) => Step::Rejected(
                context.advance(Stage::Failed, now)?,
                CoreError::External {
                    operation: match action {
                        Action::Update => "Upgrading release",
                        _ => "Installing release",
                    }
                    .to_string(),
                    message,
                },
            ),
            (_, ReleaseStatus::NotFound) => Step::Rejected(
                context.advance(Stage::Failed, now)?,
                CoreError::External {
                    operation: "Checking release status".to_string(),
                    message: format!("release {name} not found in namespace {namespace}"),
                },
            ),
        };
        Ok(step)
    }

    fn resolve_chart(&self, model: &ResourceModel) -> chartstage_core::Result<ChartDescriptor> {
        self.resolver.resolve(
            model.chart.as_deref(),
            model.version.as_deref(),
            model.repository.as_deref(),
        )
    }

    /// Download a Local archive, or register the repository of a Remote chart
    async fn prepare_chart(&self, chart: &ChartDescriptor) -> chartstage_core::Result<()> {
        match (&chart.source_url, &chart.chart_path, &chart.chart_repo) {
            (Some(source), Some(path), _) => {
                self.fetcher.fetch(source, path).await?;
            }
            (_, _, Some(alias)) => {
                self.engine
                    .ensure_repository(alias, &chart.chart_repo_url)
                    .await
                    .map_err(|e| e.into_core("Adding repository"))?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn connect(
        &self,
        model: &ResourceModel,
        target: &ClusterTarget,
    ) -> chartstage_core::Result<ClusterHandle> {
        self.clusters
            .connect(
                target,
                model.role_arn.as_deref(),
                model.kube_config_content.as_deref(),
            )
            .await
            .map_err(|e| e.into_core("Getting cluster access"))
    }

    async fn release_status(
        &self,
        name: &str,
        namespace: &str,
        cluster: &ClusterHandle,
    ) -> chartstage_core::Result<ReleaseStatus> {
        self.engine
            .status(name, namespace, cluster)
            .await
            .map_err(|e| e.into_core("Checking release status"))
    }
}

/// Context returned with a retryable failure: the incoming one, plus the
/// release name so a generated name survives until the next poll
fn retry_context(
    request: &InvocationRequest,
    context: &CallbackContext,
) -> Option<Map<String, JsonValue>> {
    let Some(name) = &context.name else {
        return request.callback_context.clone();
    };
    let mut map = request
        .callback_context
        .clone()
        .unwrap_or_else(|| context.to_map());
    map.insert("Name".to_string(), JsonValue::String(name.clone()));
    Some(map)
}

fn apply_location(model: &mut ResourceModel, located: &Located) {
    model.id = Some(located.id.clone());
    model.name = Some(located.identifier.name.clone());
    model.namespace = Some(located.identifier.namespace.clone());
}
