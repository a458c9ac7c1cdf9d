use kube::{
    api::{ObjectMeta, PropagationPolicy},
    runtime::controller::Action,
    ResourceExt,
};
use tokio::time::Duration;

use super::client::ConfigClient;
use super::components::{
    extra_transforms, needs_recreate, removal_manifest, Component, PIPELINE, TRIGGERS,
};
use super::phase::Phase;
use super::reconcile::ContextData;
use crate::settings::OperatorConfig;
use crate::transform::{transform_manifest, Transformer};
use crate::util::{
    messages, Error, RECREATE_POLL_INTERVAL, RECREATE_TIMEOUT, VALIDATE_INTERVAL,
};
use pipelines_types::*;

/// Builds the next condition. Component versions are carried over from
/// the current head so they survive until a validation replaces them.
pub fn new_condition(instance: &Config, code: InstallStatus, version: &str) -> ConfigCondition {
    let head = instance.current_condition();
    ConfigCondition {
        code,
        details: None,
        version: version.to_owned(),
        pipeline_version: head.and_then(|c| c.pipeline_version.clone()),
        triggers_version: head.and_then(|c| c.triggers_version.clone()),
    }
}

/// Prepends the condition to the status history, stamps the operator
/// identity and writes the status. Returns the refreshed resource.
pub async fn update_status(
    context: &ContextData,
    instance: &Config,
    condition: ConfigCondition,
) -> Result<Config, Error> {
    tracing::info!(
        name = %instance.name_any(),
        code = %condition.code,
        version = %condition.version,
        "Recording condition"
    );
    let modified = instance.with_condition(condition, &context.config.operator_uuid);
    context.configs.replace_status(&modified).await
}

/// Records that the resource does not carry the name the operator honors.
pub async fn mark_invalid(context: &ContextData, instance: &Config) -> Result<(), Error> {
    let condition = ConfigCondition {
        code: InstallStatus::InvalidResource,
        details: Some(format!(
            "{}{}",
            messages::INVALID_NAME,
            context.config.watch_resource
        )),
        version: messages::UNKNOWN_VERSION.to_owned(),
        ..Default::default()
    };
    update_status(context, instance, condition).await?;
    Ok(())
}

/// Records a completed installation of the target version.
pub async fn mark_installed(context: &ContextData, instance: &Config) -> Result<(), Error> {
    let condition = new_condition(instance, InstallStatus::Installed, &context.config.version);
    update_status(context, instance, condition).await?;
    Ok(())
}

/// Records the failure of a phase and returns it wrapped with the phase
/// name, so the controller's error policy schedules the retry.
async fn fail(context: &ContextData, instance: &Config, phase: Phase, error: Error) -> Error {
    tracing::error!(
        name = %instance.name_any(),
        phase = phase.name(),
        error = %error,
        "Phase failed"
    );
    #[cfg(feature = "metrics")]
    super::metrics::CONFIG_PHASE_FAILURE_COUNTER
        .with_label_values(&[phase.name()])
        .inc();
    let mut condition = new_condition(instance, phase.error_code(), &context.config.version);
    condition.details = Some(error.to_string());
    if let Err(e) = update_status(context, instance, condition).await {
        tracing::warn!(error = %e, "failed to record phase failure");
    }
    error.in_phase(phase.name())
}

/// Runs one installation phase. Apply phases write the phase's transformed
/// manifest. Validation phases wait for the component's deployments and
/// webhook, polling again later while they are not ready.
///
/// # Arguments
/// - `context`: The controller context holding the manifests and the cluster capabilities.
/// - `instance`: The `Config` being installed. Its status receives the outcome.
/// - `phase`: The phase chosen from the head of the status history.
pub async fn run_phase(
    context: &ContextData,
    instance: &Config,
    phase: Phase,
) -> Result<Action, Error> {
    match phase {
        Phase::ValidatePipeline => validate(context, instance, phase, &PIPELINE).await,
        Phase::ValidateTriggers => validate(context, instance, phase, &TRIGGERS).await,
        _ => apply(context, instance, phase).await,
    }
}

/// Transforms the phase's manifest for the instance and applies it.
/// Deployments and Services are applied after everything else and
/// recreated if the cluster rejects the update.
async fn apply_manifest(
    context: &ContextData,
    instance: &Config,
    phase: Phase,
) -> Result<(), Error> {
    let extras = extra_transforms(phase);
    let extras: Vec<&dyn Transformer> = extras.iter().map(|t| t.as_ref()).collect();
    let manifest = transform_manifest(
        context.manifests.for_phase(phase),
        instance,
        &context.config,
        &extras,
    )?;
    let client = context.resources.as_ref();
    manifest
        .filter(|doc| !needs_recreate(doc))
        .apply(client)
        .await?;
    manifest
        .filter(needs_recreate)
        .apply_or_recreate(client, RECREATE_POLL_INTERVAL, RECREATE_TIMEOUT)
        .await
}

async fn apply(context: &ContextData, instance: &Config, phase: Phase) -> Result<Action, Error> {
    if let Err(e) = apply_manifest(context, instance, phase).await {
        return Err(fail(context, instance, phase, e).await);
    }
    tracing::info!(name = %instance.name_any(), phase = phase.name(), "Applied resources");
    let code = context.plan.success_code(phase);
    let condition = new_condition(instance, code, &context.config.version);
    update_status(context, instance, condition).await?;
    Ok(Action::requeue(Duration::ZERO))
}

/// Returns true once the component's deployments are rolled out and its
/// webhook is registered.
async fn component_ready(
    context: &ContextData,
    namespace: &str,
    component: &Component,
) -> Result<bool, Error> {
    for deployment in [component.controller, component.webhook].iter() {
        if !context
            .validator
            .deployment_ready(deployment, namespace)
            .await?
        {
            tracing::debug!(deployment, namespace, "Deployment not yet ready");
            return Ok(false);
        }
    }
    let exists = context
        .validator
        .webhook_exists(component.webhook_configuration)
        .await?;
    if !exists {
        tracing::debug!(
            webhook = component.webhook_configuration,
            "Webhook not yet registered"
        );
    }
    Ok(exists)
}

async fn validate(
    context: &ContextData,
    instance: &Config,
    phase: Phase,
    component: &Component,
) -> Result<Action, Error> {
    let namespace = instance.spec.target_namespace.as_str();
    let ready = match component_ready(context, namespace, component).await {
        Ok(ready) => ready,
        Err(e) => return Err(fail(context, instance, phase, e).await),
    };
    if !ready {
        // Not a failure. Poll again later without touching the history.
        return Ok(Action::requeue(VALIDATE_INTERVAL));
    }
    let code = context.plan.success_code(phase);
    let mut condition = new_condition(instance, code, &context.config.version);
    let release = component.release(context.manifests.for_phase(phase));
    match phase {
        Phase::ValidateTriggers => condition.triggers_version = release.or(condition.triggers_version),
        _ => condition.pipeline_version = release.or(condition.pipeline_version),
    }
    update_status(context, instance, condition).await?;
    Ok(Action::requeue(Duration::ZERO))
}

/// Removes every installed component in reverse dependency order:
/// add-ons, community tasks, triggers and finally the pipelines engine.
/// Objects that are already gone are skipped, so an interrupted teardown
/// can simply run again.
///
/// # Arguments
/// - `context`: The controller context holding the manifests and the cluster capabilities.
/// - `namespace`: The namespace the components were installed into.
pub async fn teardown(context: &ContextData, namespace: &str) -> Result<(), Error> {
    let client = context.resources.as_ref();
    for phase in [
        Phase::ApplyAddons,
        Phase::ApplyCommunity,
        Phase::ApplyTriggers,
        Phase::ApplyPipeline,
    ]
    .iter()
    {
        tracing::info!(phase = phase.name(), "Deleting resources");
        let manifest = removal_manifest(context.manifests.for_phase(*phase), *phase, namespace)?;
        manifest.delete(client, PropagationPolicy::Foreground).await?;
    }
    Ok(())
}

/// Creates the watched resource unless it already exists.
pub async fn create_config(
    configs: &dyn ConfigClient,
    config: &OperatorConfig,
) -> Result<(), Error> {
    let instance = Config {
        metadata: ObjectMeta {
            name: Some(config.watch_resource.clone()),
            ..Default::default()
        },
        spec: ConfigSpec {
            target_namespace: config.target_namespace.clone(),
            ..Default::default()
        },
        status: None,
    };
    match configs.create(&instance).await {
        Ok(_) => {
            tracing::info!(name = %config.watch_resource, "Created Config");
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e),
    }
}
