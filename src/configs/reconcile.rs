use futures::stream::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::ListParams, client::Client, runtime::controller::Action, runtime::Controller, Api,
    Resource, ResourceExt,
};
use std::sync::Arc;
use tokio::time::Duration;

#[cfg(feature = "metrics")]
use super::metrics::{
    CONFIG_ACTION_COUNTER, CONFIG_READ_HISTOGRAM, CONFIG_RECONCILE_COUNTER, CONFIG_WRITE_HISTOGRAM,
};

use super::actions;
use super::client::{ConfigClient, KubeConfigClient};
use super::components::Manifests;
use super::phase::{dispatch, Dispatch, InstallPlan, Phase};
use crate::manifest::{KubeManifestClient, ManifestClient};
use crate::settings::OperatorConfig;
use crate::util::{Error, ERROR_REQUEUE_INTERVAL, FINALIZER_NAME};
use crate::validate::{KubeValidator, Validator};
use pipelines_types::*;

/// Entrypoint for the `Config` controller. Loads every component manifest,
/// creates the watched resource when auto-install is enabled and then
/// reconciles `Config` resources until the watch stream ends.
///
/// # Arguments:
/// - `client`: A Kubernetes client to make Kubernetes REST API requests with. Every
/// request the controller makes goes through this client.
/// - `config`: The resolved operator configuration. It is shared read-only with
/// every reconciliation.
pub async fn run(client: Client, config: OperatorConfig) -> Result<(), Error> {
    tracing::info!(
        watch_resource = %config.watch_resource,
        version = %config.version,
        "Starting Config controller..."
    );

    let configs: Arc<dyn ConfigClient> = Arc::new(KubeConfigClient::new(client.clone()));
    let resources: Arc<dyn ManifestClient> = Arc::new(KubeManifestClient::new(client.clone()));
    let validator: Arc<dyn Validator> = Arc::new(KubeValidator::new(client.clone()));

    let manifests = Manifests::load(&config, validator.as_ref()).await?;

    if config.auto_install {
        actions::create_config(configs.as_ref(), &config).await?;
    }

    let context = Arc::new(ContextData::new(
        config, manifests, configs, resources, validator,
    ));

    // Events on the owned Deployments re-trigger the owning Config, which
    // keeps the validate phases responsive to rollouts.
    Controller::new(Api::<Config>::all(client.clone()), ListParams::default())
        .owns(Api::<Deployment>::all(client), ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|reconciliation_result| async move {
            if let Err(e) = reconciliation_result {
                tracing::debug!(error = %e, "Reconciliation failed");
            }
        })
        .await;
    Ok(())
}

/// Context injected with each `reconcile` and `on_error` method invocation.
pub struct ContextData {
    /// Resolved command line configuration.
    pub config: OperatorConfig,

    /// Manifest groups, loaded once at startup.
    pub manifests: Manifests,

    /// Phases to run, derived from the loaded manifests and the configuration.
    pub plan: InstallPlan,

    pub configs: Arc<dyn ConfigClient>,

    pub resources: Arc<dyn ManifestClient>,

    pub validator: Arc<dyn Validator>,
}

impl ContextData {
    pub fn new(
        config: OperatorConfig,
        manifests: Manifests,
        configs: Arc<dyn ConfigClient>,
        resources: Arc<dyn ManifestClient>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        let plan = manifests.plan(&config);
        ContextData {
            config,
            manifests,
            plan,
            configs,
            resources,
            validator,
        }
    }
}

/// Action to be taken upon a `Config` resource during reconciliation
#[derive(Debug, PartialEq)]
pub enum ConfigAction {
    /// The resource does not carry the watched name. Record the
    /// InvalidResource condition.
    MarkInvalid,

    /// Adds the finalizer to the `Config` resource.
    AddFinalizer,

    /// The resource is being deleted. Remove every installed
    /// component, then the finalizer.
    Delete,

    /// The resource is gone. Remove every installed component.
    Teardown,

    /// Run the given installation phase.
    Run(Phase),

    /// Every planned phase is done. Record the Installed condition.
    MarkInstalled,

    /// The resource is in desired state and requires no actions to be taken.
    NoOp,
}

impl ConfigAction {
    fn to_str(&self) -> &str {
        match self {
            ConfigAction::MarkInvalid => "MarkInvalid",
            ConfigAction::AddFinalizer => "AddFinalizer",
            ConfigAction::Delete => "Delete",
            ConfigAction::Teardown => "Teardown",
            ConfigAction::Run(phase) => phase.name(),
            ConfigAction::MarkInstalled => "MarkInstalled",
            ConfigAction::NoOp => "NoOp",
        }
    }
}

/// Returns true if the `Config` is missing the finalizer.
fn needs_finalizer(instance: &Config) -> bool {
    !instance.finalizers().iter().any(|f| f == FINALIZER_NAME)
}

/// Maps the head of the status history to the phase that runs next.
/// A fully installed resource only runs again when the target version or
/// the operator identity changed.
fn next_phase(config: &OperatorConfig, plan: &InstallPlan, instance: &Config) -> ConfigAction {
    let phase = match dispatch(instance.install_status()) {
        Dispatch::Run(phase) => phase,
        Dispatch::SteadyState => {
            if instance.is_up_to_date(&config.version, &config.operator_uuid) {
                return ConfigAction::NoOp;
            }
            Phase::ApplyPipeline
        }
    };
    match plan.resolve(phase) {
        Some(phase) => ConfigAction::Run(phase),
        None => ConfigAction::MarkInstalled,
    }
}

/// Resources arrive into the reconciliation queue in a certain state. This
/// function looks at the freshly fetched state of the `Config` named `name`
/// and decides which action needs to be performed. The finite set of possible
/// actions is represented by the `ConfigAction` enum.
///
/// # Arguments
/// - `config`: The operator configuration holding the honored resource name,
/// the target version and the operator identity.
/// - `plan`: Which optional phases this installation runs.
/// - `name`: Name of the `Config` that triggered the reconciliation.
/// - `instance`: The `Config` as currently stored, or `None` if it is gone.
pub fn determine_action(
    config: &OperatorConfig,
    plan: &InstallPlan,
    name: &str,
    instance: Option<&Config>,
) -> ConfigAction {
    if name != config.watch_resource {
        // Only report misconfiguration once. A deleted resource
        // with the wrong name needs nothing.
        return match instance {
            Some(instance) if instance.install_status() != InstallStatus::InvalidResource => {
                ConfigAction::MarkInvalid
            }
            _ => ConfigAction::NoOp,
        };
    }

    let instance = match instance {
        Some(instance) => instance,
        None => return ConfigAction::Teardown,
    };

    if instance.meta().deletion_timestamp.is_some() {
        if needs_finalizer(instance) {
            // Someone else is holding the resource. Nothing left for us.
            return ConfigAction::NoOp;
        }
        return ConfigAction::Delete;
    }

    // The finalizer guarantees the teardown runs before the resource
    // is garbage collected.
    if needs_finalizer(instance) {
        return ConfigAction::AddFinalizer;
    }

    next_phase(config, plan, instance)
}

/// Reconciliation function for the `Config` resource. Each invocation performs at
/// most one step of the installation and records it in the status history, so
/// the controller drives the whole install one pass at a time.
///
/// # Arguments
/// - `instance`: The `Config` that triggered the reconciliation. It is re-read
/// from the cluster before deciding anything, as the cached copy may be stale.
/// - `context`: Context data "injected" automatically by kube-rs.
pub async fn reconcile(instance: Arc<Config>, context: Arc<ContextData>) -> Result<Action, Error> {
    let name = instance.name_any();

    #[cfg(feature = "metrics")]
    CONFIG_RECONCILE_COUNTER.with_label_values(&[&name]).inc();

    // Benchmark the read phase of reconciliation.
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    // The cached object may lag behind the status written by the previous
    // pass, so the ledger is always read from the cluster.
    let instance = context.configs.get(&name).await?;

    // Read phase of reconciliation determines goal during the write phase.
    let action = determine_action(&context.config, &context.plan, &name, instance.as_ref());

    if action != ConfigAction::NoOp {
        tracing::info!(name = %name, action = action.to_str(), "Reconciling Config");
    }

    #[cfg(feature = "metrics")]
    {
        CONFIG_READ_HISTOGRAM
            .with_label_values(&[&name, action.to_str()])
            .observe(start.elapsed().as_secs_f64());
        CONFIG_ACTION_COUNTER
            .with_label_values(&[&name, action.to_str()])
            .inc();
    }

    // Benchmark the write phase of reconciliation.
    #[cfg(feature = "metrics")]
    let timer = match action {
        ConfigAction::NoOp => None,
        _ => Some(
            CONFIG_WRITE_HISTOGRAM
                .with_label_values(&[&name, action.to_str()])
                .start_timer(),
        ),
    };

    // Performs action as decided by the `determine_action` function.
    // This is the write phase of reconciliation.
    let result = match (action, instance) {
        (ConfigAction::MarkInvalid, Some(instance)) => {
            actions::mark_invalid(&context, &instance).await?;
            Action::await_change()
        }
        (ConfigAction::AddFinalizer, _) => {
            context.configs.add_finalizer(&name).await?;

            // Requeue immediately.
            Action::requeue(Duration::ZERO)
        }
        (ConfigAction::Delete, Some(instance)) => {
            actions::teardown(&context, &instance.spec.target_namespace).await?;

            // Remove the finalizer, which will allow the resource to be deleted.
            context.configs.remove_finalizer(&name).await?;

            // Makes no sense to requeue after deleting, as the resource is gone.
            Action::await_change()
        }
        (ConfigAction::Teardown, _) => {
            actions::teardown(&context, &context.config.target_namespace).await?;
            Action::await_change()
        }
        (ConfigAction::Run(phase), Some(instance)) => {
            actions::run_phase(&context, &instance, phase).await?
        }
        (ConfigAction::MarkInstalled, Some(instance)) => {
            actions::mark_installed(&context, &instance).await?;
            Action::await_change()
        }
        // The resource is already in desired state.
        _ => Action::await_change(),
    };

    #[cfg(feature = "metrics")]
    if let Some(timer) = timer {
        timer.observe_duration();
    }

    Ok(result)
}

/// Actions to be taken when a reconciliation fails - for whatever reason.
/// Logs the error and requeues the resource for another reconciliation after
/// five seconds.
pub fn on_error(instance: Arc<Config>, error: &Error, _context: Arc<ContextData>) -> Action {
    tracing::error!(name = %instance.name_any(), error = %error, "Reconciliation error");
    Action::requeue(ERROR_REQUEUE_INTERVAL)
}
