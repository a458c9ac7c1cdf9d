use std::time::Duration;

pub mod finalizer;
pub mod messages;

mod error;
mod merge;

pub use error::*;
pub use merge::merge;

/// Name of the kubernetes resource finalizer field.
pub const FINALIZER_NAME: &str = "operator.tekton.dev/finalizer";

/// Name of the kubernetes resource manager.
pub const MANAGER_NAME: &str = "pipelines-operator";

/// Requeue delay while deployments or webhooks are not yet available.
pub const VALIDATE_INTERVAL: Duration = Duration::from_secs(15);

/// Requeue delay applied by the controller after a failed reconciliation.
pub const ERROR_REQUEUE_INTERVAL: Duration = Duration::from_secs(5);

/// Poll interval while waiting for a deleted resource to disappear.
pub const RECREATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on waiting for a deleted resource to disappear.
pub const RECREATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Annotation that keeps a document's declared namespace when set to "true".
pub const ANNOTATION_PRESERVE_NS: &str = "operator.tekton.dev/preserve-namespace";

/// Annotation that keeps the namespaces of a RoleBinding's subjects when set to "true".
pub const ANNOTATION_PRESERVE_RB_SUBJECT_NS: &str =
    "operator.tekton.dev/preserve-rb-subject-namespace";

/// Label recording who provides a catalog task.
pub const LABEL_PROVIDER_TYPE: &str = "operator.tekton.dev/provider-type";

/// Value of [`LABEL_PROVIDER_TYPE`] for community catalog tasks.
pub const PROVIDER_TYPE_COMMUNITY: &str = "community";

/// Name of the pipelines controller deployment.
pub const PIPELINE_CONTROLLER_NAME: &str = "tekton-pipelines-controller";

/// Name of the pipelines webhook deployment.
pub const PIPELINE_WEBHOOK_NAME: &str = "tekton-pipelines-webhook";

/// Name of the pipelines mutating webhook configuration.
pub const PIPELINE_WEBHOOK_CONFIGURATION: &str = "webhook.pipeline.tekton.dev";

/// Label on the pipelines controller deployment carrying its release.
pub const PIPELINE_RELEASE_LABEL: &str = "pipeline.tekton.dev/release";

/// Name of the triggers controller deployment.
pub const TRIGGERS_CONTROLLER_NAME: &str = "tekton-triggers-controller";

/// Name of the triggers webhook deployment.
pub const TRIGGERS_WEBHOOK_NAME: &str = "tekton-triggers-webhook";

/// Name of the triggers mutating webhook configuration.
pub const TRIGGERS_WEBHOOK_CONFIGURATION: &str = "webhook.triggers.tekton.dev";

/// Label on the triggers controller deployment carrying its release.
pub const TRIGGERS_RELEASE_LABEL: &str = "triggers.tekton.dev/release";

/// CRD whose presence enables the optional add-ons.
pub const CONSOLE_YAML_SAMPLE_CRD: &str = "consoleyamlsamples.console.openshift.io";

/// Annotation recording that the operator created a Namespace. Only
/// such namespaces are removed on teardown.
pub const ANNOTATION_CREATED: &str = "operator.tekton.dev/created";
