use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

mod ledger;

/// [`ConfigSpec`] is the configuration for the [`Config`] resource, the single
/// cluster-scoped object that requests installation of the pipelines engine,
/// the triggers add-on and the task catalogs. Only the object whose name matches
/// the operator's watched resource name (`cluster` by default) is honored.
#[derive(CustomResource, Serialize, Default, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "operator.tekton.dev",
    version = "v1alpha1",
    kind = "Config",
    plural = "config",
    derive = "PartialEq",
    status = "ConfigStatus"
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.targetNamespace\", \"name\": \"NAMESPACE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.conditions[0].code\", \"name\": \"STATUS\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.conditions[0].version\", \"name\": \"VERSION\", \"type\": \"string\" }"
)]
pub struct ConfigSpec {
    /// Namespace where the pipelines components will be installed.
    #[serde(rename = "targetNamespace")]
    pub target_namespace: String,

    /// Optional list of regular expressions. Namespaces matching any of
    /// them are skipped when provisioning the default service account.
    #[serde(rename = "namespaceExclusions")]
    pub namespace_exclusions: Option<Vec<String>>,
}

/// Status object for the [`Config`] resource.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ConfigStatus {
    /// Identifier of the operator installation that produced this status.
    /// A status written by an operator with a different identifier is
    /// considered stale and forces the installation to run again.
    #[serde(rename = "operatorUUID")]
    pub operator_uuid: Option<String>,

    /// Installation history sorted in reverse chronological order. The
    /// first entry is the current state of the installation.
    #[serde(default)]
    pub conditions: Vec<ConfigCondition>,
}

/// One observed outcome of an installation phase.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ConfigCondition {
    /// Outcome of the phase.
    pub code: InstallStatus,

    /// Additional details about the code. Only set for error codes.
    pub details: Option<String>,

    /// The target version this condition applies to.
    pub version: String,

    /// Release of the pipelines engine, as discovered from the
    /// controller deployment once it has been validated.
    #[serde(rename = "pipelineVersion")]
    pub pipeline_version: Option<String>,

    /// Release of the triggers add-on, as discovered from the
    /// controller deployment once it has been validated.
    #[serde(rename = "triggersVersion")]
    pub triggers_version: Option<String>,
}

/// The state of the installation recorded by a [`ConfigCondition`].
/// Each installation phase has a success code and an error code.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum InstallStatus {
    /// Nothing has been applied yet.
    #[serde(rename = "")]
    Empty,

    /// Applying the pipelines engine failed.
    #[serde(rename = "error-applying-pipeline")]
    PipelineApplyError,

    /// The pipelines engine manifests were applied.
    #[serde(rename = "applied-pipeline")]
    AppliedPipeline,

    /// Checking the pipelines engine rollout failed.
    #[serde(rename = "error-validating-pipeline")]
    PipelineValidateError,

    /// The pipelines engine deployments are available.
    #[serde(rename = "validated-pipeline")]
    ValidatedPipeline,

    /// Applying the triggers add-on failed.
    #[serde(rename = "error-applying-triggers")]
    TriggersError,

    /// The triggers add-on manifests were applied.
    #[serde(rename = "applied-triggers")]
    AppliedTriggers,

    /// Checking the triggers add-on rollout failed.
    #[serde(rename = "error-validating-triggers")]
    TriggersValidateError,

    /// The triggers add-on deployments are available.
    #[serde(rename = "validated-triggers")]
    ValidatedTriggers,

    /// Applying the task catalog add-ons failed.
    #[serde(rename = "error-applying-addons")]
    AddonsError,

    /// The task catalog add-ons were applied.
    #[serde(rename = "applied-addons")]
    AppliedAddons,

    /// Applying the externally sourced task catalog failed.
    #[serde(rename = "error-applying-community-resources")]
    CommunityResourcesError,

    /// Every component is installed for the recorded version.
    #[serde(rename = "installed")]
    Installed,

    /// The resource does not carry the name the operator honors.
    #[serde(rename = "invalid-resource")]
    InvalidResource,
}

impl Default for InstallStatus {
    fn default() -> Self {
        InstallStatus::Empty
    }
}

impl InstallStatus {
    /// Every code, in pipeline order.
    pub const ALL: [InstallStatus; 14] = [
        InstallStatus::Empty,
        InstallStatus::PipelineApplyError,
        InstallStatus::AppliedPipeline,
        InstallStatus::PipelineValidateError,
        InstallStatus::ValidatedPipeline,
        InstallStatus::TriggersError,
        InstallStatus::AppliedTriggers,
        InstallStatus::TriggersValidateError,
        InstallStatus::ValidatedTriggers,
        InstallStatus::AddonsError,
        InstallStatus::AppliedAddons,
        InstallStatus::CommunityResourcesError,
        InstallStatus::Installed,
        InstallStatus::InvalidResource,
    ];

    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStatus::Empty => "",
            InstallStatus::PipelineApplyError => "error-applying-pipeline",
            InstallStatus::AppliedPipeline => "applied-pipeline",
            InstallStatus::PipelineValidateError => "error-validating-pipeline",
            InstallStatus::ValidatedPipeline => "validated-pipeline",
            InstallStatus::TriggersError => "error-applying-triggers",
            InstallStatus::AppliedTriggers => "applied-triggers",
            InstallStatus::TriggersValidateError => "error-validating-triggers",
            InstallStatus::ValidatedTriggers => "validated-triggers",
            InstallStatus::AddonsError => "error-applying-addons",
            InstallStatus::AppliedAddons => "applied-addons",
            InstallStatus::CommunityResourcesError => "error-applying-community-resources",
            InstallStatus::Installed => "installed",
            InstallStatus::InvalidResource => "invalid-resource",
        }
    }

    /// Returns true for the codes that record a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            InstallStatus::PipelineApplyError
                | InstallStatus::PipelineValidateError
                | InstallStatus::TriggersError
                | InstallStatus::TriggersValidateError
                | InstallStatus::AddonsError
                | InstallStatus::CommunityResourcesError
                | InstallStatus::InvalidResource
        )
    }
}

impl FromStr for InstallStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstallStatus::ALL
            .iter()
            .find(|code| code.as_str() == s)
            .copied()
            .ok_or(())
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStatus::Empty => write!(f, "empty"),
            code => write!(f, "{}", code.as_str()),
        }
    }
}
