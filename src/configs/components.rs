use std::path::Path;

use crate::manifest::{Document, Manifest, Source};
use crate::settings::OperatorConfig;
use crate::transform::{
    images_from_env, DeploymentImages, InjectLabel, InjectNamespaceConditional, OverwritePolicy,
    ReplaceKind, TaskImages, Transformer, ADDONS_IMAGE_PREFIX, PIPELINES_IMAGE_PREFIX,
    TRIGGERS_IMAGE_PREFIX,
};
use crate::util::*;
use crate::validate::Validator;

use super::phase::{InstallPlan, Phase};

/// Workloads and metadata checked when validating a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub controller: &'static str,
    pub webhook: &'static str,
    pub webhook_configuration: &'static str,
    pub release_label: &'static str,
}

pub const PIPELINE: Component = Component {
    controller: PIPELINE_CONTROLLER_NAME,
    webhook: PIPELINE_WEBHOOK_NAME,
    webhook_configuration: PIPELINE_WEBHOOK_CONFIGURATION,
    release_label: PIPELINE_RELEASE_LABEL,
};

pub const TRIGGERS: Component = Component {
    controller: TRIGGERS_CONTROLLER_NAME,
    webhook: TRIGGERS_WEBHOOK_NAME,
    webhook_configuration: TRIGGERS_WEBHOOK_CONFIGURATION,
    release_label: TRIGGERS_RELEASE_LABEL,
};

impl Component {
    /// Release recorded in the labels of the controller deployment.
    pub fn release(&self, manifest: &Manifest) -> Option<String> {
        manifest
            .find_deployment(self.controller)
            .and_then(|d| d.label(self.release_label))
            .map(str::to_owned)
    }
}

/// The manifest groups installed by the operator, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifests {
    pub pipeline: Manifest,
    pub triggers: Manifest,
    pub addons: Manifest,
    pub community: Manifest,
}

async fn load_dir(path: &Path, recursive: bool) -> Result<Manifest, Error> {
    Manifest::load(&Source::Path {
        path: path.to_path_buf(),
        recursive,
    })
    .await
}

impl Manifests {
    /// Loads every group from the resource directory. Triggers are
    /// optional, the `optional` add-ons are only included when the
    /// console is installed, and a failure to fetch the community
    /// catalog leaves that group empty.
    pub async fn load(config: &OperatorConfig, validator: &dyn Validator) -> Result<Self, Error> {
        let pipeline = load_dir(&config.component_dir("pipelines"), config.recursive).await?;

        let triggers_dir = config.component_dir("triggers");
        let triggers = if triggers_dir.exists() {
            load_dir(&triggers_dir, config.recursive).await?
        } else {
            tracing::info!("No triggers manifests in {}", triggers_dir.display());
            Manifest::default()
        };

        let mut addons = load_dir(&config.component_dir("addons"), config.recursive).await?;
        if validator.crd_installed(CONSOLE_YAML_SAMPLE_CRD).await? {
            let optional = load_dir(&config.component_dir("optional"), config.recursive).await?;
            addons = addons.append(optional);
        }

        let community = if config.skip_non_redhat {
            Manifest::default()
        } else {
            let source = Source::Locations(config.community_resource_urls.clone());
            match Manifest::load(&source).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch community resources");
                    Manifest::default()
                }
            }
        };

        tracing::info!(
            pipeline = pipeline.len(),
            triggers = triggers.len(),
            addons = addons.len(),
            community = community.len(),
            "Loaded manifests"
        );
        Ok(Manifests {
            pipeline,
            triggers,
            addons,
            community,
        })
    }

    /// The phases to run for these manifests.
    pub fn plan(&self, config: &OperatorConfig) -> InstallPlan {
        InstallPlan::new(!self.triggers.is_empty(), !config.skip_non_redhat)
    }

    /// Manifest applied or validated by the phase.
    pub fn for_phase(&self, phase: Phase) -> &Manifest {
        match phase {
            Phase::ApplyPipeline | Phase::ValidatePipeline => &self.pipeline,
            Phase::ApplyTriggers | Phase::ValidateTriggers => &self.triggers,
            Phase::ApplyAddons => &self.addons,
            Phase::ApplyCommunity => &self.community,
        }
    }
}

/// Transforms specific to the component installed by an apply phase.
/// Image overrides are read from the environment on every call.
pub fn extra_transforms(phase: Phase) -> Vec<Box<dyn Transformer>> {
    let provider_type = |kinds: &[&str]| {
        InjectLabel::new(
            LABEL_PROVIDER_TYPE,
            PROVIDER_TYPE_COMMUNITY,
            OverwritePolicy::Overwrite,
            kinds,
        )
    };
    match phase {
        Phase::ApplyPipeline => vec![Box::new(DeploymentImages(images_from_env(
            PIPELINES_IMAGE_PREFIX,
        )))],
        Phase::ApplyTriggers => vec![Box::new(DeploymentImages(images_from_env(
            TRIGGERS_IMAGE_PREFIX,
        )))],
        Phase::ApplyAddons => vec![
            Box::new(provider_type(&["ClusterTask"])),
            Box::new(TaskImages(images_from_env(ADDONS_IMAGE_PREFIX))),
        ],
        Phase::ApplyCommunity => vec![
            Box::new(ReplaceKind::new("Task", "ClusterTask")),
            Box::new(provider_type(&[])),
            Box::new(TaskImages(images_from_env(ADDONS_IMAGE_PREFIX))),
        ],
        Phase::ValidatePipeline | Phase::ValidateTriggers => Vec::new(),
    }
}

/// Locates the installed documents of a component for removal. Only
/// the identity of each document matters, so no owner is needed.
pub fn removal_manifest(manifest: &Manifest, phase: Phase, namespace: &str) -> Result<Manifest, Error> {
    let inject_namespace = InjectNamespaceConditional::new(namespace);
    match phase {
        Phase::ApplyCommunity => {
            let kind = ReplaceKind::new("Task", "ClusterTask");
            manifest.transform(&[&kind, &inject_namespace])
        }
        _ => manifest.transform(&[&inject_namespace]),
    }
}

/// Deployments and Services often cannot be updated in place because of
/// immutable fields. They are applied last and recreated when rejected.
pub fn needs_recreate(doc: &Document) -> bool {
    matches!(doc.kind(), "Deployment" | "Service")
}
