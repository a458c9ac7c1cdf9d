use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::util::Error;

/// Readiness checks of the installed components. Missing objects are
/// reported as not ready, never as errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Validator: Send + Sync {
    /// Returns true once the deployment has fully rolled out.
    async fn deployment_ready(&self, name: &str, namespace: &str) -> Result<bool, Error>;

    /// Returns true if the mutating webhook configuration exists.
    async fn webhook_exists(&self, name: &str) -> Result<bool, Error>;

    /// Returns true if the custom resource definition is installed.
    async fn crd_installed(&self, name: &str) -> Result<bool, Error>;
}

/// Decides whether a deployment has rolled out. The deployment is not
/// ready until the controller observed its latest generation and every
/// replica is updated and available. A deployment that exceeded its
/// progress deadline will not become ready on its own and is an error.
pub fn deployment_ready(deployment: &Deployment) -> Result<bool, Error> {
    let status = match deployment.status.as_ref() {
        Some(status) => status,
        None => return Ok(false),
    };
    let generation = deployment.metadata.generation.unwrap_or_default();
    if generation > status.observed_generation.unwrap_or_default() {
        return Ok(false);
    }
    let deadline_exceeded = status
        .conditions
        .iter()
        .flatten()
        .find(|c| c.type_ == "Progressing")
        .map_or(false, |c| c.reason.as_deref() == Some("ProgressDeadlineExceeded"));
    if deadline_exceeded {
        return Err(Error::Timeout(format!(
            "deployment \"{}\" exceeded its progress deadline",
            deployment.name_any()
        )));
    }
    let updated = status.updated_replicas.unwrap_or_default();
    if let Some(desired) = deployment.spec.as_ref().and_then(|s| s.replicas) {
        if updated < desired {
            return Ok(false);
        }
    }
    if status.replicas.unwrap_or_default() > updated {
        return Ok(false);
    }
    Ok(status.available_replicas.unwrap_or_default() >= updated)
}

/// [`Validator`] backed by the kubernetes API.
pub struct KubeValidator {
    client: Client,
}

impl KubeValidator {
    pub fn new(client: Client) -> Self {
        KubeValidator { client }
    }
}

#[async_trait]
impl Validator for KubeValidator {
    async fn deployment_ready(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await? {
            Some(deployment) => deployment_ready(&deployment),
            None => Ok(false),
        }
    }

    async fn webhook_exists(&self, name: &str) -> Result<bool, Error> {
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn crd_installed(&self, name: &str) -> Result<bool, Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }
}
