use async_trait::async_trait;
use kube::{
    api::{DeleteParams, DynamicObject, PostParams, PropagationPolicy},
    discovery::{self, Scope},
    Api, Client,
};

#[cfg(test)]
use mockall::automock;

use super::Document;
use crate::util::{Error, MANAGER_NAME};

/// Cluster operations needed to apply and remove the documents of a manifest.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestClient: Send + Sync {
    /// Returns the live object for the document, or None if it does not exist.
    async fn get(&self, doc: &Document) -> Result<Option<Document>, Error>;

    /// Creates the object described by the document.
    async fn create(&self, doc: &Document) -> Result<(), Error>;

    /// Replaces the live object with the document. The document must
    /// carry the live resourceVersion.
    async fn update(&self, doc: &Document) -> Result<(), Error>;

    /// Deletes the object described by the document.
    async fn delete(&self, doc: &Document, policy: PropagationPolicy) -> Result<(), Error>;
}

/// [`ManifestClient`] backed by the kubernetes API. The scope of each
/// kind is resolved through discovery so namespaced and cluster-scoped
/// documents are addressed correctly.
pub struct KubeManifestClient {
    client: Client,
}

impl KubeManifestClient {
    pub fn new(client: Client) -> Self {
        KubeManifestClient { client }
    }

    async fn api(&self, doc: &Document) -> Result<Api<DynamicObject>, Error> {
        let gvk = doc.gvk()?;
        let (resource, caps) = discovery::pinned_kind(&self.client, &gvk).await?;
        let api = match (caps.scope, doc.namespace()) {
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &resource),
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            (Scope::Namespaced, None) => {
                Api::default_namespaced_with(self.client.clone(), &resource)
            }
        };
        Ok(api)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(MANAGER_NAME.to_owned()),
        ..Default::default()
    }
}

fn to_object(doc: &Document) -> Result<DynamicObject, Error> {
    Ok(serde_json::from_value(doc.as_value().clone())?)
}

#[async_trait]
impl ManifestClient for KubeManifestClient {
    async fn get(&self, doc: &Document) -> Result<Option<Document>, Error> {
        let api = match self.api(doc).await {
            Ok(api) => api,
            // The kind is no longer served, so no object of it exists.
            Err(e) if e.is_not_found() || e.is_missing_kind() => return Ok(None),
            Err(e) => return Err(e),
        };
        match api.get_opt(doc.name()).await? {
            Some(live) => Ok(Some(Document::from_value(serde_json::to_value(live)?)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, doc: &Document) -> Result<(), Error> {
        let api = self.api(doc).await?;
        api.create(&post_params(), &to_object(doc)?).await?;
        Ok(())
    }

    async fn update(&self, doc: &Document) -> Result<(), Error> {
        let api = self.api(doc).await?;
        api.replace(doc.name(), &post_params(), &to_object(doc)?)
            .await?;
        Ok(())
    }

    async fn delete(&self, doc: &Document, policy: PropagationPolicy) -> Result<(), Error> {
        let api = self.api(doc).await?;
        let params = DeleteParams {
            propagation_policy: Some(policy),
            ..Default::default()
        };
        api.delete(doc.name(), &params).await?;
        Ok(())
    }
}
