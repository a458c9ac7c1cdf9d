use async_trait::async_trait;
use kube::{api::PostParams, Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::util::{finalizer, Error, MANAGER_NAME};
use pipelines_types::Config;

/// Operations on the watched `Config` resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Returns the current state of the resource, or None if it is gone.
    async fn get(&self, name: &str) -> Result<Option<Config>, Error>;

    async fn create(&self, config: &Config) -> Result<Config, Error>;

    /// Replaces the status subresource. The resourceVersion of `config`
    /// guards against concurrent writers.
    async fn replace_status(&self, config: &Config) -> Result<Config, Error>;

    async fn add_finalizer(&self, name: &str) -> Result<Config, Error>;

    async fn remove_finalizer(&self, name: &str) -> Result<(), Error>;
}

/// [`ConfigClient`] backed by the kubernetes API.
pub struct KubeConfigClient {
    client: Client,
}

impl KubeConfigClient {
    pub fn new(client: Client) -> Self {
        KubeConfigClient { client }
    }

    fn api(&self) -> Api<Config> {
        Api::all(self.client.clone())
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(MANAGER_NAME.to_owned()),
        ..Default::default()
    }
}

#[async_trait]
impl ConfigClient for KubeConfigClient {
    async fn get(&self, name: &str) -> Result<Option<Config>, Error> {
        Ok(self.api().get_opt(name).await?)
    }

    async fn create(&self, config: &Config) -> Result<Config, Error> {
        Ok(self.api().create(&post_params(), config).await?)
    }

    async fn replace_status(&self, config: &Config) -> Result<Config, Error> {
        let name = config.metadata.name.as_deref().ok_or_else(|| {
            Error::UserInputError("Config has no name".to_owned())
        })?;
        let data = serde_json::to_vec(config)?;
        Ok(self.api().replace_status(name, &post_params(), data).await?)
    }

    async fn add_finalizer(&self, name: &str) -> Result<Config, Error> {
        Ok(finalizer::add(self.client.clone(), name).await?)
    }

    async fn remove_finalizer(&self, name: &str) -> Result<(), Error> {
        finalizer::delete::<Config>(self.client.clone(), name).await?;
        Ok(())
    }
}
