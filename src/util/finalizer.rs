use kube::{
    api::{Patch, PatchParams, Resource},
    core::ClusterResourceScope,
    Api, Client, Error,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{clone::Clone, fmt::Debug};

use super::FINALIZER_NAME;

/// Adds the operator's finalizer to a cluster-scoped `T` resource.
/// If the finalizer already exists, this action has no effect.
///
/// Note: Does not check for resource's existence for simplicity.
pub async fn add<T>(client: Client, name: &str) -> Result<T, Error>
where
    T: Clone + Resource<Scope = ClusterResourceScope> + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::all(client);
    let finalizer: Value = json!({
        "metadata": {
            "finalizers": [FINALIZER_NAME]
        }
    });
    let patch: Patch<&Value> = Patch::Merge(&finalizer);
    api.patch(name, &PatchParams::default(), &patch).await
}

/// Removes all finalizers from a cluster-scoped `T` resource. If there
/// are no finalizers already, this action has no effect.
pub async fn delete<T>(client: Client, name: &str) -> Result<T, Error>
where
    T: Clone + Resource<Scope = ClusterResourceScope> + Serialize + DeserializeOwned + Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::all(client);
    let finalizer: Value = json!({
        "metadata": {
            "finalizers": null
        }
    });
    let patch: Patch<&Value> = Patch::Merge(&finalizer);
    api.patch(name, &PatchParams::default(), &patch).await
}
