use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{ObjectMeta, PropagationPolicy},
    error::ErrorResponse,
    runtime::controller::Action,
    ResourceExt,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

use crate::configs::client::ConfigClient;
use crate::configs::components::Manifests;
use crate::configs::reconcile::{reconcile, ContextData};
use crate::manifest::{Document, Manifest, ManifestClient};
use crate::settings::OperatorConfig;
use crate::util::{Error, FINALIZER_NAME};
use crate::validate::Validator;
use pipelines_types::*;

/// Name of the watched resource in every story.
pub const CLUSTER: &str = "cluster";

/// Namespace the components are installed into.
pub const TARGET_NAMESPACE: &str = "openshift-pipelines";

/// Target version of the operator under test.
pub const VERSION: &str = "v0.11.3";

pub const PIPELINE_YAML: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: tekton-pipelines
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: config-defaults
  namespace: tekton-pipelines
data:
  default-timeout-minutes: "60"
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: cluster-wide-settings
  namespace: openshift
  annotations:
    operator.tekton.dev/preserve-namespace: "true"
data:
  enabled: "true"
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: tekton-pipelines-controller
  namespace: tekton-pipelines
  labels:
    pipeline.tekton.dev/release: v0.11.3
spec:
  replicas: 1
  template:
    spec:
      containers:
        - name: tekton-pipelines-controller
          image: gcr.io/tekton-releases/controller:v0.11.3
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: tekton-pipelines-webhook
  namespace: tekton-pipelines
spec:
  replicas: 1
  template:
    spec:
      containers:
        - name: webhook
          image: gcr.io/tekton-releases/webhook:v0.11.3
---
apiVersion: v1
kind: Service
metadata:
  name: tekton-pipelines-webhook
  namespace: tekton-pipelines
spec:
  ports:
    - port: 443
"#;

pub const TRIGGERS_YAML: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: tekton-triggers-controller
  namespace: tekton-pipelines
  labels:
    triggers.tekton.dev/release: v0.4.0
spec:
  replicas: 1
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: tekton-triggers-webhook
  namespace: tekton-pipelines
spec:
  replicas: 1
"#;

pub const ADDONS_YAML: &str = r#"
apiVersion: tekton.dev/v1alpha1
kind: ClusterTask
metadata:
  name: buildah
spec:
  steps:
    - name: build
      image: quay.io/buildah/stable:v1.11.0
"#;

pub const COMMUNITY_YAML: &str = r#"
apiVersion: tekton.dev/v1alpha1
kind: Task
metadata:
  name: tkn
spec:
  steps:
    - name: tkn
      image: gcr.io/tekton-releases/tkn:v0.8.0
"#;

/// A write observed by the fake cluster, identified by the
/// document's kind, namespace and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Update(String),
    Delete(String),
}

#[derive(Default)]
struct State {
    configs: HashMap<String, Config>,
    objects: BTreeMap<String, Document>,
    calls: Vec<Call>,
    failing_creates: usize,
    rejected_update_kinds: Vec<String>,
    held_delete_kinds: Vec<String>,
    withdrawn_kinds: Vec<String>,
    ready: bool,
}

/// In-memory cluster implementing every capability the controller needs.
/// Writes are recorded so stories can assert on ordering and counts.
pub struct FakeCluster {
    state: Mutex<State>,
}

pub fn api_error(code: u16, reason: &str) -> Error {
    Error::KubeError {
        source: kube::Error::Api(ErrorResponse {
            status: "Failure".to_owned(),
            message: reason.to_owned(),
            reason: reason.to_owned(),
            code,
        }),
    }
}

impl FakeCluster {
    /// A cluster whose workloads report ready as soon as they exist.
    pub fn new() -> Arc<Self> {
        Arc::new(FakeCluster {
            state: Mutex::new(State {
                ready: true,
                ..Default::default()
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Stores a Config the way the API server would, assigning a uid.
    pub fn seed(&self, mut config: Config) -> Config {
        config.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        self.state()
            .configs
            .insert(config.metadata.name.clone().unwrap(), config.clone());
        config
    }

    /// Stores a Config carrying the finalizer, so stories start at the
    /// first installation phase.
    pub fn seed_named(&self, name: &str) -> Config {
        self.seed(Config {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                finalizers: Some(vec![FINALIZER_NAME.to_owned()]),
                ..Default::default()
            },
            spec: ConfigSpec {
                target_namespace: TARGET_NAMESPACE.to_owned(),
                ..Default::default()
            },
            status: None,
        })
    }

    pub fn config(&self, name: &str) -> Option<Config> {
        self.state().configs.get(name).cloned()
    }

    /// Codes of the recorded conditions, newest first.
    pub fn codes(&self, name: &str) -> Vec<InstallStatus> {
        self.config(name)
            .and_then(|c| c.status)
            .map(|s| s.conditions.iter().map(|c| c.code).collect())
            .unwrap_or_default()
    }

    /// Marks the Config as deleted. It disappears once no finalizer holds it.
    pub fn delete_config(&self, name: &str) {
        let mut state = self.state();
        let held = match state.configs.get_mut(name) {
            Some(config) => {
                config.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
                !config.finalizers().is_empty()
            }
            None => return,
        };
        if !held {
            state.configs.remove(name);
        }
    }

    /// Drops the Config without running any finalizer.
    pub fn forget_config(&self, name: &str) {
        self.state().configs.remove(name);
    }

    /// Stores an object as if another client had created it.
    pub fn put(&self, doc: Document) {
        self.state().objects.insert(doc.describe(), doc);
    }

    pub fn object(&self, key: &str) -> Option<Document> {
        self.state().objects.get(key).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// The next `count` creates fail with a server error.
    pub fn fail_creates(&self, count: usize) {
        self.state().failing_creates = count;
    }

    /// Updates of `kind` are rejected as invalid.
    pub fn reject_updates(&self, kind: &str) {
        self.state().rejected_update_kinds.push(kind.to_owned());
    }

    /// Deletes of `kind` are accepted but the objects never go away,
    /// as if a finalizer on them never completed.
    pub fn hold_deletes(&self, kind: &str) {
        self.state().held_delete_kinds.push(kind.to_owned());
    }

    /// Removes every object of `kind` and stops serving it, as when its
    /// CRD is deleted. Lookups of the kind then fail with not-found.
    pub fn withdraw_kind(&self, kind: &str) {
        let mut state = self.state();
        state.objects.retain(|_, doc| doc.kind() != kind);
        state.withdrawn_kinds.push(kind.to_owned());
    }

    pub fn set_ready(&self, ready: bool) {
        self.state().ready = ready;
    }
}

#[async_trait]
impl ConfigClient for FakeCluster {
    async fn get(&self, name: &str) -> Result<Option<Config>, Error> {
        Ok(self.config(name))
    }

    async fn create(&self, config: &Config) -> Result<Config, Error> {
        let name = config.name_any();
        if self.state().configs.contains_key(&name) {
            return Err(api_error(409, "AlreadyExists"));
        }
        Ok(self.seed(config.clone()))
    }

    async fn replace_status(&self, config: &Config) -> Result<Config, Error> {
        let mut state = self.state();
        let stored = state
            .configs
            .get_mut(&config.name_any())
            .ok_or_else(|| api_error(404, "NotFound"))?;
        stored.status = config.status.clone();
        Ok(stored.clone())
    }

    async fn add_finalizer(&self, name: &str) -> Result<Config, Error> {
        let mut state = self.state();
        let stored = state
            .configs
            .get_mut(name)
            .ok_or_else(|| api_error(404, "NotFound"))?;
        stored.metadata.finalizers = Some(vec![FINALIZER_NAME.to_owned()]);
        Ok(stored.clone())
    }

    async fn remove_finalizer(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state();
        let deleted = match state.configs.get_mut(name) {
            Some(stored) => {
                stored.metadata.finalizers = None;
                stored.metadata.deletion_timestamp.is_some()
            }
            None => return Err(api_error(404, "NotFound")),
        };
        if deleted {
            state.configs.remove(name);
        }
        Ok(())
    }
}

#[async_trait]
impl ManifestClient for FakeCluster {
    async fn get(&self, doc: &Document) -> Result<Option<Document>, Error> {
        if self.state().withdrawn_kinds.iter().any(|k| k == doc.kind()) {
            return Err(api_error(404, "NotFound"));
        }
        Ok(self.object(&doc.describe()))
    }

    async fn create(&self, doc: &Document) -> Result<(), Error> {
        let mut state = self.state();
        let key = doc.describe();
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(api_error(500, "InternalError"));
        }
        if state.objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.calls.push(Call::Create(key.clone()));
        state.objects.insert(key, doc.clone());
        Ok(())
    }

    async fn update(&self, doc: &Document) -> Result<(), Error> {
        let mut state = self.state();
        let key = doc.describe();
        if state.rejected_update_kinds.iter().any(|k| k == doc.kind()) {
            return Err(api_error(422, "Invalid"));
        }
        if !state.objects.contains_key(&key) {
            return Err(api_error(404, "NotFound"));
        }
        state.calls.push(Call::Update(key.clone()));
        state.objects.insert(key, doc.clone());
        Ok(())
    }

    async fn delete(&self, doc: &Document, _policy: PropagationPolicy) -> Result<(), Error> {
        let mut state = self.state();
        let key = doc.describe();
        if state.held_delete_kinds.iter().any(|k| k == doc.kind()) {
            if !state.objects.contains_key(&key) {
                return Err(api_error(404, "NotFound"));
            }
        } else if state.objects.remove(&key).is_none() {
            return Err(api_error(404, "NotFound"));
        }
        state.calls.push(Call::Delete(key));
        Ok(())
    }
}

#[async_trait]
impl Validator for FakeCluster {
    async fn deployment_ready(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        let state = self.state();
        let key = format!("Deployment {}/{}", namespace, name);
        Ok(state.ready && state.objects.contains_key(&key))
    }

    async fn webhook_exists(&self, _name: &str) -> Result<bool, Error> {
        Ok(self.state().ready)
    }

    async fn crd_installed(&self, _name: &str) -> Result<bool, Error> {
        Ok(false)
    }
}

/// The bundled manifests used by every story.
pub fn manifests() -> Manifests {
    Manifests {
        pipeline: Manifest::from_yaml(PIPELINE_YAML).unwrap(),
        triggers: Manifest::from_yaml(TRIGGERS_YAML).unwrap(),
        addons: Manifest::from_yaml(ADDONS_YAML).unwrap(),
        community: Manifest::from_yaml(COMMUNITY_YAML).unwrap(),
    }
}

/// Operator configuration with the given identity.
pub fn operator_config(uuid: &str) -> OperatorConfig {
    OperatorConfig {
        operator_uuid: uuid.to_owned(),
        version: VERSION.to_owned(),
        ..Default::default()
    }
}

pub fn context(cluster: &Arc<FakeCluster>, config: OperatorConfig) -> Arc<ContextData> {
    Arc::new(ContextData::new(
        config,
        manifests(),
        cluster.clone(),
        cluster.clone(),
        cluster.clone(),
    ))
}

/// Runs one reconciliation pass for the named Config, as the controller
/// would after a watch event.
pub async fn pass(context: &Arc<ContextData>, name: &str) -> Result<Action, Error> {
    let trigger = Config::new(name, ConfigSpec::default());
    reconcile(Arc::new(trigger), context.clone()).await
}

/// Runs passes until the controller stops requeueing immediately.
/// Returns the last action.
pub async fn settle(context: &Arc<ContextData>, name: &str) -> Action {
    for _ in 0..32 {
        let action = pass(context, name).await.unwrap();
        if action != Action::requeue(Duration::ZERO) {
            return action;
        }
    }
    panic!("{} did not settle", name);
}

/// Key under which the fake cluster stores a namespaced object.
pub fn key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{} {}/{}", kind, namespace, name)
}
