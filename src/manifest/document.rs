use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::Error;

/// Kinds that are never namespaced. Owner references and namespace
/// injection are skipped for these.
const CLUSTER_SCOPED_KINDS: [&str; 23] = [
    "componentstatus",
    "namespace",
    "node",
    "persistentvolume",
    "mutatingwebhookconfiguration",
    "validatingwebhookconfiguration",
    "customresourcedefinition",
    "apiservice",
    "meshpolicy",
    "tokenreview",
    "selfsubjectaccessreview",
    "selfsubjectrulesreview",
    "subjectaccessreview",
    "certificatesigningrequest",
    "podsecuritypolicy",
    "clusterrolebinding",
    "clusterrole",
    "priorityclass",
    "storageclass",
    "volumeattachment",
    "clustertask",
    "clustertriggerbinding",
    "clusterinterceptor",
];

/// One declarative resource of a manifest. The wrapper exposes the
/// common metadata fields; everything else passes through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

/// Returns `v` as an object, replacing any other value with an empty one.
fn ensure_object(v: &mut Value) -> &mut Map<String, Value> {
    if !v.is_object() {
        *v = Value::Object(Map::new());
    }
    match v {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

impl Document {
    /// Wraps a parsed resource. The value must be an object with a kind.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value.get("kind").and_then(Value::as_str) {
            Some(kind) if !kind.is_empty() => Ok(Document(value)),
            _ => Err(Error::ManifestError(format!(
                "resource has no kind: {}",
                value
            ))),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.0.pointer(pointer).and_then(Value::as_str)
    }

    pub fn api_version(&self) -> &str {
        self.str_at("/apiVersion").unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.str_at("/kind").unwrap_or_default()
    }

    pub fn set_kind(&mut self, kind: &str) {
        self.set(&["kind"], Value::from(kind));
    }

    pub fn name(&self) -> &str {
        self.str_at("/metadata/name").unwrap_or_default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.set(&["metadata", "name"], Value::from(name));
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at("/metadata/namespace").filter(|ns| !ns.is_empty())
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.set(&["metadata", "namespace"], Value::from(namespace));
    }

    pub fn clear_namespace(&mut self) {
        if let Some(Value::Object(metadata)) = self.0.get_mut("metadata") {
            metadata.remove("namespace");
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        self.set(&["metadata", "labels", key], Value::from(value));
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.0
            .pointer("/metadata/annotations")
            .and_then(|annotations| annotations.get(key))
            .and_then(Value::as_str)
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        self.set(&["metadata", "annotations", key], Value::from(value));
    }

    /// Returns true if the annotation is present with the literal value "true".
    pub fn has_true_annotation(&self, key: &str) -> bool {
        self.annotation(key) == Some("true")
    }

    pub fn owner_references(&self) -> Result<Vec<OwnerReference>, Error> {
        match self.0.pointer("/metadata/ownerReferences") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(refs) => Ok(serde_json::from_value(refs.clone())?),
        }
    }

    pub fn set_owner_references(&mut self, refs: &[OwnerReference]) -> Result<(), Error> {
        let refs = serde_json::to_value(refs)?;
        self.set(&["metadata", "ownerReferences"], refs);
        Ok(())
    }

    /// Looks up a nested field with a JSON pointer such as `/spec/replicas`.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    pub fn pointer_mut(&mut self, pointer: &str) -> Option<&mut Value> {
        self.0.pointer_mut(pointer)
    }

    /// Sets a nested field, creating the intermediate objects as needed.
    pub fn set(&mut self, path: &[&str], value: Value) {
        let (last, parents) = match path.split_last() {
            Some(split) => split,
            None => {
                self.0 = value;
                return;
            }
        };
        let mut current = &mut self.0;
        for key in parents {
            current = ensure_object(current)
                .entry(key.to_string())
                .or_insert(Value::Null);
        }
        ensure_object(current).insert(last.to_string(), value);
    }

    /// Returns true if the kind is one of the well known cluster-scoped kinds.
    pub fn is_cluster_scoped(&self) -> bool {
        is_cluster_scoped(self.kind())
    }

    pub fn gvk(&self) -> Result<GroupVersionKind, Error> {
        let (group, version) = match self.api_version().rsplit_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version()),
        };
        if version.is_empty() {
            return Err(Error::ManifestError(format!(
                "{} {} has no apiVersion",
                self.kind(),
                self.name()
            )));
        }
        Ok(GroupVersionKind::gvk(group, version, self.kind()))
    }

    /// Short human readable identity used in logs and errors.
    pub fn describe(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{} {}/{}", self.kind(), ns, self.name()),
            None => format!("{} {}", self.kind(), self.name()),
        }
    }
}

/// Returns true if resources of `kind` are never namespaced.
pub fn is_cluster_scoped(kind: &str) -> bool {
    let kind = kind.to_lowercase();
    CLUSTER_SCOPED_KINDS.contains(&kind.as_str())
}
