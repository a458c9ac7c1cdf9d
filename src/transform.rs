use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use serde_json::Value;
use std::collections::HashMap;

use crate::manifest::{Document, Manifest};
use crate::settings::OperatorConfig;
use crate::util::{Error, ANNOTATION_PRESERVE_NS, ANNOTATION_PRESERVE_RB_SUBJECT_NS};
use pipelines_types::Config;

/// Environment prefix of the pipelines engine image overrides.
pub const PIPELINES_IMAGE_PREFIX: &str = "IMAGE_PIPELINES_";

/// Environment prefix of the triggers image overrides.
pub const TRIGGERS_IMAGE_PREFIX: &str = "IMAGE_TRIGGERS_";

/// Environment prefix of the task catalog image overrides.
pub const ADDONS_IMAGE_PREFIX: &str = "IMAGE_ADDONS_";

/// Key prefix of container argument overrides.
pub const ARG_PREFIX: &str = "arg_";

/// Key prefix of task parameter overrides.
pub const PARAM_PREFIX: &str = "param_";

/// Image overrides keyed by normalized container, step, argument or
/// parameter name.
pub type ImageOverrides = HashMap<String, String>;

/// What happens to a document after a transformer ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Reject,
}

/// A rewrite of one manifest document.
pub trait Transformer: Send + Sync {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error>;
}

impl<F> Transformer for F
where
    F: Fn(&mut Document) -> Result<Disposition, Error> + Send + Sync,
{
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        self(doc)
    }
}

/// Lowercases the name and replaces dashes with underscores,
/// after prepending `prefix`.
fn form_key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_lowercase()).replace('-', "_")
}

/// Collects the variables starting with `prefix`, keyed by the rest
/// of their name, lowercased.
pub fn images_from_vars<I>(prefix: &str, vars: I) -> ImageOverrides
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .map(|name| (form_key("", name), value))
        })
        .collect()
}

/// Image overrides taken from the operator's process environment.
/// Variables that are not valid unicode are ignored.
pub fn images_from_env(prefix: &str) -> ImageOverrides {
    let vars = std::env::vars_os().filter_map(|(key, value)| {
        Some((key.into_string().ok()?, value.into_string().ok()?))
    });
    images_from_vars(prefix, vars)
}

/// Sets the controller owner reference on every namespaced document.
pub struct InjectOwner {
    owner: OwnerReference,
}

impl InjectOwner {
    pub fn new(owner: &Config) -> Result<Self, Error> {
        let owner = owner.controller_owner_ref(&()).ok_or_else(|| {
            Error::UserInputError("Config has no uid to own resources with".to_owned())
        })?;
        Ok(InjectOwner { owner })
    }
}

impl Transformer for InjectOwner {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        if !doc.is_cluster_scoped() {
            doc.set_owner_references(std::slice::from_ref(&self.owner))?;
        }
        Ok(Disposition::Keep)
    }
}

/// Overrides the `namespace` of every element of the array at `pointer`
/// that already declares one.
fn set_subject_namespaces(doc: &mut Document, pointer: &str, namespace: &str) {
    if let Some(Value::Array(items)) = doc.pointer_mut(pointer) {
        for item in items.iter_mut() {
            if let Some(ns) = item.get_mut("namespace") {
                *ns = Value::from(namespace);
            }
        }
    }
}

/// Moves every document into the target namespace.
pub struct InjectNamespace {
    namespace: String,
}

impl InjectNamespace {
    pub fn new(namespace: &str) -> Self {
        InjectNamespace {
            namespace: namespace.to_owned(),
        }
    }
}

impl Transformer for InjectNamespace {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        let ns = self.namespace.as_str();
        match doc.kind().to_lowercase().as_str() {
            "namespace" => doc.set_name(ns),
            "clusterrolebinding" => set_subject_namespaces(doc, "/subjects", ns),
            "mutatingwebhookconfiguration" | "validatingwebhookconfiguration" => {
                if let Some(Value::Array(webhooks)) = doc.pointer_mut("/webhooks") {
                    for webhook in webhooks.iter_mut() {
                        if let Some(service) = webhook.pointer_mut("/clientConfig/service") {
                            if let Some(obj) = service.as_object_mut() {
                                obj.insert("namespace".to_owned(), Value::from(ns));
                            }
                        }
                    }
                }
            }
            "customresourcedefinition" => {
                let pointer = "/spec/conversion/webhook/clientConfig/service";
                if let Some(Value::Object(service)) = doc.pointer_mut(pointer) {
                    service.insert("namespace".to_owned(), Value::from(ns));
                }
            }
            _ => {}
        }
        if !doc.is_cluster_scoped() {
            doc.set_namespace(ns);
        }
        Ok(Disposition::Keep)
    }
}

/// [`InjectNamespace`] unless the document is annotated with
/// `operator.tekton.dev/preserve-namespace: "true"`.
pub struct InjectNamespaceConditional {
    inner: InjectNamespace,
}

impl InjectNamespaceConditional {
    pub fn new(namespace: &str) -> Self {
        InjectNamespaceConditional {
            inner: InjectNamespace::new(namespace),
        }
    }
}

impl Transformer for InjectNamespaceConditional {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        if doc.has_true_annotation(ANNOTATION_PRESERVE_NS) {
            return Ok(Disposition::Keep);
        }
        self.inner.transform(doc)
    }
}

/// Namespace injection for RoleBindings. The binding itself follows the
/// preserve-namespace annotation; its subjects follow the
/// preserve-rb-subject-namespace annotation.
pub struct InjectNamespaceRoleBindingConditional {
    namespace: String,
}

impl InjectNamespaceRoleBindingConditional {
    pub fn new(namespace: &str) -> Self {
        InjectNamespaceRoleBindingConditional {
            namespace: namespace.to_owned(),
        }
    }
}

impl Transformer for InjectNamespaceRoleBindingConditional {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        if doc.kind() != "RoleBinding" {
            return Ok(Disposition::Keep);
        }
        if !doc.has_true_annotation(ANNOTATION_PRESERVE_NS) {
            doc.set_namespace(&self.namespace);
        }
        if !doc.has_true_annotation(ANNOTATION_PRESERVE_RB_SUBJECT_NS) {
            set_subject_namespaces(doc, "/subjects", &self.namespace);
        }
        Ok(Disposition::Keep)
    }
}

/// Sets one data key of the ConfigMap called `name`.
fn set_config_map_key(doc: &mut Document, name: &str, key: &str, value: &str) {
    if doc.kind().eq_ignore_ascii_case("configmap") && doc.name() == name {
        doc.set(&["data", key], Value::from(value));
    }
}

/// Writes the default service account into the `config-defaults` ConfigMap.
pub struct InjectDefaultSA(pub String);

impl Transformer for InjectDefaultSA {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        set_config_map_key(doc, "config-defaults", "default-service-account", &self.0);
        Ok(Disposition::Keep)
    }
}

/// Writes the affinity assistant flag into the `feature-flags` ConfigMap.
pub struct SetDisableAffinityAssistant(pub bool);

impl Transformer for SetDisableAffinityAssistant {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        let value = self.0.to_string();
        set_config_map_key(doc, "feature-flags", "disable-affinity-assistant", &value);
        Ok(Disposition::Keep)
    }
}

/// Renames documents of one kind to another. Documents renamed to a
/// cluster-scoped kind lose their namespace.
pub struct ReplaceKind {
    from: String,
    to: String,
}

impl ReplaceKind {
    pub fn new(from: &str, to: &str) -> Self {
        ReplaceKind {
            from: from.to_owned(),
            to: to.to_owned(),
        }
    }
}

impl Transformer for ReplaceKind {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        if doc.kind() == self.from {
            doc.set_kind(&self.to);
            if doc.is_cluster_scoped() {
                doc.clear_namespace();
            }
        }
        Ok(Disposition::Keep)
    }
}

/// How [`InjectLabel`] treats a label that is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    Retain,
    Overwrite,
}

/// Sets a label on the documents whose kind is listed, or on every
/// document if no kind is listed.
pub struct InjectLabel {
    key: String,
    value: String,
    policy: OverwritePolicy,
    kinds: Vec<String>,
}

impl InjectLabel {
    pub fn new(key: &str, value: &str, policy: OverwritePolicy, kinds: &[&str]) -> Self {
        InjectLabel {
            key: key.to_owned(),
            value: value.to_owned(),
            policy,
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Transformer for InjectLabel {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        if !self.kinds.is_empty() && !self.kinds.iter().any(|k| k == doc.kind()) {
            return Ok(Disposition::Keep);
        }
        if self.policy == OverwritePolicy::Retain && doc.label(&self.key).is_some() {
            return Ok(Disposition::Keep);
        }
        doc.set_label(&self.key, &self.value);
        Ok(Disposition::Keep)
    }
}

/// Substitutes container images and image arguments of Deployments.
pub struct DeploymentImages(pub ImageOverrides);

impl DeploymentImages {
    fn replace_args(&self, args: &mut [Value]) {
        for i in 0..args.len() {
            let arg = match args[i].as_str() {
                Some(arg) => arg.to_owned(),
                None => continue,
            };
            let parts: Vec<&str> = arg.split('=').collect();
            if parts.len() == 2 {
                if let Some(image) = self.0.get(&form_key(ARG_PREFIX, parts[0])) {
                    args[i] = Value::from(format!("{}={}", parts[0], image));
                }
                continue;
            }
            if let Some(image) = self.0.get(&form_key(ARG_PREFIX, &arg)) {
                if let Some(next) = args.get_mut(i + 1) {
                    *next = Value::from(image.as_str());
                }
            }
        }
    }
}

impl Transformer for DeploymentImages {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        if doc.kind() != "Deployment" {
            return Ok(Disposition::Keep);
        }
        let containers = match doc.pointer_mut("/spec/template/spec/containers") {
            Some(Value::Array(containers)) => containers,
            _ => return Ok(Disposition::Keep),
        };
        for container in containers.iter_mut() {
            let name = container.get("name").and_then(Value::as_str).unwrap_or_default();
            if let Some(image) = self.0.get(&form_key("", name)) {
                container["image"] = Value::from(image.as_str());
            }
            if let Some(Value::Array(args)) = container.get_mut("args") {
                self.replace_args(args);
            }
        }
        Ok(Disposition::Keep)
    }
}

/// Substitutes step images and image parameters of ClusterTasks.
pub struct TaskImages(pub ImageOverrides);

impl Transformer for TaskImages {
    fn transform(&self, doc: &mut Document) -> Result<Disposition, Error> {
        if doc.kind() != "ClusterTask" {
            return Ok(Disposition::Keep);
        }
        if let Some(Value::Array(steps)) = doc.pointer_mut("/spec/steps") {
            for step in steps.iter_mut() {
                let key = match step.get("name").and_then(Value::as_str) {
                    Some(name) => form_key("", name),
                    None => continue,
                };
                if let Some(image) = self.0.get(&key) {
                    step["image"] = Value::from(image.as_str());
                }
            }
        }
        if let Some(Value::Array(params)) = doc.pointer_mut("/spec/params") {
            for param in params.iter_mut() {
                let key = match param.get("name").and_then(Value::as_str) {
                    Some(name) => form_key(PARAM_PREFIX, name),
                    None => continue,
                };
                if let Some(image) = self.0.get(&key) {
                    param["default"] = Value::from(image.as_str());
                }
            }
        }
        Ok(Disposition::Keep)
    }
}

/// Runs the transforms shared by every component, followed by `extras`.
/// RoleBindings only get the owner and their own namespace handling and
/// are moved to the end of the manifest.
pub fn transform_manifest(
    manifest: &Manifest,
    owner: &Config,
    config: &OperatorConfig,
    extras: &[&dyn Transformer],
) -> Result<Manifest, Error> {
    let namespace = owner.spec.target_namespace.as_str();
    let inject_owner = InjectOwner::new(owner)?;

    let is_role_binding = |doc: &Document| doc.kind() == "RoleBinding";
    let role_bindings = manifest.filter(is_role_binding);
    let rest = manifest.filter(|doc| !is_role_binding(doc));

    let inject_namespace = InjectNamespaceConditional::new(namespace);
    let default_sa = InjectDefaultSA(config.default_sa.clone());
    let affinity = SetDisableAffinityAssistant(config.disable_affinity_assistant);
    let mut transformers: Vec<&dyn Transformer> =
        vec![&inject_owner, &inject_namespace, &default_sa, &affinity];
    transformers.extend_from_slice(extras);
    let rest = rest.transform(&transformers)?;

    let rb_namespace = InjectNamespaceRoleBindingConditional::new(namespace);
    let role_bindings = role_bindings.transform(&[&inject_owner, &rb_namespace])?;
    Ok(rest.append(role_bindings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use pipelines_types::ConfigSpec;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn apply(t: &dyn Transformer, value: Value) -> Document {
        let mut d = doc(value);
        assert_eq!(t.transform(&mut d).unwrap(), Disposition::Keep);
        d
    }

    fn owner() -> Config {
        Config {
            metadata: ObjectMeta {
                name: Some("cluster".to_owned()),
                uid: Some("1234".to_owned()),
                ..Default::default()
            },
            spec: ConfigSpec {
                target_namespace: "foo".to_owned(),
                ..Default::default()
            },
            status: None,
        }
    }

    fn deployment(containers: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "tekton-pipelines-controller" },
            "spec": { "template": { "spec": { "containers": containers } } }
        })
    }

    #[test]
    fn preserve_namespace_annotation_is_honored() {
        let t = InjectNamespaceConditional::new("foo");
        let preserved = apply(
            &t,
            json!({
                "kind": "ConfigMap",
                "metadata": {
                    "name": "a",
                    "namespace": "openshift",
                    "annotations": { "operator.tekton.dev/preserve-namespace": "true" }
                }
            }),
        );
        assert_eq!(preserved.namespace(), Some("openshift"));

        let moved = apply(
            &t,
            json!({ "kind": "ConfigMap", "metadata": { "name": "a", "namespace": "openshift" } }),
        );
        assert_eq!(moved.namespace(), Some("foo"));

        let not_literal_true = apply(
            &t,
            json!({
                "kind": "ConfigMap",
                "metadata": {
                    "name": "a",
                    "namespace": "openshift",
                    "annotations": { "operator.tekton.dev/preserve-namespace": "yes" }
                }
            }),
        );
        assert_eq!(not_literal_true.namespace(), Some("foo"));
    }

    #[test]
    fn namespace_injection_handles_cluster_scoped_kinds() {
        let t = InjectNamespace::new("foo");
        let ns = apply(&t, json!({ "kind": "Namespace", "metadata": { "name": "tekton" } }));
        assert_eq!(ns.name(), "foo");
        assert_eq!(ns.namespace(), None);

        let crb = apply(
            &t,
            json!({
                "kind": "ClusterRoleBinding",
                "metadata": { "name": "crb" },
                "subjects": [
                    { "kind": "ServiceAccount", "name": "sa", "namespace": "tekton" },
                    { "kind": "Group", "name": "g" }
                ]
            }),
        );
        assert_eq!(crb.namespace(), None);
        assert_eq!(crb.pointer("/subjects/0/namespace"), Some(&json!("foo")));
        assert_eq!(crb.pointer("/subjects/1/namespace"), None);

        let webhook = apply(
            &t,
            json!({
                "kind": "MutatingWebhookConfiguration",
                "metadata": { "name": "webhook.pipeline.tekton.dev" },
                "webhooks": [{ "clientConfig": { "service": { "name": "w", "namespace": "x" } } }]
            }),
        );
        assert_eq!(
            webhook.pointer("/webhooks/0/clientConfig/service/namespace"),
            Some(&json!("foo"))
        );

        let crd = apply(
            &t,
            json!({
                "kind": "CustomResourceDefinition",
                "metadata": { "name": "tasks.tekton.dev" },
                "spec": { "conversion": { "webhook": { "clientConfig": { "service": { "name": "w" } } } } }
            }),
        );
        assert_eq!(
            crd.pointer("/spec/conversion/webhook/clientConfig/service/namespace"),
            Some(&json!("foo"))
        );
    }

    #[test]
    fn role_binding_subjects_follow_their_annotation() {
        let t = InjectNamespaceRoleBindingConditional::new("foo");
        let rb = json!({
            "kind": "RoleBinding",
            "metadata": {
                "name": "rb",
                "namespace": "openshift",
                "annotations": { "operator.tekton.dev/preserve-namespace": "true" }
            },
            "subjects": [{ "kind": "ServiceAccount", "name": "sa", "namespace": "tekton" }]
        });
        let d = apply(&t, rb.clone());
        assert_eq!(d.namespace(), Some("openshift"));
        assert_eq!(d.pointer("/subjects/0/namespace"), Some(&json!("foo")));

        let mut preserved = rb;
        preserved["metadata"]["annotations"]
            ["operator.tekton.dev/preserve-rb-subject-namespace"] = json!("true");
        let d = apply(&t, preserved);
        assert_eq!(d.pointer("/subjects/0/namespace"), Some(&json!("tekton")));
    }

    #[test]
    fn owner_is_skipped_for_cluster_scoped_kinds() {
        let t = InjectOwner::new(&owner()).unwrap();
        let cm = apply(&t, json!({ "kind": "ConfigMap", "metadata": { "name": "a" } }));
        let refs = cm.owner_references().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uid, "1234");
        assert_eq!(refs[0].controller, Some(true));

        let crd = apply(&t, json!({ "kind": "CustomResourceDefinition", "metadata": { "name": "x" } }));
        assert!(crd.owner_references().unwrap().is_empty());
    }

    #[test]
    fn owner_requires_uid() {
        let mut cfg = owner();
        cfg.metadata.uid = None;
        assert!(InjectOwner::new(&cfg).is_err());
    }

    #[test]
    fn default_sa_only_touches_config_defaults() {
        let t = InjectDefaultSA("pipeline".to_owned());
        let d = apply(&t, json!({ "kind": "ConfigMap", "metadata": { "name": "config-defaults" } }));
        assert_eq!(d.pointer("/data/default-service-account"), Some(&json!("pipeline")));
        let other = json!({ "kind": "ConfigMap", "metadata": { "name": "other" } });
        assert_eq!(apply(&t, other.clone()).as_value(), &other);
    }

    #[test]
    fn affinity_assistant_flag_is_written() {
        let t = SetDisableAffinityAssistant(true);
        let d = apply(
            &t,
            json!({ "kind": "ConfigMap", "metadata": { "name": "feature-flags" }, "data": { "a": "b" } }),
        );
        assert_eq!(d.pointer("/data/disable-affinity-assistant"), Some(&json!("true")));
        assert_eq!(d.pointer("/data/a"), Some(&json!("b")));
    }

    #[test]
    fn replace_kind_only_matches_source_kind() {
        let t = ReplaceKind::new("Task", "ClusterTask");
        let task = apply(&t, json!({ "kind": "Task", "metadata": { "namespace": "foo" } }));
        assert_eq!(task.kind(), "ClusterTask");
        assert_eq!(task.namespace(), None);
        assert_eq!(apply(&t, json!({ "kind": "Pipeline" })).kind(), "Pipeline");
    }

    #[test]
    fn inject_label_policies() {
        let key = "operator.tekton.dev/provider-type";
        let labelled = json!({ "kind": "ClusterTask", "metadata": { "labels": { key: "redhat" } } });

        let retain = InjectLabel::new(key, "community", OverwritePolicy::Retain, &[]);
        assert_eq!(apply(&retain, labelled.clone()).label(key), Some("redhat"));

        let overwrite = InjectLabel::new(key, "community", OverwritePolicy::Overwrite, &["ClusterTask"]);
        assert_eq!(apply(&overwrite, labelled).label(key), Some("community"));
        assert_eq!(apply(&overwrite, json!({ "kind": "Task" })).label(key), None);
    }

    #[test]
    fn images_are_keyed_case_insensitively() {
        let images = images_from_vars(
            PIPELINES_IMAGE_PREFIX,
            vec![
                ("IMAGE_PIPELINES_CONTROLLER".to_owned(), "registry/x:1".to_owned()),
                ("IMAGE_PIPELINES_ARG__GIT_IMAGE".to_owned(), "registry/git:1".to_owned()),
                ("IMAGE_TRIGGERS_CONTROLLER".to_owned(), "registry/t:1".to_owned()),
            ],
        );
        assert_eq!(images.len(), 2);
        let t = DeploymentImages(images);
        let d = apply(
            &t,
            deployment(json!([
                { "name": "Controller", "image": "old", "args": ["-git-image", "old-git", "-other", "x"] },
                { "name": "sidecar", "image": "sidecar:1" }
            ])),
        );
        assert_eq!(d.pointer("/spec/template/spec/containers/0/image"), Some(&json!("registry/x:1")));
        assert_eq!(
            d.pointer("/spec/template/spec/containers/0/args"),
            Some(&json!(["-git-image", "registry/git:1", "-other", "x"]))
        );
        assert_eq!(d.pointer("/spec/template/spec/containers/1/image"), Some(&json!("sidecar:1")));
    }

    #[cfg(unix)]
    #[test]
    fn environment_with_non_unicode_variables_is_read() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let prefix = "IMAGE_NON_UNICODE_ENV_";
        std::env::set_var("IMAGE_NON_UNICODE_ENV_CONTROLLER", "registry/x:1");
        std::env::set_var("IMAGE_NON_UNICODE_ENV_WEBHOOK", OsStr::from_bytes(&[0xff, 0xfe]));
        std::env::set_var(OsStr::from_bytes(&[0xff, 0xfe]), "ignored");
        let images = images_from_env(prefix);
        std::env::remove_var("IMAGE_NON_UNICODE_ENV_CONTROLLER");
        std::env::remove_var("IMAGE_NON_UNICODE_ENV_WEBHOOK");
        std::env::remove_var(OsStr::from_bytes(&[0xff, 0xfe]));

        assert_eq!(images.len(), 1);
        assert_eq!(images.get("controller").map(String::as_str), Some("registry/x:1"));
    }

    #[test]
    fn deployment_image_arguments_with_equals() {
        let mut images = ImageOverrides::new();
        images.insert("arg__shell_image".to_owned(), "registry/shell:2".to_owned());
        let t = DeploymentImages(images);
        let d = apply(
            &t,
            deployment(json!([{ "name": "c", "args": ["-shell-image=busybox", "-shell-image"] }])),
        );
        assert_eq!(
            d.pointer("/spec/template/spec/containers/0/args"),
            Some(&json!(["-shell-image=registry/shell:2", "-shell-image"]))
        );
    }

    #[test]
    fn task_images_replace_steps_and_params() {
        let mut images = ImageOverrides::new();
        images.insert("build_step".to_owned(), "registry/build:1".to_owned());
        images.insert("param_builder_image".to_owned(), "registry/builder:1".to_owned());
        let t = TaskImages(images);
        let d = apply(
            &t,
            json!({
                "kind": "ClusterTask",
                "spec": {
                    "params": [{ "name": "BUILDER_IMAGE", "default": "old" }, { "name": "X" }],
                    "steps": [{ "name": "build-step", "image": "old" }, { "name": "push", "image": "p" }]
                }
            }),
        );
        assert_eq!(d.pointer("/spec/steps/0/image"), Some(&json!("registry/build:1")));
        assert_eq!(d.pointer("/spec/steps/1/image"), Some(&json!("p")));
        assert_eq!(d.pointer("/spec/params/0/default"), Some(&json!("registry/builder:1")));
        assert_eq!(d.pointer("/spec/params/1/default"), None);

        let task = json!({ "kind": "Task", "spec": { "steps": [{ "name": "build-step", "image": "old" }] } });
        assert_eq!(apply(&t, task.clone()).as_value(), &task);
    }

    #[test]
    fn role_bindings_are_moved_last() {
        let manifest = Manifest::new(vec![
            doc(json!({ "kind": "RoleBinding", "metadata": { "name": "rb" }, "subjects": [] })),
            doc(json!({ "kind": "ConfigMap", "metadata": { "name": "config-defaults" } })),
            doc(json!({ "kind": "Namespace", "metadata": { "name": "tekton-pipelines" } })),
        ]);
        let extra = |d: &mut Document| -> Result<Disposition, Error> {
            d.set_label("extra", "yes");
            Ok(Disposition::Keep)
        };
        let out = transform_manifest(&manifest, &owner(), &OperatorConfig::default(), &[&extra])
            .unwrap();
        let kinds: Vec<_> = out.documents().iter().map(|d| d.kind()).collect();
        assert_eq!(kinds, vec!["ConfigMap", "Namespace", "RoleBinding"]);
        let cm = &out.documents()[0];
        assert_eq!(cm.namespace(), Some("foo"));
        assert_eq!(cm.label("extra"), Some("yes"));
        assert_eq!(cm.pointer("/data/default-service-account"), Some(&json!("pipeline")));
        assert_eq!(out.documents()[1].name(), "foo");
        let rb = &out.documents()[2];
        assert_eq!(rb.namespace(), Some("foo"));
        assert_eq!(rb.label("extra"), None);
        assert_eq!(rb.owner_references().unwrap().len(), 1);
    }

    #[test]
    fn rejected_documents_are_dropped() {
        let manifest = Manifest::new(vec![
            doc(json!({ "kind": "ConfigMap", "metadata": { "name": "a" } })),
            doc(json!({ "kind": "Secret", "metadata": { "name": "b" } })),
        ]);
        let no_secrets = |d: &mut Document| -> Result<Disposition, Error> {
            Ok(if d.kind() == "Secret" {
                Disposition::Reject
            } else {
                Disposition::Keep
            })
        };
        let out = manifest.transform(&[&no_secrets]).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn failing_transform_aborts_chain() {
        let manifest = Manifest::new(vec![doc(json!({ "kind": "ConfigMap" }))]);
        let fail = |_: &mut Document| -> Result<Disposition, Error> {
            Err(Error::TransformError("boom".to_owned()))
        };
        assert!(manifest.transform(&[&fail]).is_err());
    }
}
