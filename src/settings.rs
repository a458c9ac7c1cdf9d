use clap::{ArgAction, Args};
use std::path::{Path, PathBuf};

use crate::util::Error;

/// Name of the honored `Config` resource.
pub const CLUSTER_CR_NAME: &str = "cluster";

/// Namespace the components are installed into unless overridden.
pub const DEFAULT_TARGET_NAMESPACE: &str = "openshift-pipelines";

/// Service account written into the `config-defaults` ConfigMap.
pub const DEFAULT_SA: &str = "pipeline";

/// Release the bundled manifests correspond to.
pub const DEFAULT_VERSION: &str = "release-next";

/// File holding the operator's identity when no flag provides one.
pub const UUID_PATH: &str = "deploy/uuid";

/// Task catalog entries installed by the community phase.
pub const COMMUNITY_RESOURCE_URLS: [&str; 4] = [
    "https://raw.githubusercontent.com/tektoncd/catalog/master/jib-maven/jib-maven.yaml",
    "https://raw.githubusercontent.com/tektoncd/catalog/master/maven/maven.yaml",
    "https://raw.githubusercontent.com/tektoncd/catalog/master/tkn/tkn.yaml",
    "https://raw.githubusercontent.com/tektoncd/catalog/master/kn/kn.yaml",
];

fn default_community_urls() -> Vec<String> {
    COMMUNITY_RESOURCE_URLS.iter().map(|s| s.to_string()).collect()
}

/// Command line flags that shape the installation.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Cluster-wide resource that the operator honors.
    #[arg(long, env = "WATCH_RESOURCE", default_value = CLUSTER_CR_NAME)]
    pub watch_resource: String,

    /// Namespace where the pipelines components will be installed.
    #[arg(long, env = "TARGET_NAMESPACE", default_value = DEFAULT_TARGET_NAMESPACE)]
    pub target_namespace: String,

    /// Path to the resource manifests. Defaults to deploy/resources/<version>.
    #[arg(long, env = "RESOURCE_DIR")]
    pub resource_dir: Option<PathBuf>,

    /// Apply the manifest files in the resource directory recursively.
    #[arg(long, env = "RECURSIVE", default_value_t = true, action = ArgAction::Set)]
    pub recursive: bool,

    /// Do not create the watched resource at startup.
    #[arg(long, env = "NO_AUTO_INSTALL")]
    pub no_auto_install: bool,

    /// Skip the tasks that are not supported or owned by Red Hat.
    #[arg(long, env = "SKIP_NON_REDHAT")]
    pub skip_non_redhat: bool,

    /// Comma separated list of community task manifests.
    #[arg(
        long,
        env = "COMMUNITY_RESOURCE_URLS",
        value_delimiter = ',',
        default_values_t = default_community_urls()
    )]
    pub community_resource_urls: Vec<String>,

    /// Service account that pipelines run as by default.
    #[arg(long = "rbac-sa", env = "DEFAULT_SA", default_value = DEFAULT_SA)]
    pub default_sa: String,

    /// Value of the disable-affinity-assistant feature flag.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub disable_affinity_assistant: bool,

    /// Identity of this operator installation. Read from deploy/uuid if omitted.
    #[arg(long, env = "OPERATOR_UUID")]
    pub operator_uuid: Option<String>,

    /// Target release of the installation.
    #[arg(long = "target-version", env = "TEKTON_VERSION", default_value = DEFAULT_VERSION)]
    pub version: String,
}

/// Immutable operator configuration, built once at startup and
/// shared with the controller through its context.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    pub watch_resource: String,
    pub target_namespace: String,
    pub resource_dir: PathBuf,
    pub recursive: bool,
    pub auto_install: bool,
    pub skip_non_redhat: bool,
    pub community_resource_urls: Vec<String>,
    pub default_sa: String,
    pub disable_affinity_assistant: bool,
    pub operator_uuid: String,
    pub version: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            watch_resource: CLUSTER_CR_NAME.to_owned(),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_owned(),
            resource_dir: default_resource_dir(DEFAULT_VERSION),
            recursive: true,
            auto_install: true,
            skip_non_redhat: false,
            community_resource_urls: default_community_urls(),
            default_sa: DEFAULT_SA.to_owned(),
            disable_affinity_assistant: true,
            operator_uuid: String::new(),
            version: DEFAULT_VERSION.to_owned(),
        }
    }
}

fn default_resource_dir(version: &str) -> PathBuf {
    Path::new("deploy").join("resources").join(version)
}

/// Reads the operator identity from `path`. A missing file yields
/// an empty identity, which matches any recorded one.
fn read_uuid(path: &Path) -> Result<String, Error> {
    match std::fs::read_to_string(path) {
        Ok(uuid) => Ok(uuid.trim_end_matches('\n').to_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

impl OperatorConfig {
    /// Resolves the parsed flags into the final configuration.
    pub fn from_settings(settings: Settings) -> Result<Self, Error> {
        let version = settings.version;
        let operator_uuid = match settings.operator_uuid {
            Some(uuid) => uuid,
            None => read_uuid(Path::new(UUID_PATH))?,
        };
        let resource_dir = settings
            .resource_dir
            .unwrap_or_else(|| default_resource_dir(&version));
        Ok(OperatorConfig {
            watch_resource: settings.watch_resource,
            target_namespace: settings.target_namespace,
            resource_dir,
            recursive: settings.recursive,
            auto_install: !settings.no_auto_install,
            skip_non_redhat: settings.skip_non_redhat,
            community_resource_urls: settings.community_resource_urls,
            default_sa: settings.default_sa,
            disable_affinity_assistant: settings.disable_affinity_assistant,
            operator_uuid,
            version,
        })
    }

    /// Directory holding the manifests of one component group.
    pub fn component_dir(&self, component: &str) -> PathBuf {
        self.resource_dir.join(component)
    }
}
