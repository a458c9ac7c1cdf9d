use kube::CustomResourceExt;
use pipelines_types::Config;
use std::fs;

fn main() {
    println!("cargo:rerun-if-changed=types/src");
    let _ = fs::create_dir("crds");
    fs::write(
        "crds/operator.tekton.dev_config_crd.yaml",
        serde_yaml::to_string(&Config::crd()).unwrap(),
    )
    .unwrap();
}
