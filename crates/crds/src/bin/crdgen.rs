//! Prints the AppService CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p appservice-crds --bin crdgen > appservice-crd.yaml`

use anyhow::Context;
use crds::AppService;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = AppService::crd();
    let yaml = serde_yaml::to_string(&crd).context("serialize AppService CRD to YAML")?;
    print!("{}", yaml);
    Ok(())
}
