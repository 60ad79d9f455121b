//! Prints the BridgeInstance CustomResourceDefinition as YAML

use crds::BridgeInstance;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&BridgeInstance::crd())?);
    Ok(())
}
