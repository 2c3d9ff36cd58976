//! Prints the HostInfo CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/hostinfo.yaml`

use crds::HostInfo;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&HostInfo::crd())?);
    Ok(())
}
