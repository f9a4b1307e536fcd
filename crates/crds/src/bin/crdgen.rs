//! Prints every CRD served by the operator as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/crds.yaml`

fn main() -> Result<(), serde_yaml::Error> {
    for crd in crds::all_crds() {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
