// kcc-conformance: runs the Kayte compiler conformance suite.
// Usage: kcc-conformance run --builtin --config harness.yaml

fn main() {
    kcc_conformance::cli::run();
}
