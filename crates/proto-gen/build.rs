// Build script to compile Protocol Buffer definitions

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Relay and directory are only ever called, never served, from here
    tonic_build::configure()
        .build_server(false)
        .compile_protos(
            &["../../proto/relay.proto", "../../proto/directory.proto"],
            &["../../proto/"],
        )?;

    // Tell Cargo to rerun if proto files change
    println!("cargo:rerun-if-changed=../../proto/relay.proto");
    println!("cargo:rerun-if-changed=../../proto/directory.proto");

    Ok(())
}
