static OUT_DIR: &str = "src/generated";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto");

    // generated into the source tree so the types are visible to editors;
    // `proto.rs` pulls them in with `include!`
    std::fs::create_dir_all(OUT_DIR)?;

    tonic_build::configure()
        .build_client(false)
        .build_server(false)
        .out_dir(OUT_DIR)
        .compile(&["proto/room.proto", "proto/pairing.proto"], &["proto"])?;
    Ok(())
}
