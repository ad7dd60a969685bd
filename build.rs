use prost::Message;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/item.proto");

    // Parsed in-process; protoc is not required.
    let descriptors = protox::compile(["item.proto"], ["proto"])?;

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    std::fs::write(
        out_dir.join("item_descriptor.bin"),
        descriptors.encode_to_vec(),
    )?;

    prost_build::Config::new().compile_fds(descriptors)?;
    Ok(())
}
