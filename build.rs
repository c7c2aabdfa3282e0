fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/deviceplugin.proto");

    // Compile the kubelet device plugin API (server for DevicePlugin,
    // client for Registration)
    tonic_build::compile_protos("proto/deviceplugin.proto")?;

    Ok(())
}
