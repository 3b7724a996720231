fn main() {
    // macOS: CBCentralManager refuses to scan unless the binary embeds an
    // Info.plist with NSBluetoothAlwaysUsageDescription. For CLI tools the
    // plist goes into the __TEXT,__info_plist Mach-O section via the linker.
    // CARGO_CFG_TARGET_OS reflects the target, so cross-compiling works too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir =
            std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set by Cargo");
        println!("cargo:rustc-link-arg=-sectcreate");
        println!("cargo:rustc-link-arg=__TEXT");
        println!("cargo:rustc-link-arg=__info_plist");
        println!("cargo:rustc-link-arg={dir}/Info.plist");
        println!("cargo:rerun-if-changed=Info.plist");
    }
}
