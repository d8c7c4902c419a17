//! Build script for symbase-core
//!
//! Checks the toolchain before compilation:
//! - Minimum Rust version (workspace lint tables need Rust 1.74.0+)
//! - Pointer width of the target (labels and addresses are stored as 64-bit values)

fn main()
{
    let min_rust_version = rustc_version::Version::new(1, 74, 0);

    match rustc_version::version() {
        Ok(rustc_version) if rustc_version < min_rust_version => {
            panic!("symbase-core requires Rust {min_rust_version} or newer, found {rustc_version}");
        }
        Ok(_) => {}
        // Some build environments hide the compiler version
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    if std::env::var("CARGO_CFG_TARGET_POINTER_WIDTH").as_deref() == Ok("16") {
        panic!("symbase-core does not support 16-bit targets");
    }

    println!("cargo:rerun-if-changed=build.rs");
}
