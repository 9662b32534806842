//! Build script for dwf-sys.
//!
//! The WaveForms runtime ships as a prebuilt shared library in a
//! platform-specific location, so this script only emits link directives.
//! Nothing is linked unless the `dwf-sdk` feature is enabled.

use std::env;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-env-changed=DWF_LIB_DIR");

    if env::var_os("CARGO_FEATURE_DWF_SDK").is_none() {
        return;
    }

    if let Ok(dir) = env::var("DWF_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    match target_os.as_str() {
        "macos" => {
            println!("cargo:rustc-link-search=framework=/Library/Frameworks");
            println!("cargo:rustc-link-lib=framework=dwf");
        }
        "windows" => {
            let sdk_paths = [
                "C:\\Program Files (x86)\\Digilent\\WaveFormsSDK\\lib\\x64",
                "C:\\Program Files\\Digilent\\WaveFormsSDK\\lib\\x64",
            ];
            for path in sdk_paths {
                if Path::new(path).join("dwf.lib").exists() {
                    println!("cargo:rustc-link-search=native={}", path);
                    break;
                }
            }
            println!("cargo:rustc-link-lib=dylib=dwf");
        }
        _ => {
            let lib_paths = ["/usr/lib", "/usr/local/lib", "/usr/lib/x86_64-linux-gnu"];
            for path in lib_paths {
                if Path::new(path).join("libdwf.so").exists() {
                    println!("cargo:rustc-link-search=native={}", path);
                    break;
                }
            }
            println!("cargo:rustc-link-lib=dylib=dwf");
        }
    }
}
