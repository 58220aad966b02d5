use std::env;

const DEFAULT_LIB_DIR: &str = "/usr/local/lib/nuance-omnipage-csdk-lib64-19.2";

fn main() {
    println!("cargo:rerun-if-env-changed=OMNIPAGE_LIB_DIR");

    // Only the native binding needs the SDK on the link line.
    if env::var_os("CARGO_FEATURE_OMNIPAGE").is_none() {
        return;
    }

    let lib_dir = env::var("OMNIPAGE_LIB_DIR").unwrap_or_else(|_| DEFAULT_LIB_DIR.to_string());

    println!("cargo:rustc-link-search=native={lib_dir}");
    for lib in ["nuancec", "recapiplus", "kernelapi", "recpdf"] {
        println!("cargo:rustc-link-lib=dylib={lib}");
    }
    println!("cargo:rustc-link-arg=-Wl,-rpath,{lib_dir}");
}
