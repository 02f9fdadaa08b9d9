use std::env;

fn main() {
    // cuDNN is linked only when the feature is requested. CUDNN_PATH points at
    // an extracted cuDNN tree when the library is not on the default search path.
    if env::var("CARGO_FEATURE_CUDNN").is_ok() {
        if let Ok(cudnn_path) = env::var("CUDNN_PATH") {
            println!("cargo:rustc-link-search=native={}/lib", cudnn_path);
            println!("cargo:rustc-link-arg=-Wl,-rpath,{}/lib", cudnn_path);
        }
        println!("cargo:rustc-link-lib=cudnn");
    }
    println!("cargo:rerun-if-env-changed=CUDNN_PATH");
}
