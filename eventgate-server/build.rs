fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Pass through EVENTGATE_GIT_HASH from packaged build environments
    println!("cargo:rerun-if-env-changed=EVENTGATE_GIT_HASH");
    if let Ok(hash) = std::env::var("EVENTGATE_GIT_HASH") {
        println!("cargo:rustc-env=EVENTGATE_GIT_HASH={}", hash);
    }
}
