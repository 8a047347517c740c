//! Build script for fwpolicy
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! reported by the `health` command.

fn main() {
    println!("cargo:rerun-if-env-changed=FWPOLICY_DATA_DIR");

    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
