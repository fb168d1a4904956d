use anyhow::{anyhow, Context};
use std::env;
use std::fs;
use std::path::Path;

/// Name of the probe binary inside sslcount-probes; also the file aya-build
/// writes into OUT_DIR.
const PROBE_BINARY: &str = "sslcount";

fn main() -> anyhow::Result<()> {
    println!("cargo:rerun-if-env-changed=CI");
    println!("cargo:rerun-if-env-changed=PATH");

    // Skip eBPF build if we're already building for the eBPF target
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default() == "bpf" {
        return Ok(());
    }

    let out_dir = env::var("OUT_DIR")?;
    let probe_path = Path::new(&out_dir).join(PROBE_BINARY);

    if let Some(reason) = skip_reason() {
        println!("cargo:warning=eBPF compilation skipped: {}", reason);
        // Both loaders embed this file; an empty object is rejected at
        // runtime with a clear error instead of failing the host build.
        if !probe_path.exists() {
            fs::write(&probe_path, []).context("writing placeholder probe object")?;
        }
        return Ok(());
    }

    // The probe crate sits outside the workspace; aya-build compiles it from
    // its own directory.
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let probes_dir = Path::new(&manifest_dir).join("sslcount-probes");
    let probes_dir = probes_dir
        .to_str()
        .ok_or_else(|| anyhow!("non UTF-8 path {}", probes_dir.display()))?;

    let probes = aya_build::Package {
        name: "sslcount-probes",
        root_dir: probes_dir,
        ..Default::default()
    };
    aya_build::build_ebpf([probes], aya_build::Toolchain::default())?;

    if !probe_path.exists() {
        return Err(anyhow!(
            "eBPF probe compilation failed: {} not found",
            probe_path.display()
        ));
    }

    Ok(())
}

fn bpf_linker_available() -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join("bpf-linker").is_file()))
        .unwrap_or(false)
}

fn skip_reason() -> Option<String> {
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "linux" {
        return Some("target is not Linux".to_string());
    }
    // No bpf-linker in CI
    if env::var("CI").is_ok() {
        return Some("running in CI".to_string());
    }
    if !bpf_linker_available() {
        return Some("bpf-linker not found in PATH".to_string());
    }
    None
}
