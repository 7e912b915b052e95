use anyhow::Result;
use chrono::TimeZone;
use std::env;
use std::fs;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    // Generate git information
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("error occurred while generating instructions: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }

    // Add build timestamp
    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => chrono::Utc
            .timestamp_opt(val.parse::<i64>()?, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("SOURCE_DATE_EPOCH out of range: {val}"))?,
        Err(_) => chrono::Utc::now(),
    };

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    // Get oggopus library version using cargo metadata
    let oggopus_version = get_oggopus_version_from_metadata().unwrap_or_else(|_| {
        read_oggopus_version_fallback().unwrap_or_else(|_| "unknown".to_string())
    });
    println!("cargo:rustc-env=OGGOPUS_VERSION={oggopus_version}");

    // Tell cargo to rerun this build script if the oggopus Cargo.toml changes
    println!("cargo:rerun-if-changed=oggopus/Cargo.toml");

    Ok(())
}

/// Library version from `cargo metadata`, covering path and registry dependencies
fn get_oggopus_version_from_metadata() -> Result<String> {
    let output = Command::new("cargo")
        .args(["metadata", "--format-version", "1"])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("cargo metadata failed");
    }

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;

    let from_packages = metadata["packages"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|package| package["name"] == "oggopus")
        .and_then(|package| package["version"].as_str());

    // Resolved node ids look like "oggopus 0.1.0 (registry+...)"
    let from_resolve = || {
        metadata["resolve"]["nodes"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|node| node["id"].as_str())
            .find_map(|id| id.strip_prefix("oggopus ")?.split(' ').next())
    };

    from_packages
        .or_else(from_resolve)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("oggopus package not found in metadata"))
}

/// Reads the version straight from oggopus/Cargo.toml
fn read_oggopus_version_fallback() -> Result<String> {
    let toml_content = fs::read_to_string("oggopus/Cargo.toml")?;

    toml_content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("version"))
        .filter_map(|rest| rest.trim_start().strip_prefix('='))
        .map(|value| value.trim().trim_matches('"').trim_matches('\'').to_string())
        .next()
        .ok_or_else(|| anyhow::anyhow!("Could not find version in oggopus/Cargo.toml"))
}
