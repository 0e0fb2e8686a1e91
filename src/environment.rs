//! Local build-environment capture and the coarsening used in
//! reproducible mode.
//!
//! Reproducible records must themselves be byte-identical across
//! machines, so environment detail collapses to a major toolchain
//! version and a two-family OS classification keyed on the platform
//! line-separator convention.

use std::env;

/// Environment of the machine that produced the local build. The
/// toolchain fields come from the orchestrator (or the `JAVA_VERSION` /
/// `JAVA_VENDOR` environment variables); the engine does not probe
/// toolchains itself.
#[derive(Clone, Debug, Default)]
pub struct BuildEnv {
    pub java_version: Option<String>,
    pub java_vendor: Option<String>,
    pub os_name: String,
}

impl BuildEnv {
    pub fn capture() -> Self {
        BuildEnv {
            java_version: env::var("JAVA_VERSION").ok(),
            java_vendor: env::var("JAVA_VENDOR").ok(),
            os_name: env::consts::OS.to_string(),
        }
    }
}

/// OS family by line-separator convention, the only distinction that
/// survives into a reproducible record.
pub fn os_family() -> &'static str {
    if cfg!(windows) {
        "Windows"
    } else {
        "Unix"
    }
}

/// Major component of a JDK version string: `1.8.0_202` gives `8`,
/// `17-ea` gives `17`, `11.0.3` gives `11`.
pub fn java_major_version(version: &str) -> &str {
    let version = version.strip_prefix("1.").unwrap_or(version);
    let cut = version.find('.').or_else(|| version.find('-'));
    match cut {
        Some(index) => &version[..index],
        None => version,
    }
}
