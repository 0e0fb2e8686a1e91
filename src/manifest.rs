//! Outputs manifest handed over by the build orchestrator.
//!
//! The engine does not decide what files a build produced; the
//! orchestrator lists them here, per module and in emission order,
//! together with the project identity and the explicit ignore
//! configuration.

use crate::artifact::{ArtifactRef, IgnoreRules, ModuleOutputSet};
use crate::environment::BuildEnv;
use crate::record::{ProjectIdentity, ScmInfo};
use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn default_build_tool() -> String {
    "mvn".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ScmEntry {
    pub uri: String,
    pub tag: String,
}

/// One declared artifact: classifier/extension identity plus the local
/// file the build produced for it (absent when never materialized).
#[derive(Debug, Deserialize)]
pub struct ArtifactEntry {
    #[serde(default)]
    pub classifier: String,
    pub extension: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// One module's declared outputs.
#[derive(Debug, Deserialize)]
pub struct ModuleEntry {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default)]
    pub descriptor: Option<PathBuf>,
    #[serde(default)]
    pub consumer_descriptor: Option<PathBuf>,
    #[serde(default)]
    pub main: Option<ArtifactEntry>,
    #[serde(default)]
    pub attached: Vec<ArtifactEntry>,
    /// Module-specific ignore globs; when absent the aggregator-level
    /// configuration applies.
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub ignore_javadoc: Option<bool>,
}

impl ModuleEntry {
    fn artifact(&self, entry: &ArtifactEntry) -> ArtifactRef {
        let mut artifact = ArtifactRef::new(
            &self.group_id,
            &self.artifact_id,
            &self.version,
            &entry.classifier,
            &entry.extension,
        );
        artifact.file = entry.file.clone();
        artifact
    }

    /// Materialize the recording input for this module.
    pub fn output_set(&self, default_ignore_javadoc: bool) -> Result<ModuleOutputSet> {
        let ignore = if self.ignore.is_some() || self.ignore_javadoc.is_some() {
            let patterns = self.ignore.clone().unwrap_or_default();
            Some(IgnoreRules::new(
                &patterns,
                self.ignore_javadoc.unwrap_or(default_ignore_javadoc),
            )?)
        } else {
            None
        };
        Ok(ModuleOutputSet {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            descriptor_file: self.descriptor.clone(),
            consumer_descriptor: self.consumer_descriptor.clone(),
            main: self.main.as_ref().map(|entry| self.artifact(entry)),
            attached: self
                .attached
                .iter()
                .map(|entry| self.artifact(entry))
                .collect(),
            ignore,
        })
    }
}

/// Root manifest: project identity, environment hints, ignore and skip
/// configuration, and the module list.
#[derive(Debug, Deserialize)]
pub struct OutputsManifest {
    pub name: String,
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default)]
    pub scm: Option<ScmEntry>,
    #[serde(default = "default_build_tool")]
    pub build_tool: String,
    #[serde(default)]
    pub build_tool_version: Option<String>,
    /// JDK toolchain version the orchestrator resolved, if any.
    #[serde(default)]
    pub toolchain_jdk: Option<String>,
    #[serde(default)]
    pub java_version: Option<String>,
    #[serde(default)]
    pub java_vendor: Option<String>,
    /// Aggregator-level ignore globs, matched against
    /// `group/filename`.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default = "default_true")]
    pub ignore_javadoc: bool,
    /// Modules excluded from recording, as globs matched against
    /// `group/artifactId`.
    #[serde(default)]
    pub skip_modules: Vec<String>,
    pub modules: Vec<ModuleEntry>,
}

impl OutputsManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parse manifest {}", path.display()))
    }

    pub fn project_identity(&self) -> ProjectIdentity {
        ProjectIdentity {
            name: self.name.clone(),
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            scm: self.scm.as_ref().map(|scm| ScmInfo {
                uri: scm.uri.clone(),
                tag: scm.tag.clone(),
            }),
        }
    }

    /// Local environment, with manifest-supplied toolchain detail
    /// taking precedence over what the process can observe.
    pub fn build_env(&self) -> BuildEnv {
        let mut env = BuildEnv::capture();
        if self.java_version.is_some() {
            env.java_version = self.java_version.clone();
        }
        if self.java_vendor.is_some() {
            env.java_vendor = self.java_vendor.clone();
        }
        env
    }

    pub fn fallback_rules(&self) -> Result<IgnoreRules> {
        IgnoreRules::new(&self.ignore, self.ignore_javadoc)
    }

    /// Modules left after applying the skip globs, in manifest order.
    pub fn active_modules(&self) -> Result<Vec<&ModuleEntry>> {
        let skip = compile_globs(&self.skip_modules)?;
        let mut active = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            let key = format!("{}/{}", module.group_id, module.artifact_id);
            if skip.is_match(Path::new(&key)) {
                info!(module = %key, "skipping module per skip configuration");
                continue;
            }
            active.push(module);
        }
        Ok(active)
    }

    /// Aggregate mode when more than one module survives skipping.
    pub fn aggregate(&self) -> Result<bool> {
        Ok(self.active_modules()?.len() > 1)
    }
}

fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid skip glob {pattern}"))?;
        builder.add(glob);
    }
    builder.build().context("compile skip globs")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "Widget",
        "group_id": "org.acme",
        "artifact_id": "widget",
        "version": "1.0",
        "scm": {"uri": "scm:git:https://example.org/widget.git", "tag": "widget-1.0"},
        "toolchain_jdk": "17.0.2",
        "ignore": ["*/*.xml"],
        "skip_modules": ["org.acme/widget-it*"],
        "modules": [
            {
                "group_id": "org.acme",
                "artifact_id": "widget",
                "version": "1.0",
                "descriptor": "/work/pom.xml",
                "main": {"extension": "jar", "file": "/work/target/widget-1.0.jar"},
                "attached": [
                    {"classifier": "sources", "extension": "jar", "file": "/work/target/widget-1.0-sources.jar"}
                ]
            },
            {
                "group_id": "org.acme",
                "artifact_id": "widget-it-suite",
                "version": "1.0",
                "descriptor": "/work/it/pom.xml"
            }
        ]
    }"#;

    #[test]
    fn parses_and_applies_skip_globs() {
        let manifest: OutputsManifest = serde_json::from_str(SAMPLE).expect("parse manifest");
        assert_eq!(manifest.build_tool, "mvn");
        assert!(manifest.ignore_javadoc);
        let active = manifest.active_modules().expect("active modules");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].artifact_id, "widget");
        assert!(!manifest.aggregate().expect("aggregate"));
    }

    #[test]
    fn module_converts_to_output_set() {
        let manifest: OutputsManifest = serde_json::from_str(SAMPLE).expect("parse manifest");
        let set = manifest.modules[0].output_set(true).expect("output set");
        assert_eq!(set.attached.len(), 1);
        assert_eq!(set.attached[0].canonical_filename(), "widget-1.0-sources.jar");
        let main = set.main.expect("main artifact");
        assert_eq!(main.canonical_filename(), "widget-1.0.jar");
        assert!(set.ignore.is_none(), "module defers to fallback rules");
    }
}
