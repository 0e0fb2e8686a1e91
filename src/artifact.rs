//! Artifact identity, canonical naming, and ignore rules.
//!
//! An artifact's canonical filename is a pure function of its identity;
//! the local on-disk name may legitimately differ when a module
//! customizes its final name, so matching is always keyed on the
//! canonical form.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

/// Extension of the primary package descriptor artifact.
pub const DESCRIPTOR_EXTENSION: &str = "pom";

/// Synthetic classifier recorded for the build descriptor when a
/// transient consumer descriptor has been published in its place.
pub const BUILD_DESCRIPTOR_CLASSIFIER: &str = "build";

/// Classifier of the transient consumer descriptor attachment.
pub const CONSUMER_DESCRIPTOR_CLASSIFIER: &str = "consumer";

/// A single named build output.
///
/// Identity is group + artifact + base version + classifier + extension;
/// `file` is an attribute, not part of identity — an artifact may be
/// declared without having been materialized on disk.
#[derive(Clone, Debug)]
pub struct ArtifactRef {
    pub group_id: String,
    pub artifact_id: String,
    pub base_version: String,
    /// Empty when the artifact has no classifier.
    pub classifier: String,
    /// Empty when the artifact has no extension.
    pub extension: String,
    pub file: Option<PathBuf>,
}

impl PartialEq for ArtifactRef {
    fn eq(&self, other: &Self) -> bool {
        self.group_id == other.group_id
            && self.artifact_id == other.artifact_id
            && self.base_version == other.base_version
            && self.classifier == other.classifier
            && self.extension == other.extension
    }
}

impl Eq for ArtifactRef {}

impl ArtifactRef {
    pub fn new(
        group_id: &str,
        artifact_id: &str,
        base_version: &str,
        classifier: &str,
        extension: &str,
    ) -> Self {
        ArtifactRef {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            base_version: base_version.to_string(),
            classifier: classifier.to_string(),
            extension: extension.to_string(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Canonical repository filename:
    /// `artifactId-version[-classifier][.extension]`.
    pub fn canonical_filename(&self) -> String {
        let mut name = String::with_capacity(128);
        name.push_str(&self.artifact_id);
        name.push('-');
        name.push_str(&self.base_version);
        if !self.classifier.is_empty() {
            name.push('-');
            name.push_str(&self.classifier);
        }
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        name
    }

    /// Full coordinate string for log messages.
    pub fn id(&self) -> String {
        if self.classifier.is_empty() {
            format!(
                "{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.extension, self.base_version
            )
        } else {
            format!(
                "{}:{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.extension, self.classifier, self.base_version
            )
        }
    }

    /// Detached signatures are never fingerprinted.
    pub fn is_signature(&self) -> bool {
        self.extension == "asc" || self.extension.ends_with(".asc")
    }

    pub fn is_descriptor(&self) -> bool {
        self.extension == DESCRIPTOR_EXTENSION
    }
}

/// Ignore configuration for one module's recording call.
///
/// Rules are passed explicitly by the orchestrator (per module, with an
/// aggregator-level fallback), never looked up through ambient state.
#[derive(Debug)]
pub struct IgnoreRules {
    globs: GlobSet,
    pub ignore_javadoc: bool,
}

impl IgnoreRules {
    /// Compile glob patterns matched against `group/filename`.
    /// `*` does not cross the `/` separator, so `*/*.xml` means "any
    /// group, any xml filename".
    pub fn new(patterns: &[String], ignore_javadoc: bool) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid ignore glob {pattern}"))?;
            builder.add(glob);
        }
        Ok(IgnoreRules {
            globs: builder.build().context("compile ignore globs")?,
            ignore_javadoc,
        })
    }

    pub fn is_ignored(&self, group_id: &str, canonical_filename: &str) -> bool {
        let path = format!("{group_id}/{canonical_filename}");
        self.globs.is_match(Path::new(&path))
    }
}

/// A module's declared outputs in emission order: descriptor first,
/// optional consumer descriptor, optional main artifact, then
/// attachments.
#[derive(Debug)]
pub struct ModuleOutputSet {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    /// The build descriptor file on disk.
    pub descriptor_file: Option<PathBuf>,
    /// The transient consumer descriptor published in place of the
    /// build descriptor, when the build produced one.
    pub consumer_descriptor: Option<PathBuf>,
    /// Main binary artifact; descriptor-only modules have none.
    pub main: Option<ArtifactRef>,
    pub attached: Vec<ArtifactRef>,
    /// Module-specific ignore rules; the recorder falls back to the
    /// aggregator-level rules when absent.
    pub ignore: Option<IgnoreRules>,
}

impl ModuleOutputSet {
    /// The primary descriptor artifact. When a consumer descriptor was
    /// published it takes the primary slot; the build descriptor is
    /// then recorded separately under the `build` classifier.
    pub fn descriptor_artifact(&self) -> ArtifactRef {
        let mut artifact = ArtifactRef::new(
            &self.group_id,
            &self.artifact_id,
            &self.version,
            "",
            DESCRIPTOR_EXTENSION,
        );
        artifact.file = self
            .consumer_descriptor
            .clone()
            .or_else(|| self.descriptor_file.clone());
        artifact
    }

    /// The build descriptor under its synthetic classifier, present
    /// only when a consumer descriptor displaced it.
    pub fn build_descriptor_artifact(&self) -> Option<ArtifactRef> {
        self.consumer_descriptor.as_ref()?;
        let mut artifact = ArtifactRef::new(
            &self.group_id,
            &self.artifact_id,
            &self.version,
            BUILD_DESCRIPTOR_CLASSIFIER,
            DESCRIPTOR_EXTENSION,
        );
        artifact.file = self.descriptor_file.clone();
        Some(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_filename_without_classifier() {
        let artifact = ArtifactRef::new("org.acme", "widget", "1.0", "", "jar");
        assert_eq!(artifact.canonical_filename(), "widget-1.0.jar");
    }

    #[test]
    fn canonical_filename_with_classifier() {
        let artifact = ArtifactRef::new("org.acme", "widget", "1.0", "sources", "jar");
        assert_eq!(artifact.canonical_filename(), "widget-1.0-sources.jar");
    }

    #[test]
    fn canonical_filename_without_extension() {
        let artifact = ArtifactRef::new("org.acme", "widget", "1.0", "", "");
        assert_eq!(artifact.canonical_filename(), "widget-1.0");
    }

    #[test]
    fn identity_ignores_file_attribute() {
        let a = ArtifactRef::new("g", "a", "1", "", "jar");
        let b = ArtifactRef::new("g", "a", "1", "", "jar").with_file("/tmp/other.jar");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_extensions_detected() {
        assert!(ArtifactRef::new("g", "a", "1", "", "asc").is_signature());
        assert!(ArtifactRef::new("g", "a", "1", "", "jar.asc").is_signature());
        assert!(!ArtifactRef::new("g", "a", "1", "", "jar").is_signature());
    }

    #[test]
    fn ignore_glob_matches_group_and_filename() {
        let rules = IgnoreRules::new(&["*/*.asc".to_string()], true).unwrap();
        assert!(rules.is_ignored("org.acme", "widget-1.0.jar.asc"));
        assert!(!rules.is_ignored("org.acme", "widget-1.0.jar"));
    }

    #[test]
    fn ignore_glob_star_does_not_cross_separator() {
        let rules = IgnoreRules::new(&["*.xml".to_string()], true).unwrap();
        // Pattern has no group component, so it never matches.
        assert!(!rules.is_ignored("org.acme", "site-1.0.xml"));
    }

    #[test]
    fn build_descriptor_only_with_consumer() {
        let module = ModuleOutputSet {
            group_id: "g".into(),
            artifact_id: "a".into(),
            version: "1".into(),
            descriptor_file: Some("/tmp/pom.xml".into()),
            consumer_descriptor: None,
            main: None,
            attached: Vec::new(),
            ignore: None,
        };
        assert!(module.build_descriptor_artifact().is_none());
        let descriptor = module.descriptor_artifact();
        assert_eq!(descriptor.file.as_deref(), Some(Path::new("/tmp/pom.xml")));
    }
}
