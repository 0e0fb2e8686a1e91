//! Fingerprint record writing and parsing.
//!
//! A record is a line-oriented key=value document: an identity header
//! followed by one indexed entry per non-ignored artifact. Records are
//! staged in memory and flushed once; a partially written record is
//! never valid. For a fixed artifact list and fixed file contents the
//! serialized bytes are identical across runs (the header's environment
//! lines are deliberately coarse in reproducible mode so this holds
//! across machines too).

use crate::artifact::{
    ArtifactRef, IgnoreRules, ModuleOutputSet, CONSUMER_DESCRIPTOR_CLASSIFIER,
    DESCRIPTOR_EXTENSION,
};
use crate::digest;
use crate::environment::{java_major_version, os_family, BuildEnv};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const RECORD_VERSION: &str = "1.0";

/// Extension under which a record is published next to its artifacts.
pub const RECORD_EXTENSION: &str = "buildinfo";

/// Extension of the comparison report written next to the local record.
pub const REPORT_EXTENSION: &str = "buildcompare";

/// Source-control coordinates recorded for rebuilders.
#[derive(Clone, Debug)]
pub struct ScmInfo {
    pub uri: String,
    pub tag: String,
}

/// Identity of the build whose outputs are being recorded.
#[derive(Clone, Debug)]
pub struct ProjectIdentity {
    pub name: String,
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub scm: Option<ScmInfo>,
}

/// Mapping from each declared artifact to its record prefix, in
/// emission order. `None` marks an ignored artifact, which is excluded
/// from pass/fail accounting but still reported.
#[derive(Debug, Default)]
pub struct ArtifactIndex {
    entries: Vec<(ArtifactRef, Option<String>)>,
}

impl ArtifactIndex {
    pub fn from_entries(entries: Vec<(ArtifactRef, Option<String>)>) -> Self {
        ArtifactIndex { entries }
    }

    pub fn entries(&self) -> &[(ArtifactRef, Option<String>)] {
        &self.entries
    }

    pub fn ignored_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, prefix)| prefix.is_none())
            .count()
    }
}

/// Writer for a fingerprint record, in full mode (local build) or as
/// the synthesis backend of a minimal reference record.
pub struct RecordWriter {
    out: String,
    aggregate: bool,
    module_index: usize,
    index: ArtifactIndex,
}

impl RecordWriter {
    pub fn new(aggregate: bool) -> Self {
        RecordWriter {
            out: String::new(),
            aggregate,
            module_index: 0,
            index: ArtifactIndex::default(),
        }
    }

    fn push_line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn push_blank(&mut self) {
        self.out.push('\n');
    }

    /// Emit the identity + source + environment header.
    #[allow(clippy::too_many_arguments)]
    pub fn write_header(
        &mut self,
        project: &ProjectIdentity,
        aggregate_module: Option<&str>,
        build_tool: &str,
        build_tool_version: Option<&str>,
        env: &BuildEnv,
        toolchain_jdk: Option<&str>,
        reproducible: bool,
    ) {
        self.push_line("# https://reproducible-builds.org/docs/jvm/");
        self.push_line(&format!("buildinfo.version={RECORD_VERSION}"));
        self.push_blank();
        self.push_line(&format!("name={}", project.name));
        self.push_line(&format!("group-id={}", project.group_id));
        self.push_line(&format!("artifact-id={}", project.artifact_id));
        self.push_line(&format!("version={}", project.version));
        self.push_blank();
        self.push_line("# source information");
        match &project.scm {
            Some(scm) => {
                self.push_line(&format!("source.scm.uri={}", scm.uri));
                self.push_line(&format!("source.scm.tag={}", scm.tag));
            }
            None => {
                self.push_line("# no scm configured");
                warn!("no source information available in record for rebuilders");
            }
        }
        self.push_blank();
        self.push_line("# build instructions");
        self.push_line(&format!("build-tool={build_tool}"));
        self.push_blank();
        if reproducible {
            self.push_line("# build environment information (simplified for reproducibility)");
            if let Some(version) = &env.java_version {
                self.push_line(&format!("java.version={}", java_major_version(version)));
            }
            self.push_line(&format!("os.name={}", os_family()));
        } else {
            self.push_line("# effective build environment information");
            if let Some(version) = &env.java_version {
                self.push_line(&format!("java.version={version}"));
            }
            if let Some(vendor) = &env.java_vendor {
                self.push_line(&format!("java.vendor={vendor}"));
            }
            self.push_line(&format!("os.name={}", env.os_name));
        }
        self.push_blank();
        self.push_line("# rebuild instructions and effective environment");
        if !reproducible {
            if let Some(version) = build_tool_version {
                self.push_line(&format!("{build_tool}.version={version}"));
            }
        }
        if let Some(jdk) = toolchain_jdk {
            let jdk = if reproducible {
                java_major_version(jdk)
            } else {
                jdk
            };
            self.push_line(&format!("{build_tool}.toolchain.jdk={jdk}"));
        }
        if self.aggregate {
            if let Some(module) = aggregate_module {
                self.push_line(&format!("{build_tool}.aggregate.artifact-id={module}"));
            }
        }
        self.push_blank();
        self.push_line(if self.aggregate {
            "# aggregated output"
        } else {
            "# output"
        });
    }

    /// Record a module's artifacts in fixed order: descriptor, build
    /// descriptor, main, attachments. `fallback_rules` is the
    /// aggregator-level ignore configuration, used when the module
    /// carries none of its own.
    pub fn write_module_artifacts(
        &mut self,
        module: &ModuleOutputSet,
        fallback_rules: Option<&IgnoreRules>,
    ) -> Result<()> {
        let prefix = if self.aggregate {
            let index = self.module_index;
            self.module_index += 1;
            self.push_blank();
            self.push_line(&format!(
                "outputs.{index}.coordinates={}:{}",
                module.group_id, module.artifact_id
            ));
            format!("outputs.{index}.")
        } else {
            "outputs.".to_string()
        };

        let rules = module.ignore.as_ref().or(fallback_rules);
        let mut next = 0usize;

        self.record_artifact(&prefix, &mut next, module.descriptor_artifact(), rules)?;
        if let Some(build_descriptor) = module.build_descriptor_artifact() {
            self.record_artifact(&prefix, &mut next, build_descriptor, rules)?;
        }
        if let Some(main) = &module.main {
            self.record_artifact(&prefix, &mut next, main.clone(), rules)?;
        }
        for attached in &module.attached {
            // The transient consumer descriptor was already folded into
            // the primary descriptor slot.
            if attached.is_descriptor() && attached.classifier == CONSUMER_DESCRIPTOR_CLASSIFIER {
                continue;
            }
            self.record_artifact(&prefix, &mut next, attached.clone(), rules)?;
        }
        Ok(())
    }

    fn record_artifact(
        &mut self,
        prefix: &str,
        next: &mut usize,
        artifact: ArtifactRef,
        rules: Option<&IgnoreRules>,
    ) -> Result<()> {
        let filename = artifact.canonical_filename();
        let ignore_javadoc = rules.is_none_or(|rules| rules.ignore_javadoc);
        let filtered = artifact.is_signature()
            || (ignore_javadoc && artifact.classifier == "javadoc")
            || rules.is_some_and(|rules| rules.is_ignored(&artifact.group_id, &filename));
        if filtered {
            self.push_line(&format!("# ignored {filename}"));
            self.index.entries.push((artifact, None));
            return Ok(());
        }

        let Some(file) = artifact.file.clone() else {
            warn!(artifact = %artifact.id(), "skipping artifact without a file");
            return Ok(());
        };
        if file.is_dir() {
            if artifact.is_descriptor() {
                // Known misconfiguration pattern: descriptor artifacts
                // pointing at a directory are skipped, not fatal.
                return Ok(());
            }
            bail!(
                "artifact {} points to a directory: {}. Packaging should be '{}'?",
                artifact.id(),
                file.display(),
                DESCRIPTOR_EXTENSION
            );
        }
        if !file.is_file() {
            warn!(
                artifact = %artifact.id(),
                file = %file.display(),
                "skipping artifact pointing at inexistent file"
            );
            return Ok(());
        }

        let entry_prefix = format!("{prefix}{next}");
        *next += 1;
        self.write_entry(&entry_prefix, &artifact.group_id, &file, &filename)?;
        self.index.entries.push((artifact, Some(entry_prefix)));
        Ok(())
    }

    /// Append one entry for an already-resolved file, named after the
    /// file itself. Used when synthesizing a reference record from
    /// downloaded artifacts.
    pub fn write_file_entry(&mut self, prefix: &str, group_id: &str, file: &Path) -> Result<()> {
        let filename = file
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("file has no usable name: {}", file.display()))?;
        self.write_entry(prefix, group_id, file, &filename)
    }

    fn write_entry(
        &mut self,
        prefix: &str,
        group_id: &str,
        file: &Path,
        filename: &str,
    ) -> Result<()> {
        let fp = digest::fingerprint(file)
            .with_context(|| format!("fingerprint {}", file.display()))?;
        self.push_blank();
        self.push_line(&format!("{prefix}.groupId={group_id}"));
        self.push_line(&format!("{prefix}.filename={filename}"));
        self.push_line(&format!("{prefix}.length={}", fp.length));
        self.push_line(&format!("{prefix}.checksums.sha512={}", fp.sha512));
        Ok(())
    }

    /// Inferred-environment block for a synthesized reference record.
    pub fn write_env_note(&mut self, java_version: Option<&str>, os_name: Option<&str>) {
        if java_version.is_none() && os_name.is_none() {
            return;
        }
        self.push_line("# effective build environment information");
        if let Some(version) = java_version {
            self.push_line(&format!("java.version={version}"));
        }
        if let Some(os) = os_name {
            self.push_line(&format!("os.name={os}"));
        }
    }

    /// Consume the writer, yielding the serialized record and the
    /// artifact index the comparator needs.
    pub fn finish(self) -> (String, ArtifactIndex) {
        (self.out, self.index)
    }
}

/// Write a finished record in one shot, creating parent directories.
pub fn save_record(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Parse a record into a flat key/value map. Comment and blank lines
/// are skipped; lines without `=` are ignored.
pub fn load_record_map(path: &Path) -> Result<BTreeMap<String, String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read record {}", path.display()))?;
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.to_string());
        }
    }
    Ok(map)
}

/// Restrict a record map to output entry keys, discarding the header
/// and the per-module coordinates lines.
pub fn output_entries(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .filter(|(key, _)| key.starts_with("outputs.") && !key.ends_with(".coordinates"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactRef;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;

    fn fixture_module(dir: &Path) -> ModuleOutputSet {
        let pom = dir.join("pom.xml");
        fs::write(&pom, "<project/>").expect("write pom");
        let jar = dir.join("widget-1.0.jar");
        fs::write(&jar, b"jar bytes").expect("write jar");
        ModuleOutputSet {
            group_id: "org.acme".into(),
            artifact_id: "widget".into(),
            version: "1.0".into(),
            descriptor_file: Some(pom),
            consumer_descriptor: None,
            main: Some(ArtifactRef::new("org.acme", "widget", "1.0", "", "jar").with_file(jar)),
            attached: Vec::new(),
            ignore: None,
        }
    }

    fn identity() -> ProjectIdentity {
        ProjectIdentity {
            name: "Widget".into(),
            group_id: "org.acme".into(),
            artifact_id: "widget".into(),
            version: "1.0".into(),
            scm: Some(ScmInfo {
                uri: "scm:git:https://example.org/widget.git".into(),
                tag: "widget-1.0".into(),
            }),
        }
    }

    fn reproducible_record(dir: &Path) -> (String, ArtifactIndex) {
        let module = fixture_module(dir);
        let mut writer = RecordWriter::new(false);
        writer.write_header(
            &identity(),
            None,
            "mvn",
            Some("3.9.6"),
            &BuildEnv {
                java_version: Some("17.0.2".into()),
                java_vendor: Some("Eclipse Adoptium".into()),
                os_name: "linux".into(),
            },
            None,
            true,
        );
        writer
            .write_module_artifacts(&module, None)
            .expect("record module");
        writer.finish()
    }

    #[test]
    fn reproducible_records_are_byte_identical() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let (first, _) = reproducible_record(dir.path());
        let (second, _) = reproducible_record(dir.path());
        assert_eq!(first, second);
    }

    #[test]
    fn record_round_trips_through_parser() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let (content, index) = reproducible_record(dir.path());
        let path = dir.path().join("widget-1.0.buildinfo");
        save_record(&path, &content).expect("save record");

        let entries = output_entries(&load_record_map(&path).expect("load record"));
        assert_eq!(entries.len(), index.entries().len() * 4);
        assert_eq!(
            entries.get("outputs.0.filename").map(String::as_str),
            Some("widget-1.0.pom")
        );
        assert_eq!(
            entries.get("outputs.1.filename").map(String::as_str),
            Some("widget-1.0.jar")
        );
        assert_eq!(
            entries.get("outputs.1.groupId").map(String::as_str),
            Some("org.acme")
        );
        assert!(entries.contains_key("outputs.1.checksums.sha512"));
    }

    #[test]
    fn ignored_artifact_becomes_comment_not_entry() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut module = fixture_module(dir.path());
        let asc = dir.path().join("widget-1.0.jar.asc");
        fs::write(&asc, "sig").expect("write signature");
        module
            .attached
            .push(ArtifactRef::new("org.acme", "widget", "1.0", "", "jar.asc").with_file(asc));

        let mut writer = RecordWriter::new(false);
        writer
            .write_module_artifacts(&module, None)
            .expect("record module");
        let (content, index) = writer.finish();

        assert!(content.contains("# ignored widget-1.0.jar.asc"));
        assert!(!content.contains("filename=widget-1.0.jar.asc"));
        assert_eq!(index.ignored_count(), 1);
    }

    #[test]
    fn glob_ignored_artifact_uses_fallback_rules() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut module = fixture_module(dir.path());
        let site = dir.path().join("widget-1.0-site.xml");
        fs::write(&site, "<site/>").expect("write site");
        module
            .attached
            .push(ArtifactRef::new("org.acme", "widget", "1.0", "site", "xml").with_file(site));

        let rules = IgnoreRules::new(&["*/*.xml".to_string()], true).expect("compile rules");
        let mut writer = RecordWriter::new(false);
        writer
            .write_module_artifacts(&module, Some(&rules))
            .expect("record module");
        let (content, _) = writer.finish();
        assert!(content.contains("# ignored widget-1.0-site.xml"));
    }

    #[test]
    fn directory_main_artifact_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut module = fixture_module(dir.path());
        let out_dir = dir.path().join("classes");
        fs::create_dir(&out_dir).expect("create classes dir");
        module.main =
            Some(ArtifactRef::new("org.acme", "widget", "1.0", "", "jar").with_file(out_dir));

        let mut writer = RecordWriter::new(false);
        let err = writer
            .write_module_artifacts(&module, None)
            .expect_err("directory must fail");
        assert!(err.to_string().contains("points to a directory"));
    }

    #[test]
    fn directory_descriptor_is_silently_skipped() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut module = fixture_module(dir.path());
        let pom_dir = dir.path().join("pom-dir");
        fs::create_dir(&pom_dir).expect("create pom dir");
        module.descriptor_file = Some(pom_dir);

        let mut writer = RecordWriter::new(false);
        writer
            .write_module_artifacts(&module, None)
            .expect("descriptor directory is not fatal");
        let (content, index) = writer.finish();
        // Only the main jar got an entry, at index 0.
        assert!(content.contains("outputs.0.filename=widget-1.0.jar"));
        assert_eq!(index.entries().len(), 1);
    }

    #[test]
    fn missing_file_warns_and_skips() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut module = fixture_module(dir.path());
        module.main = Some(
            ArtifactRef::new("org.acme", "widget", "1.0", "", "jar")
                .with_file(dir.path().join("not-built.jar")),
        );
        let mut writer = RecordWriter::new(false);
        writer
            .write_module_artifacts(&module, None)
            .expect("missing file is not fatal");
        let (_, index) = writer.finish();
        assert_eq!(index.entries().len(), 1); // descriptor only
    }

    #[test]
    fn consumer_descriptor_records_both_descriptors() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut module = fixture_module(dir.path());
        let consumer = dir.path().join("consumer.pom");
        fs::write(&consumer, "<project consumer='true'/>").expect("write consumer pom");
        module.consumer_descriptor = Some(consumer.clone());
        module.attached.push(
            ArtifactRef::new("org.acme", "widget", "1.0", "consumer", "pom").with_file(consumer),
        );

        let mut writer = RecordWriter::new(false);
        writer
            .write_module_artifacts(&module, None)
            .expect("record module");
        let (content, index) = writer.finish();

        assert!(content.contains("outputs.0.filename=widget-1.0.pom"));
        assert!(content.contains("outputs.1.filename=widget-1.0-build.pom"));
        assert!(content.contains("outputs.2.filename=widget-1.0.jar"));
        // The consumer attachment itself is not recorded again.
        assert_eq!(index.entries().len(), 3);
    }

    #[test]
    fn aggregate_mode_emits_coordinates_per_module() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let module = fixture_module(dir.path());
        let mut writer = RecordWriter::new(true);
        writer
            .write_module_artifacts(&module, None)
            .expect("record module");
        let (content, index) = writer.finish();
        assert!(content.contains("outputs.0.coordinates=org.acme:widget"));
        assert!(content.contains("outputs.0.0.filename=widget-1.0.pom"));
        assert_eq!(
            index.entries()[0].1.as_deref(),
            Some("outputs.0.0"),
            "descriptor prefix carries the module index"
        );
    }

    #[test]
    fn parser_ignores_comments_and_header() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path: PathBuf = dir.path().join("record");
        let mut file = File::create(&path).expect("create record");
        writeln!(file, "# comment\nname=Widget\n\noutputs.0.coordinates=g:a").expect("write");
        writeln!(file, "outputs.0.0.filename=a-1.jar").expect("write");
        drop(file);
        let map = load_record_map(&path).expect("load");
        assert_eq!(map.len(), 3);
        let entries = output_entries(&map);
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("outputs.0.0.filename"));
    }
}
