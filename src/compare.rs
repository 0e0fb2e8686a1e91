//! Comparison of a local fingerprint record against a reference record.
//!
//! Matching is keyed on canonical filename with the owning group as
//! tie-break, never on raw local paths. Matched reference entries are
//! consumed so no two local artifacts can claim the same counterpart;
//! whatever remains in the reference pool afterwards had no local
//! counterpart at all.

use crate::artifact::ArtifactRef;
use crate::record::{load_record_map, output_entries, ArtifactIndex, REPORT_EXTENSION};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Whether a difference against the reference build fails the run or
/// only warns. Ignored artifacts never affect the decision.
#[derive(Clone, Copy, Debug)]
pub struct ComparePolicy {
    pub fail_on_difference: bool,
}

/// Everything the comparator needs for one run.
pub struct CompareInput<'a> {
    pub version: &'a str,
    pub local_record: &'a Path,
    pub reference_record: &'a Path,
    pub index: &'a ArtifactIndex,
    /// Directory holding the downloaded reference copies, for the
    /// remediation commands.
    pub reference_dir: &'a Path,
    /// Paths in logs and remediation lines are shown relative to this.
    pub base_dir: &'a Path,
}

/// Aggregate comparison outcome, persisted as a second deterministic
/// key/value record next to the local record.
#[derive(Debug, Default)]
pub struct ComparisonReport {
    pub version: String,
    pub ok: usize,
    pub ko: usize,
    pub ignored: usize,
    /// Reference-side artifacts with no local counterpart plus local
    /// artifacts whose reference was never found.
    pub missing: usize,
    pub ok_files: Vec<String>,
    pub ko_files: Vec<String>,
    pub ignored_files: Vec<String>,
    pub reference_java_version: Option<String>,
    pub reference_os_name: Option<String>,
    /// One ready-to-run content-diff invocation per mismatch, in
    /// artifact order.
    pub remediations: Vec<String>,
}

impl ComparisonReport {
    pub fn has_differences(&self) -> bool {
        self.ko + self.missing > 0
    }

    /// Serialize in the stable report format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut line = |text: String| {
            out.push_str(&text);
            out.push('\n');
        };
        line(format!("version={}", self.version));
        line(format!("ok={}", self.ok));
        line(format!("ko={}", self.ko));
        line(format!("ignored={}", self.ignored));
        line(format!("okFiles=\"{}\"", self.ok_files.join(" ")));
        line(format!("koFiles=\"{}\"", self.ko_files.join(" ")));
        line(format!("ignoredFiles=\"{}\"", self.ignored_files.join(" ")));
        if let Some(java_version) = &self.reference_java_version {
            line(format!("reference_java_version=\"{java_version}\""));
        }
        if let Some(os_name) = &self.reference_os_name {
            line(format!("reference_os_name=\"{os_name}\""));
        }
        for remediation in &self.remediations {
            line(format!("# {remediation}"));
        }
        out
    }
}

/// Compare the local record against the reference record, entry by
/// entry, classifying every indexed artifact.
pub fn compare(input: &CompareInput) -> Result<ComparisonReport> {
    let local_full = load_record_map(input.local_record)?;
    let mut actual = output_entries(&local_full);
    let reference_full = load_record_map(input.reference_record)?;
    let mut reference = output_entries(&reference_full);

    let mut report = ComparisonReport {
        version: input.version.to_string(),
        reference_java_version: reference_full.get("java.version").cloned(),
        reference_os_name: reference_full.get("os.name").cloned(),
        ..ComparisonReport::default()
    };

    for (artifact, prefix) in input.index.entries() {
        let Some(prefix) = prefix else {
            report.ignored_files.push(artifact.canonical_filename());
            continue;
        };
        let filename = take_local(&mut actual, prefix, "filename", artifact)?;
        let length = take_local(&mut actual, prefix, "length", artifact)?;
        let sha512 = take_local(&mut actual, prefix, "checksums.sha512", artifact)?;
        actual.remove(&format!("{prefix}.groupId"));

        let Some(reference_prefix) =
            take_reference_prefix(&mut reference, &artifact.group_id, &filename)
        else {
            warn!(file = %filename, "no reference counterpart was resolved");
            report.missing += 1;
            continue;
        };
        let reference_length = reference.remove(&format!("{reference_prefix}.length"));
        let reference_sha512 = reference.remove(&format!("{reference_prefix}.checksums.sha512"));
        reference.remove(&format!("{reference_prefix}.groupId"));

        // A size difference makes the hash difference redundant, so
        // size is checked first.
        let issue = if reference_length.as_deref() != Some(length.as_str()) {
            Some("size")
        } else if reference_sha512.as_deref() != Some(sha512.as_str()) {
            Some("sha512")
        } else {
            None
        };

        match issue {
            None => report.ok_files.push(filename),
            Some(issue) => {
                let remediation = remediation(artifact, input.reference_dir, input.base_dir);
                error!("{issue} mismatch {filename}: investigate with {remediation}");
                report.ko_files.push(filename);
                report.remediations.push(remediation);
            }
        }
    }

    // Each leftover reference artifact still carries its .filename key.
    report.missing += reference
        .keys()
        .filter(|key| key.ends_with(".filename"))
        .count();
    report.ok = report.ok_files.len();
    report.ko = report.ko_files.len();
    report.ignored = report.ignored_files.len();
    Ok(report)
}

fn take_local(
    actual: &mut BTreeMap<String, String>,
    prefix: &str,
    key: &str,
    artifact: &ArtifactRef,
) -> Result<String> {
    actual.remove(&format!("{prefix}.{key}")).ok_or_else(|| {
        anyhow!(
            "local record has no {key} for {} under prefix {prefix}: \
             record and artifact index are inconsistent",
            artifact.id()
        )
    })
}

/// Find the reference entry matching filename and owning group, and
/// consume its filename key so it cannot match twice.
fn take_reference_prefix(
    reference: &mut BTreeMap<String, String>,
    group_id: &str,
    filename: &str,
) -> Option<String> {
    let mut found = None;
    for (key, value) in reference.iter() {
        let Some(prefix) = key.strip_suffix(".filename") else {
            continue;
        };
        if value != filename {
            continue;
        }
        let group_key = format!("{prefix}.groupId");
        if reference.get(&group_key).is_some_and(|group| group == group_id) {
            found = Some((key.clone(), prefix.to_string()));
            break;
        }
    }
    let (key, prefix) = found?;
    reference.remove(&key);
    Some(prefix)
}

/// Two-path content-diff invocation: reference side under its canonical
/// repository filename, local side at its actual path.
fn remediation(artifact: &ArtifactRef, reference_dir: &Path, base_dir: &Path) -> String {
    let reference = reference_dir
        .join(&artifact.group_id)
        .join(artifact.canonical_filename());
    match &artifact.file {
        None => format!(
            "missing file for {} reference = {} actual = null",
            artifact.id(),
            display_relative(&reference, base_dir)
        ),
        Some(actual) => format!(
            "diffoscope {} {}",
            display_relative(&reference, base_dir),
            display_relative(actual, base_dir)
        ),
    }
}

fn display_relative(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(relative) => relative.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// Write the report next to the local record, swapping the record
/// extension for the report extension.
pub fn write_report(report: &ComparisonReport, local_record: &Path) -> Result<PathBuf> {
    let report_path = sibling_report_path(local_record);
    fs::write(&report_path, report.render())
        .with_context(|| format!("write {}", report_path.display()))?;
    info!(report = %report_path.display(), "comparison saved");
    Ok(report_path)
}

fn sibling_report_path(local_record: &Path) -> PathBuf {
    local_record.with_extension(REPORT_EXTENSION)
}

/// Log the summary and apply the failure policy.
pub fn summarize(
    report: &ComparisonReport,
    local_record: &Path,
    reference_record: &Path,
    base_dir: &Path,
    policy: ComparePolicy,
) -> Result<()> {
    let ignored_note = if report.ignored == 0 {
        String::new()
    } else {
        format!(", {} ignored", report.ignored)
    };
    if report.has_differences() {
        let missing_note = if report.missing == 0 {
            String::new()
        } else {
            format!(", {} missing", report.missing)
        };
        error!(
            "reproducible build output summary: {} files ok, {} different{missing_note}{ignored_note}",
            report.ok, report.ko
        );
        error!(
            "see diff {} {}",
            display_relative(reference_record, base_dir),
            display_relative(local_record, base_dir)
        );
        error!("see also https://reproducible-builds.org/docs/jvm/");
    } else {
        info!(
            "reproducible build output summary: {} files ok{ignored_note}",
            report.ok
        );
    }
    if policy.fail_on_difference && report.has_differences() {
        bail!("build artifacts are different from reference");
    }
    Ok(())
}
