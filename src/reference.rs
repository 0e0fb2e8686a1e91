//! Reference resolution: fetch a published reference record, or fall
//! back to downloading individual reference artifacts and synthesizing
//! a minimal record from them.
//!
//! Only "not found" is tolerated per artifact; any other source failure
//! aborts the whole resolution.

use crate::artifact::ArtifactRef;
use crate::record::{save_record, ArtifactIndex, ProjectIdentity, RecordWriter, RECORD_EXTENSION};
use crate::sniff::{self, SniffedEnv, ARCHIVE_EXTENSIONS};
use anyhow::{Context, Result};
use std::fs;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Records downloaded directly from the reference source may come from
/// an incompatible recorder version, so the current policy is to
/// discard them and always synthesize. Flipping this single decision
/// point reinstates the trusted-direct early return.
const TRUST_DIRECT_RECORD: bool = false;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("reference artifact not found: {0}")]
    NotFound(String),
    #[error("error resolving reference artifact {artifact}")]
    Transport {
        artifact: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Capability to fetch a reference artifact by identity. Transport
/// details stay behind this seam.
pub trait ArtifactSource {
    /// Fetch the reference counterpart of `artifact` into `dest`.
    fn fetch(&self, artifact: &ArtifactRef, dest: &Path) -> Result<(), FetchError>;
}

/// Repository-layout relative path for an artifact:
/// `group/as/dirs/artifactId/version/canonical-filename`.
fn repository_path(artifact: &ArtifactRef) -> String {
    format!(
        "{}/{}/{}/{}",
        artifact.group_id.replace('.', "/"),
        artifact.artifact_id,
        artifact.base_version,
        artifact.canonical_filename()
    )
}

/// Remote repository reachable over HTTP.
pub struct HttpRepositorySource {
    base_url: String,
}

impl HttpRepositorySource {
    pub fn new(base_url: &str) -> Self {
        HttpRepositorySource {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ArtifactSource for HttpRepositorySource {
    fn fetch(&self, artifact: &ArtifactRef, dest: &Path) -> Result<(), FetchError> {
        let url = format!("{}/{}", self.base_url, repository_path(artifact));
        let transport = |source: anyhow::Error| FetchError::Transport {
            artifact: artifact.id(),
            source,
        };
        match ureq::get(&url).call() {
            Ok(mut response) => {
                let mut file = File::create(dest)
                    .map_err(|err| transport(anyhow::Error::new(err).context("create file")))?;
                io::copy(&mut response.body_mut().as_reader(), &mut file)
                    .map_err(|err| transport(anyhow::Error::new(err).context("download body")))?;
                Ok(())
            }
            Err(ureq::Error::StatusCode(404)) => Err(FetchError::NotFound(artifact.id())),
            Err(err) => Err(transport(anyhow::Error::new(err).context(url))),
        }
    }
}

/// Repository laid out on the local filesystem.
pub struct DirectoryRepositorySource {
    root: PathBuf,
}

impl DirectoryRepositorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryRepositorySource { root: root.into() }
    }
}

impl ArtifactSource for DirectoryRepositorySource {
    fn fetch(&self, artifact: &ArtifactRef, dest: &Path) -> Result<(), FetchError> {
        let source = self.root.join(repository_path(artifact));
        if !source.is_file() {
            return Err(FetchError::NotFound(artifact.id()));
        }
        fs::copy(&source, dest)
            .map_err(|err| FetchError::Transport {
                artifact: artifact.id(),
                source: anyhow::Error::new(err)
                    .context(format!("copy {}", source.display())),
            })
            .map(|_| ())
    }
}

/// Result of a reference resolution: the record to compare against and
/// the environments sniffed from the first informative archive.
#[derive(Debug)]
pub struct ReferenceOutcome {
    pub record_path: PathBuf,
    pub reference_env: SniffedEnv,
    pub local_env: SniffedEnv,
    /// Artifacts actually downloaded; the rest surface later as
    /// missing in the comparison.
    pub downloaded: usize,
}

/// Per-invocation resolver state machine: try-direct, per-artifact
/// fetch, sniff-once, synthesize.
pub struct ReferenceResolver<'a> {
    source: &'a dyn ArtifactSource,
    reference_dir: PathBuf,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(source: &'a dyn ArtifactSource, reference_dir: impl Into<PathBuf>) -> Self {
        ReferenceResolver {
            source,
            reference_dir: reference_dir.into(),
        }
    }

    pub fn resolve(
        &self,
        project: &ProjectIdentity,
        index: &ArtifactIndex,
    ) -> Result<ReferenceOutcome> {
        fs::create_dir_all(&self.reference_dir)
            .with_context(|| format!("create {}", self.reference_dir.display()))?;

        if let Some(record_path) = self.try_direct(project)? {
            return Ok(ReferenceOutcome {
                record_path,
                reference_env: SniffedEnv::default(),
                local_env: SniffedEnv::default(),
                downloaded: 0,
            });
        }

        let resolved = self.fetch_artifacts(index)?;
        let (reference_env, local_env) = sniff_once(index, &resolved);
        report_drift(&reference_env, &local_env);

        let record_path = self.synthesize(project, index, &resolved, &reference_env)?;
        Ok(ReferenceOutcome {
            record_path,
            reference_env,
            local_env,
            downloaded: resolved.iter().flatten().count(),
        })
    }

    /// Probe for a previously published record at the same coordinates.
    /// Returns the path only when direct records are trusted.
    fn try_direct(&self, project: &ProjectIdentity) -> Result<Option<PathBuf>> {
        let probe = ArtifactRef::new(
            &project.group_id,
            &project.artifact_id,
            &project.version,
            "",
            RECORD_EXTENSION,
        );
        let dest = self.reference_dir.join(probe.canonical_filename());
        match self.source.fetch(&probe, &dest) {
            Ok(()) => {
                if TRUST_DIRECT_RECORD {
                    info!(record = %dest.display(), "reference record found");
                    return Ok(Some(dest));
                }
                warn!(
                    "dropping downloaded reference record: it may come from a \
                     different recorder version"
                );
                let _ = fs::remove_file(&dest);
                Ok(None)
            }
            Err(FetchError::NotFound(_)) => {
                info!("reference record not found: it will be synthesized from downloaded artifacts");
                Ok(None)
            }
            Err(err) => Err(err).context("probe for published reference record"),
        }
    }

    /// Download each recorded artifact's counterpart, tolerating only
    /// "not found". Files land under `<referenceDir>/<groupId>/`.
    fn fetch_artifacts(&self, index: &ArtifactIndex) -> Result<Vec<Option<PathBuf>>> {
        let mut resolved = Vec::with_capacity(index.entries().len());
        for (artifact, prefix) in index.entries() {
            if prefix.is_none() {
                resolved.push(None);
                continue;
            }
            let group_dir = self.reference_dir.join(&artifact.group_id);
            fs::create_dir_all(&group_dir)
                .with_context(|| format!("create {}", group_dir.display()))?;
            let dest = group_dir.join(artifact.canonical_filename());
            match self.source.fetch(artifact, &dest) {
                Ok(()) => resolved.push(Some(dest)),
                Err(FetchError::NotFound(_)) => {
                    warn!(artifact = %artifact.id(), "reference artifact not found");
                    resolved.push(None);
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("fetch reference for {}", artifact.id()));
                }
            }
        }
        Ok(resolved)
    }

    /// Build the minimal reference record from the downloaded files,
    /// reusing the local record's prefixes so the comparator can match
    /// entries one to one.
    fn synthesize(
        &self,
        project: &ProjectIdentity,
        index: &ArtifactIndex,
        resolved: &[Option<PathBuf>],
        reference_env: &SniffedEnv,
    ) -> Result<PathBuf> {
        let mut writer = RecordWriter::new(false);
        writer.write_env_note(
            reference_env.java_version.as_deref(),
            reference_env.os_name.as_deref(),
        );
        for ((artifact, prefix), file) in index.entries().iter().zip(resolved) {
            if let (Some(prefix), Some(file)) = (prefix, file) {
                writer
                    .write_file_entry(prefix, &artifact.group_id, file)
                    .with_context(|| format!("record reference for {}", artifact.id()))?;
            }
        }
        let (content, _) = writer.finish();
        let record_path = self.reference_dir.join(format!(
            "{}-{}.{}",
            project.artifact_id, project.version, RECORD_EXTENSION
        ));
        save_record(&record_path, &content)?;
        info!(record = %record_path.display(), "minimal reference record generated from downloaded artifacts");
        Ok(record_path)
    }
}

/// Scan archive-typed artifacts in original order, stopping at the
/// first one whose reference copy yields a toolchain version; sniff the
/// local counterpart of the same artifact for drift reporting.
fn sniff_once(index: &ArtifactIndex, resolved: &[Option<PathBuf>]) -> (SniffedEnv, SniffedEnv) {
    for ((artifact, prefix), file) in index.entries().iter().zip(resolved) {
        if prefix.is_none() || !ARCHIVE_EXTENSIONS.contains(&artifact.extension.as_str()) {
            continue;
        }
        let Some(file) = file else {
            continue;
        };
        let reference_env = sniff::sniff(file, &artifact.group_id, &artifact.artifact_id);
        if reference_env.java_version.is_some() {
            let local_env = match &artifact.file {
                Some(local) => sniff::sniff(local, &artifact.group_id, &artifact.artifact_id),
                None => SniffedEnv::default(),
            };
            return (reference_env, local_env);
        }
    }
    (SniffedEnv::default(), SniffedEnv::default())
}

fn report_drift(reference: &SniffedEnv, local: &SniffedEnv) {
    if let Some(java_version) = &reference.java_version {
        info!("reference build java.version: {java_version}");
        if reference.java_version != local.java_version {
            error!(
                "current build java.version: {}",
                local.java_version.as_deref().unwrap_or("unknown")
            );
        }
    }
    if let Some(os_name) = &reference.os_name {
        info!("reference build os.name: {os_name}");
        if reference.os_name != local.os_name {
            error!(
                "current build os.name: {}",
                local.os_name.as_deref().unwrap_or("unknown")
            );
        }
        let expected_windows = os_name.starts_with("Windows");
        if expected_windows != cfg!(windows) {
            warn!("current platform line separator does not match reference build OS");
        }
    }
}
