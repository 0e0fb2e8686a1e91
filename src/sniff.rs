//! Environment sniffing over reference archives.
//!
//! A compiled archive often embeds the toolchain that produced it (a
//! manifest `Build-Jdk-Spec` / `Build-Jdk` attribute) and a package
//! metadata text file whose line endings betray the host OS family.
//! Absence of either is expected and never an error.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Archive extensions worth opening for environment inspection.
pub const ARCHIVE_EXTENSIONS: [&str; 4] = ["jar", "war", "ear", "rar"];

/// Environment inferred from one archive. Both fields are best-effort.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SniffedEnv {
    pub java_version: Option<String>,
    pub os_name: Option<String>,
}

impl SniffedEnv {
    pub fn is_empty(&self) -> bool {
        self.java_version.is_none() && self.os_name.is_none()
    }
}

/// Inspect an archive's embedded build metadata. Returns an empty
/// result when the archive cannot be opened or carries no manifest.
pub fn sniff(archive_path: &Path, group_id: &str, artifact_id: &str) -> SniffedEnv {
    debug!(archive = %archive_path.display(), "guessing java.version and os.name");
    let file = match File::open(archive_path) {
        Ok(file) => file,
        Err(err) => {
            warn!(archive = %archive_path.display(), %err, "unable to open archive");
            return SniffedEnv::default();
        }
    };
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(err) => {
            warn!(archive = %archive_path.display(), %err, "unable to read archive");
            return SniffedEnv::default();
        }
    };

    let Some(manifest) = read_entry(&mut archive, "META-INF/MANIFEST.MF") else {
        warn!(archive = %archive_path.display(), "no MANIFEST.MF found in archive");
        return SniffedEnv::default();
    };
    let attributes = parse_manifest_main_section(&manifest);

    SniffedEnv {
        java_version: extract_java_version(&attributes),
        os_name: extract_os_name(&mut archive, group_id, artifact_id),
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Option<String> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut content = String::new();
            match entry.read_to_string(&mut content) {
                Ok(_) => Some(content),
                Err(err) => {
                    warn!(entry = name, %err, "unable to read archive entry");
                    None
                }
            }
        }
        Err(ZipError::FileNotFound) => None,
        Err(err) => {
            warn!(entry = name, %err, "unable to locate archive entry");
            None
        }
    }
}

/// Main attributes of a manifest-style key/value block: the section up
/// to the first blank line, with continuation lines (leading space)
/// folded into the previous value.
fn parse_manifest_main_section(manifest: &str) -> BTreeMap<String, String> {
    let mut attributes: BTreeMap<String, String> = BTreeMap::new();
    let mut current_key: Option<String> = None;
    for line in manifest.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some(key) = &current_key {
                if let Some(value) = attributes.get_mut(key) {
                    value.push_str(continuation);
                }
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            attributes.insert(key.clone(), value.trim().to_string());
            current_key = Some(key);
        }
    }
    attributes
}

/// Prefer the normalized spec attribute over the raw compiler string.
fn extract_java_version(attributes: &BTreeMap<String, String>) -> Option<String> {
    if let Some(value) = attributes.get("Build-Jdk-Spec") {
        return Some(format!("{value} (from MANIFEST.MF Build-Jdk-Spec)"));
    }
    if let Some(value) = attributes.get("Build-Jdk") {
        return Some(format!("{value} (from MANIFEST.MF Build-Jdk)"));
    }
    None
}

/// Classify the producing OS family by the line-ending convention of
/// the embedded package metadata file.
fn extract_os_name(
    archive: &mut ZipArchive<File>,
    group_id: &str,
    artifact_id: &str,
) -> Option<String> {
    let entry_name = format!("META-INF/maven/{group_id}/{artifact_id}/pom.properties");
    let content = read_entry(archive, &entry_name)?;
    if content.contains("\r\n") {
        Some("Windows (from pom.properties newline)".to_string())
    } else if content.contains('\n') {
        Some("Unix (from pom.properties newline)".to_string())
    } else {
        None
    }
}
