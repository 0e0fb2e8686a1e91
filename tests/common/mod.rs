use repro_check::artifact::{ArtifactRef, ModuleOutputSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Write a small jar-like archive with a manifest and package metadata.
pub fn write_jar(path: &Path, build_jdk_spec: &str, payload: &[u8]) {
    let file = File::create(path).expect("create jar");
    let mut writer = ZipWriter::new(file);
    writer
        .start_file("META-INF/MANIFEST.MF", SimpleFileOptions::default())
        .expect("start manifest");
    writer
        .write_all(format!("Manifest-Version: 1.0\nBuild-Jdk-Spec: {build_jdk_spec}\n\n").as_bytes())
        .expect("write manifest");
    writer
        .start_file(
            "META-INF/maven/org.acme/widget/pom.properties",
            SimpleFileOptions::default(),
        )
        .expect("start pom.properties");
    writer
        .write_all(b"groupId=org.acme\nartifactId=widget\nversion=1.0\n")
        .expect("write pom.properties");
    writer
        .start_file("payload.bin", SimpleFileOptions::default())
        .expect("start payload");
    writer.write_all(payload).expect("write payload");
    writer.finish().expect("finish jar");
}

/// A single-module build rooted at `dir`: a descriptor and a main jar.
pub struct FixtureBuild {
    pub pom: PathBuf,
    pub jar: PathBuf,
}

pub fn write_build(dir: &Path, build_jdk_spec: &str, payload: &[u8]) -> FixtureBuild {
    let pom = dir.join("pom.xml");
    fs::write(&pom, "<project>widget</project>\n").expect("write pom");
    let jar = dir.join("widget-1.0.jar");
    write_jar(&jar, build_jdk_spec, payload);
    FixtureBuild { pom, jar }
}

pub fn widget_module(build: &FixtureBuild) -> ModuleOutputSet {
    ModuleOutputSet {
        group_id: "org.acme".into(),
        artifact_id: "widget".into(),
        version: "1.0".into(),
        descriptor_file: Some(build.pom.clone()),
        consumer_descriptor: None,
        main: Some(
            ArtifactRef::new("org.acme", "widget", "1.0", "", "jar").with_file(build.jar.clone()),
        ),
        attached: Vec::new(),
        ignore: None,
    }
}

/// Lay out a repository directory serving the widget module's files.
pub fn write_repository(root: &Path, build: &FixtureBuild) {
    let module_dir = root.join("org/acme/widget/1.0");
    fs::create_dir_all(&module_dir).expect("create repository dirs");
    fs::copy(&build.pom, module_dir.join("widget-1.0.pom")).expect("publish pom");
    fs::copy(&build.jar, module_dir.join("widget-1.0.jar")).expect("publish jar");
}
