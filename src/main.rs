use anyhow::{Context, Result};
use clap::Parser;
use repro_check::compare::{self, CompareInput, ComparePolicy};
use repro_check::manifest::OutputsManifest;
use repro_check::record::{save_record, ArtifactIndex, RecordWriter, RECORD_EXTENSION};
use repro_check::reference::{
    ArtifactSource, DirectoryRepositorySource, HttpRepositorySource, ReferenceResolver,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{Command, CompareArgs, RecordArgs, RootArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = RootArgs::parse();
    match args.command {
        Command::Record(args) => cmd_record(args),
        Command::Compare(args) => cmd_compare(args),
    }
}

fn cmd_record(args: RecordArgs) -> Result<()> {
    let manifest = OutputsManifest::load(&args.manifest)?;
    let record_path = record_path(&args.out, &args.manifest, &manifest);
    generate_record(&manifest, &record_path, args.reproducible)?;
    Ok(())
}

fn cmd_compare(args: CompareArgs) -> Result<()> {
    let manifest = OutputsManifest::load(&args.manifest)?;
    let record_path = record_path(&args.out, &args.manifest, &manifest);
    let index = generate_record(&manifest, &record_path, args.reproducible)?;

    info!(repo = %args.reference_repo, "checking against reference build");
    let reference_dir = args.reference_dir.clone().unwrap_or_else(|| {
        record_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("reference")
    });
    let source = open_source(&args.reference_repo);
    let resolver = ReferenceResolver::new(source.as_ref(), &reference_dir);
    let outcome = resolver.resolve(&manifest.project_identity(), &index)?;

    let base_dir = args
        .manifest
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let report = compare::compare(&CompareInput {
        version: &manifest.version,
        local_record: &record_path,
        reference_record: &outcome.record_path,
        index: &index,
        reference_dir: &reference_dir,
        base_dir: &base_dir,
    })?;
    compare::write_report(&report, &record_path)?;
    compare::summarize(
        &report,
        &record_path,
        &outcome.record_path,
        &base_dir,
        ComparePolicy {
            fail_on_difference: !args.warn_only,
        },
    )
}

fn record_path(out: &Option<PathBuf>, manifest_path: &Path, manifest: &OutputsManifest) -> PathBuf {
    match out {
        Some(path) => path.clone(),
        None => {
            let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
            dir.join(format!(
                "{}-{}.{}",
                manifest.artifact_id, manifest.version, RECORD_EXTENSION
            ))
        }
    }
}

fn generate_record(
    manifest: &OutputsManifest,
    record_path: &Path,
    reproducible: bool,
) -> Result<ArtifactIndex> {
    let aggregate = manifest.aggregate()?;
    let mut writer = RecordWriter::new(aggregate);
    writer.write_header(
        &manifest.project_identity(),
        Some(manifest.artifact_id.as_str()),
        &manifest.build_tool,
        manifest.build_tool_version.as_deref(),
        &manifest.build_env(),
        manifest.toolchain_jdk.as_deref(),
        reproducible,
    );

    let fallback_rules = manifest.fallback_rules()?;
    for module in manifest.active_modules()? {
        let output_set = module
            .output_set(manifest.ignore_javadoc)
            .with_context(|| format!("prepare module {}", module.artifact_id))?;
        writer
            .write_module_artifacts(&output_set, Some(&fallback_rules))
            .with_context(|| format!("record module {}", module.artifact_id))?;
    }

    let (content, index) = writer.finish();
    save_record(record_path, &content)?;
    info!(
        record = %record_path.display(),
        aggregate,
        "saved fingerprint record of build outputs"
    );
    Ok(index)
}

fn open_source(reference_repo: &str) -> Box<dyn ArtifactSource> {
    if reference_repo.starts_with("http://") || reference_repo.starts_with("https://") {
        Box::new(HttpRepositorySource::new(reference_repo))
    } else {
        Box::new(DirectoryRepositorySource::new(reference_repo))
    }
}
