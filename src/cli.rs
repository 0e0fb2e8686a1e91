//! CLI argument parsing for the verification front-end.
//!
//! The CLI is intentionally thin: it wires manifest loading to the
//! engine without embedding policy, so the same core logic can be
//! driven by any orchestrator.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "rcheck",
    version,
    about = "Verify build outputs are byte-for-byte reproducible against a reference build",
    after_help = "Commands:\n  record --manifest <file>                     Fingerprint the build outputs\n  compare --manifest <file> --reference-repo <repo>\n                                               Fingerprint, resolve a reference, and diff\n\nExamples:\n  rcheck record --manifest target/outputs.json --reproducible\n  rcheck compare --manifest target/outputs.json --reference-repo https://repo.example.org/releases\n  rcheck compare --manifest target/outputs.json --reference-repo /srv/reference-repo --warn-only",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Record(RecordArgs),
    Compare(CompareArgs),
}

/// Record a fingerprint of the build outputs described by a manifest.
#[derive(Parser, Debug)]
#[command(about = "Write a fingerprint record of the build outputs")]
pub struct RecordArgs {
    /// Outputs manifest produced by the build orchestrator
    #[arg(long, value_name = "PATH")]
    pub manifest: PathBuf,

    /// Output path for the record (defaults next to the manifest)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Coarsen environment detail so the record itself is reproducible
    #[arg(long)]
    pub reproducible: bool,
}

/// Record, resolve a reference build, and compare the two.
#[derive(Parser, Debug)]
#[command(about = "Compare the build outputs against a reference build")]
pub struct CompareArgs {
    /// Outputs manifest produced by the build orchestrator
    #[arg(long, value_name = "PATH")]
    pub manifest: PathBuf,

    /// Output path for the local record (defaults next to the manifest)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Coarsen environment detail so the record itself is reproducible
    #[arg(long)]
    pub reproducible: bool,

    /// Reference repository: an http(s) URL or a local directory in
    /// repository layout
    #[arg(long, value_name = "REPO")]
    pub reference_repo: String,

    /// Directory receiving the downloaded reference copies
    /// (defaults to a `reference` directory next to the record)
    #[arg(long, value_name = "DIR")]
    pub reference_dir: Option<PathBuf>,

    /// Only warn when artifacts differ instead of failing
    #[arg(long)]
    pub warn_only: bool,
}
