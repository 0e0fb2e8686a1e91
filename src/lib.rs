//! Reproducibility verification engine for build outputs.
//!
//! The engine records a deterministic fingerprint of a build's outputs,
//! acquires (or synthesizes) a comparable reference fingerprint, and
//! diffs the two, classifying every artifact as ok, different, ignored
//! or missing. Running the build and discovering which files it produced
//! are the orchestrator's job; the engine only records, resolves and
//! compares.

pub mod artifact;
pub mod compare;
pub mod digest;
pub mod environment;
pub mod manifest;
pub mod record;
pub mod reference;
pub mod sniff;
