//! Error kinds surfaced by the size gate, the planner and the executor.

use std::path::PathBuf;

use alloy_core::primitives::B256;

use crate::Manifest;

/// Which bytecode field of an artifact a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum BytecodeField {
    CreationBytecode,
    DeployedBytecode,
}

/// Errors raised by the deployment core.
///
/// Plan-construction errors (`InvalidDependency`, `DuplicateStepName`) and artifact errors are
/// returned before anything touches the network. Submission errors are produced by a
/// [`TxSubmitter`](crate::TxSubmitter) and are never retried by the executor.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("malformed artifact {contract}: {field} is not a well-formed hex string ({reason})")]
    MalformedArtifact {
        contract: String,
        field: BytecodeField,
        reason: String,
    },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("artifact {name} is ambiguous, found {}", display_candidates(.paths))]
    AmbiguousArtifact { name: String, paths: Vec<PathBuf> },

    #[error("step {step} references {dependency}, which is not an earlier step of the plan")]
    InvalidDependency { dependency: String, step: String },

    #[error("duplicate step name: {0}")]
    DuplicateStepName(String),

    /// Never raised for a plan built through [`Plan::build`](crate::Plan::build).
    #[error("internal error: step {step} references {dependency} before it was deployed")]
    UnresolvedReference { dependency: String, step: String },

    #[error("transaction submission failed: {0}")]
    SubmissionError(String),

    #[error("timed out after {timeout_secs}s waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout { tx_hash: B256, timeout_secs: u64 },

    #[error("contract creation reverted in transaction {tx_hash}")]
    Reverted { tx_hash: B256 },

    #[error("failed to read artifact file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact file {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn display_candidates(paths: &[PathBuf]) -> String {
    let list = paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} candidates: {list}", paths.len())
}

/// A deployment run that stopped on an error.
///
/// The manifest holds every step that completed before the failure. Those contracts exist
/// on-chain, so callers must persist or report it rather than discard it.
#[derive(Debug, thiserror::Error)]
#[error("deployment aborted at step {step}: {source}")]
pub struct RunFailure {
    /// The step that failed.
    pub step: String,
    /// The finalized, partial manifest.
    pub manifest: Manifest,
    #[source]
    pub source: DeployError,
}
