//! Compiled contract artifacts.
//!
//! Artifacts are produced once per build by the external compiler and are read-only afterwards.
//! The core only needs to look them up by contract name.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Bytes;
use serde::{Deserialize, Serialize};

use crate::{BytecodeField, DeployError};

/// Directory (relative to the project root) holding Hardhat build output.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Compiled output of a single contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// The contract name, unique within a build.
    pub contract_name: String,
    /// Hex-encoded creation (init) code, with or without `0x`.
    #[serde(rename = "bytecode")]
    pub creation_bytecode: String,
    /// Hex-encoded runtime code, with or without `0x`.
    pub deployed_bytecode: String,
}

impl Artifact {
    pub fn new(
        contract_name: impl Into<String>,
        creation_bytecode: impl Into<String>,
        deployed_bytecode: impl Into<String>,
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            creation_bytecode: creation_bytecode.into(),
            deployed_bytecode: deployed_bytecode.into(),
        }
    }

    /// Returns the raw hex of the given field.
    pub fn field(&self, field: BytecodeField) -> &str {
        match field {
            BytecodeField::CreationBytecode => &self.creation_bytecode,
            BytecodeField::DeployedBytecode => &self.deployed_bytecode,
        }
    }

    /// Number of bytes encoded by the given field.
    ///
    /// Fails with [`DeployError::MalformedArtifact`] when the field is not well-formed hex.
    pub fn byte_len(&self, field: BytecodeField) -> Result<usize, DeployError> {
        let digits = strip_hex_prefix(self.field(field));

        if digits.len() % 2 != 0 {
            let reason = format!("odd number of hex digits ({})", digits.len());
            return Err(self.malformed(field, reason));
        }

        if let Some((pos, c)) = digits.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
            return Err(self.malformed(field, format!("invalid character {c:?} at offset {pos}")));
        }

        Ok(digits.len() / 2)
    }

    /// Decodes the creation bytecode into raw bytes, ready to be sent in a creation transaction.
    pub fn creation_code(&self) -> Result<Bytes, DeployError> {
        let field = BytecodeField::CreationBytecode;
        hex::decode(strip_hex_prefix(self.field(field)))
            .map(Bytes::from)
            .map_err(|e| self.malformed(field, e.to_string()))
    }

    fn malformed(&self, field: BytecodeField, reason: String) -> DeployError {
        DeployError::MalformedArtifact {
            contract: self.contract_name.clone(),
            field,
            reason,
        }
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Read access to compiled artifacts by contract name.
pub trait ArtifactStore {
    /// Load the artifact for `name`, failing with [`DeployError::ArtifactNotFound`] if the build
    /// did not produce it.
    fn read_artifact(&self, name: &str) -> Result<Artifact, DeployError>;
}

/// Artifacts held in memory, keyed by contract name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    artifacts: HashMap<String, Artifact>,
}

impl InMemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, replacing any artifact with the same contract name.
    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }
}

impl FromIterator<Artifact> for InMemoryArtifacts {
    fn from_iter<T: IntoIterator<Item = Artifact>>(iter: T) -> Self {
        let mut store = Self::new();
        for artifact in iter {
            store.insert(artifact);
        }
        store
    }
}

impl ArtifactStore for InMemoryArtifacts {
    fn read_artifact(&self, name: &str) -> Result<Artifact, DeployError> {
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::ArtifactNotFound(name.to_string()))
    }
}

/// Artifacts laid out by Hardhat: `artifacts/<source path>/<Name>.json`.
///
/// Debug files (`*.dbg.json`) and the `build-info` directory are ignored.
#[derive(Debug, Clone)]
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    /// Create a store reading from `<project_root>/artifacts`.
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::from_artifacts_dir(project_root.as_ref().join(ARTIFACTS_DIR))
    }

    /// Create a store reading directly from an artifacts directory.
    pub fn from_artifacts_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn find(&self, name: &str) -> Result<Vec<PathBuf>, DeployError> {
        let file_name = format!("{name}.json");
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(DeployError::Io { path: dir, source }),
            };

            for entry in entries {
                let entry = entry.map_err(|source| DeployError::Io {
                    path: dir.clone(),
                    source,
                })?;
                let path = entry.path();

                if path.is_dir() {
                    if entry.file_name() != "build-info" {
                        pending.push(path);
                    }
                } else if entry.file_name().to_str() == Some(file_name.as_str()) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

impl ArtifactStore for HardhatArtifacts {
    fn read_artifact(&self, name: &str) -> Result<Artifact, DeployError> {
        let mut candidates = self.find(name)?;

        let path = match candidates.len() {
            0 => return Err(DeployError::ArtifactNotFound(name.to_string())),
            1 => candidates.remove(0),
            _ => {
                return Err(DeployError::AmbiguousArtifact {
                    name: name.to_string(),
                    paths: candidates,
                });
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| DeployError::Io {
            path: path.clone(),
            source,
        })?;
        let artifact: Artifact =
            serde_json::from_str(&content).map_err(|source| DeployError::Json {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(contract = name, path = %path.display(), "Loaded artifact");

        Ok(artifact)
    }
}
