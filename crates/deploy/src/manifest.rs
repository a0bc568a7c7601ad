//! Deployment manifests.
//!
//! A manifest is the append-only record of what a run deployed, in plan order. It is created
//! empty when a run starts, grows one record per completed step and is finalized exactly once.
//! Partial manifests are kept: every record corresponds to a contract that exists on-chain.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use derive_more::Deref;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::ArgValue;

/// Default file name of a persisted manifest.
pub const MANIFEST_FILENAME: &str = "deployment-manifest.json";

/// Name of the lock file guarding a deployment directory.
const LOCK_FILENAME: &str = ".deploy.lock";

/// One completed deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub step_name: String,
    pub contract_name: String,
    pub deployed_address: Address,
    pub tx_hash: B256,
    /// Constructor arguments after reference resolution, in declaration order.
    pub constructor_args: Vec<ArgValue>,
}

/// Lifecycle of a manifest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ManifestStatus {
    InProgress,
    /// Every step of the plan was deployed.
    Completed,
    /// The caller cancelled the run between two steps.
    Cancelled,
    /// A step failed; later steps were not attempted.
    Aborted,
}

/// Ordered, append-only record of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Deref)]
pub struct Manifest {
    /// Chain the records live on, when known.
    pub chain_id: Option<u64>,
    /// Fingerprint of the plan that produced this manifest.
    pub fingerprint: Option<String>,
    pub status: ManifestStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    #[deref]
    records: Vec<DeploymentRecord>,
}

impl Manifest {
    /// Create an empty, in-progress manifest.
    pub fn new() -> Self {
        Self {
            chain_id: None,
            fingerprint: None,
            status: ManifestStatus::InProgress,
            started_at: Utc::now(),
            finalized_at: None,
            records: Vec::new(),
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn records(&self) -> &[DeploymentRecord] {
        &self.records
    }

    /// Look up the record for a step.
    pub fn record(&self, step_name: &str) -> Option<&DeploymentRecord> {
        self.records.iter().find(|r| r.step_name == step_name)
    }

    pub fn is_finalized(&self) -> bool {
        self.status != ManifestStatus::InProgress
    }

    pub fn is_complete(&self) -> bool {
        self.status == ManifestStatus::Completed
    }

    /// Append a record. Only the executor owning the run calls this.
    pub(crate) fn push(&mut self, record: DeploymentRecord) {
        debug_assert!(!self.is_finalized(), "manifest is finalized");
        self.records.push(record);
    }

    /// Seal the manifest with its final status.
    pub(crate) fn finalize(&mut self, status: ManifestStatus) {
        debug_assert!(!self.is_finalized(), "manifest finalized twice");
        debug_assert!(status != ManifestStatus::InProgress);
        self.status = status;
        self.finalized_at = Some(Utc::now());
    }

    /// Save this manifest as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;

        std::fs::write(path, json)
            .context(format!("Failed to write manifest to {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            status = %self.status,
            records = self.len(),
            "Manifest saved"
        );

        Ok(())
    }

    /// Load a manifest from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Manifest file does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read manifest from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse manifest JSON")
    }

    /// Move the manifest at `path` aside so a new run can take its place.
    ///
    /// The file is renamed to `<stem>.<started_at>.json` next to the original, using the
    /// current time when the manifest cannot be parsed. Returns the new path, or `None` when
    /// there is nothing at `path`.
    pub fn archive(path: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }

        let started_at = Self::load_from_file(path)
            .map(|previous| previous.started_at)
            .unwrap_or_else(|e| {
                tracing::warn!(err = %e, path = %path.display(), "Archiving unreadable manifest");
                Utc::now()
            });

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("deployment-manifest");
        let stamp = started_at.format("%Y%m%dT%H%M%SZ");

        let mut archived = path.with_file_name(format!("{stem}.{stamp}.json"));
        let mut attempt = 1;
        while archived.exists() {
            archived = path.with_file_name(format!("{stem}.{stamp}-{attempt}.json"));
            attempt += 1;
        }

        std::fs::rename(path, &archived).context(format!(
            "Failed to archive manifest {} to {}",
            path.display(),
            archived.display()
        ))?;

        tracing::info!(
            from = %path.display(),
            to = %archived.display(),
            "Previous manifest archived"
        );

        Ok(Some(archived))
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive lock over a deployment directory.
///
/// Two runs sharing one deployer account would race on its nonce. Holding this lock for the
/// duration of a run serialises runs that write to the same directory. The lock is released on
/// drop.
#[derive(Debug)]
pub struct DeploymentLock {
    file: File,
    path: PathBuf,
}

impl DeploymentLock {
    /// Try to take the lock for `dir`, failing immediately if another run holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create deployment directory {}", dir.display()))?;

        let path = dir.join(LOCK_FILENAME);
        let file = File::create(&path)
            .context(format!("Failed to create lock file {}", path.display()))?;

        file.try_lock_exclusive().context(format!(
            "Another deployment is running against {}",
            dir.display()
        ))?;

        tracing::debug!(path = %path.display(), "Deployment lock acquired");

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeploymentLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(
                err = %e,
                path = %self.path.display(),
                "Failed to release deployment lock"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;
    use tempdir::TempDir;

    fn record(step: &str) -> DeploymentRecord {
        DeploymentRecord {
            step_name: step.to_string(),
            contract_name: "SwapPool".to_string(),
            deployed_address: address!("0x5FbDB2315678afecb367f032d93F642f64180aa3"),
            tx_hash: B256::repeat_byte(0xab),
            constructor_args: vec![ArgValue::Bool(true)],
        }
    }

    #[test]
    fn test_new_manifest_is_empty_and_open() {
        let manifest = Manifest::new();
        assert!(manifest.is_empty());
        assert_eq!(manifest.status, ManifestStatus::InProgress);
        assert!(!manifest.is_finalized());
    }

    #[test]
    fn test_push_and_finalize() {
        let mut manifest = Manifest::new().with_chain_id(146);
        manifest.push(record("a"));
        manifest.push(record("b"));
        manifest.finalize(ManifestStatus::Completed);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[1].step_name, "b");
        assert!(manifest.record("a").is_some());
        assert!(manifest.record("c").is_none());
        assert!(manifest.is_complete());
        assert!(manifest.finalized_at.is_some());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested/deployment-manifest.json");

        let mut manifest = Manifest::new().with_chain_id(146).with_fingerprint("abc123");
        manifest.push(record("fee-pool"));
        manifest.finalize(ManifestStatus::Aborted);

        manifest.save_to_file(&path).expect("Failed to save manifest");
        let loaded = Manifest::load_from_file(&path).expect("Failed to load manifest");

        assert_eq!(manifest, loaded);
    }

    #[test]
    fn test_archive_keeps_previous_records() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(MANIFEST_FILENAME);

        let mut manifest = Manifest::new();
        manifest.push(record("fee-pool"));
        manifest.finalize(ManifestStatus::Aborted);
        manifest.save_to_file(&path).unwrap();

        let archived = Manifest::archive(&path).unwrap().expect("manifest archived");
        assert!(!path.exists());

        let name = archived.file_name().unwrap().to_str().unwrap();
        let stamp = manifest.started_at.format("%Y%m%dT%H%M%SZ").to_string();
        assert_eq!(name, format!("deployment-manifest.{stamp}.json"));
        assert_eq!(Manifest::load_from_file(&archived).unwrap(), manifest);

        // A second archive with the same start time does not clobber the first.
        manifest.save_to_file(&path).unwrap();
        let second = Manifest::archive(&path).unwrap().expect("manifest archived");
        assert_ne!(second, archived);
        assert!(archived.exists());
        assert!(second.exists());
    }

    #[test]
    fn test_archive_without_manifest() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        assert!(
            Manifest::archive(&temp_dir.path().join(MANIFEST_FILENAME))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        assert!(Manifest::load_from_file(&temp_dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_load_corrupted_file() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(MANIFEST_FILENAME);
        std::fs::write(&path, "{ invalid json }").expect("Failed to write corrupted file");
        assert!(Manifest::load_from_file(&path).is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(ManifestStatus::InProgress.to_string(), "in-progress");
        assert_eq!(
            serde_json::to_string(&ManifestStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_lock_is_exclusive() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");

        let lock = DeploymentLock::acquire(temp_dir.path()).expect("first lock");
        assert!(DeploymentLock::acquire(temp_dir.path()).is_err());

        drop(lock);
        assert!(DeploymentLock::acquire(temp_dir.path()).is_ok());
    }
}
