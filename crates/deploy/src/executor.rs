//! Sequential plan execution.
//!
//! Steps run strictly in plan order: a step's constructor arguments may only be resolved once
//! every step it references has an address on-chain. A failed step aborts the run and the
//! partial manifest is handed back to the caller. The executor never retries.

use std::{collections::HashMap, future::Future};

use alloy_core::primitives::{Address, B256, Bytes};
use tokio::sync::watch;

use crate::{
    ArgSlot, ArgValue, ArtifactStore, DeployError, DeploymentRecord, DeploymentStep, Manifest,
    ManifestStatus, Plan, RunFailure,
};

/// A confirmed contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub tx_hash: B256,
}

/// Submits contract-creation transactions and waits for them to be confirmed.
///
/// Implementations own their submission and confirmation timeouts and report
/// [`DeployError::SubmissionError`], [`DeployError::ConfirmationTimeout`] or
/// [`DeployError::Reverted`] within bounded time.
pub trait TxSubmitter {
    /// Deploy `bytecode` (creation code) with the given constructor arguments.
    fn deploy(
        &self,
        bytecode: Bytes,
        constructor_args: &[ArgValue],
    ) -> impl Future<Output = Result<Deployment, DeployError>> + Send;
}

/// Addresses of completed steps, keyed by step name.
#[derive(Debug, Clone, Default)]
pub struct AddressTable {
    addresses: HashMap<String, Address>,
}

impl AddressTable {
    pub fn insert(&mut self, step: impl Into<String>, address: Address) {
        self.addresses.insert(step.into(), address);
    }

    pub fn get(&self, step: &str) -> Option<Address> {
        self.addresses.get(step).copied()
    }

    /// Resolve the constructor argument slots of `step`.
    pub fn resolve(&self, step: &DeploymentStep) -> Result<Vec<ArgValue>, DeployError> {
        step.constructor_args
            .iter()
            .map(|slot| match slot {
                ArgSlot::Literal(value) => Ok(*value),
                ArgSlot::Reference(dependency) => self
                    .get(dependency)
                    .map(ArgValue::Address)
                    .ok_or_else(|| DeployError::UnresolvedReference {
                        dependency: dependency.clone(),
                        step: step.name.clone(),
                    }),
            })
            .collect()
    }
}

/// Runs a [`Plan`] against a [`TxSubmitter`].
#[derive(Debug)]
pub struct Executor<S> {
    submitter: S,
    cancel: Option<watch::Receiver<bool>>,
    chain_id: Option<u64>,
    fingerprint: Option<String>,
}

impl<S: TxSubmitter> Executor<S> {
    pub fn new(submitter: S) -> Self {
        Self {
            submitter,
            cancel: None,
            chain_id: None,
            fingerprint: None,
        }
    }

    /// Stop before the next step once `cancel` turns `true`.
    ///
    /// A step already submitted is always awaited to completion.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Chain id recorded in the manifest.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Plan fingerprint recorded in the manifest.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn new_manifest(&self) -> Manifest {
        let mut manifest = Manifest::new();
        if let Some(chain_id) = self.chain_id {
            manifest = manifest.with_chain_id(chain_id);
        }
        if let Some(ref fingerprint) = self.fingerprint {
            manifest = manifest.with_fingerprint(fingerprint.clone());
        }
        manifest
    }

    /// Execute `plan`, step by step.
    ///
    /// Returns the completed manifest, or a cancelled one if cancellation was requested between
    /// two steps. On the first failing step, returns a [`RunFailure`] carrying the manifest of
    /// the steps that did complete.
    pub async fn run(
        &self,
        plan: &Plan,
        artifacts: &impl ArtifactStore,
    ) -> Result<Manifest, RunFailure> {
        let mut manifest = self.new_manifest();
        let mut addresses = AddressTable::default();

        tracing::info!(steps = plan.len(), "Starting deployment run");

        for (index, step) in plan.iter().enumerate() {
            if self.is_cancelled() {
                tracing::warn!(
                    completed = manifest.len(),
                    next_step = %step.name,
                    "Deployment cancelled between steps"
                );
                manifest.finalize(ManifestStatus::Cancelled);
                return Ok(manifest);
            }

            tracing::info!(
                index,
                step = %step.name,
                contract = %step.artifact_ref,
                "Deploying step"
            );

            match self.run_step(step, &addresses, artifacts).await {
                Ok(record) => {
                    tracing::info!(
                        step = %record.step_name,
                        address = %record.deployed_address,
                        tx_hash = %record.tx_hash,
                        "Step deployed"
                    );
                    addresses.insert(step.name.clone(), record.deployed_address);
                    manifest.push(record);
                }
                Err(source) => {
                    if matches!(source, DeployError::UnresolvedReference { .. }) {
                        tracing::error!(
                            step = %step.name,
                            err = %source,
                            "Plan invariant violated"
                        );
                    } else {
                        tracing::error!(
                            step = %step.name,
                            err = %source,
                            "Step failed, aborting run"
                        );
                    }
                    manifest.finalize(ManifestStatus::Aborted);
                    return Err(RunFailure {
                        step: step.name.clone(),
                        manifest,
                        source,
                    });
                }
            }
        }

        manifest.finalize(ManifestStatus::Completed);
        tracing::info!(deployed = manifest.len(), "Deployment run completed");

        Ok(manifest)
    }

    async fn run_step(
        &self,
        step: &DeploymentStep,
        addresses: &AddressTable,
        artifacts: &impl ArtifactStore,
    ) -> Result<DeploymentRecord, DeployError> {
        let constructor_args = addresses.resolve(step)?;
        let bytecode = artifacts.read_artifact(&step.artifact_ref)?.creation_code()?;

        tracing::debug!(
            step = %step.name,
            bytecode_len = bytecode.len(),
            args = ?constructor_args,
            "Submitting contract creation"
        );

        let deployment = self.submitter.deploy(bytecode, &constructor_args).await?;

        Ok(DeploymentRecord {
            step_name: step.name.clone(),
            contract_name: step.artifact_ref.clone(),
            deployed_address: deployment.address,
            tx_hash: deployment.tx_hash,
            constructor_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{Artifact, InMemoryArtifacts, StepSpec};

    /// Hands out sequential addresses and records every call.
    #[derive(Default)]
    struct CountingSubmitter {
        calls: Mutex<Vec<(Bytes, Vec<ArgValue>)>>,
    }

    impl TxSubmitter for CountingSubmitter {
        async fn deploy(
            &self,
            bytecode: Bytes,
            constructor_args: &[ArgValue],
        ) -> Result<Deployment, DeployError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((bytecode, constructor_args.to_vec()));
            let n = calls.len() as u8;
            Ok(Deployment {
                address: Address::with_last_byte(n),
                tx_hash: B256::with_last_byte(n),
            })
        }
    }

    fn artifacts() -> InMemoryArtifacts {
        InMemoryArtifacts::new()
            .with(Artifact::new("A", "0x01", "0x"))
            .with(Artifact::new("B", "0x02", "0x"))
    }

    #[test]
    fn test_address_table_resolves_literals_and_refs() {
        let plan = Plan::build(vec![
            StepSpec::new("a", "A"),
            StepSpec::new("b", "B").arg(true).arg_ref("a"),
        ])
        .unwrap();

        let mut table = AddressTable::default();
        assert!(matches!(
            table.resolve(&plan[1]),
            Err(DeployError::UnresolvedReference { dependency, step })
                if dependency == "a" && step == "b"
        ));

        table.insert("a", Address::with_last_byte(7));
        assert_eq!(
            table.resolve(&plan[1]).unwrap(),
            vec![ArgValue::Bool(true), ArgValue::Address(Address::with_last_byte(7))]
        );
    }

    #[tokio::test]
    async fn test_run_passes_bytecode_and_resolved_args() {
        let plan = Plan::build(vec![
            StepSpec::new("a", "A"),
            StepSpec::new("b", "B").arg_ref("a"),
        ])
        .unwrap();

        let executor = Executor::new(CountingSubmitter::default()).with_chain_id(146);
        let manifest = executor.run(&plan, &artifacts()).await.unwrap();

        assert!(manifest.is_complete());
        assert_eq!(manifest.chain_id, Some(146));

        let calls = executor.submitter().calls.lock().unwrap();
        assert_eq!(calls[0].0.as_ref(), &[0x01]);
        assert_eq!(calls[1].0.as_ref(), &[0x02]);
        assert_eq!(calls[1].1, vec![ArgValue::Address(Address::with_last_byte(1))]);
    }

    #[tokio::test]
    async fn test_missing_artifact_aborts_before_submission() {
        let plan = Plan::build(vec![
            StepSpec::new("a", "A"),
            StepSpec::new("c", "Missing"),
            StepSpec::new("b", "B"),
        ])
        .unwrap();

        let executor = Executor::new(CountingSubmitter::default());
        let failure = executor.run(&plan, &artifacts()).await.unwrap_err();

        assert_eq!(failure.step, "c");
        assert!(matches!(failure.source, DeployError::ArtifactNotFound(ref n) if n == "Missing"));
        assert_eq!(failure.manifest.len(), 1);
        assert_eq!(failure.manifest.status, ManifestStatus::Aborted);
        assert_eq!(executor.submitter().calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_creation_code_aborts() {
        let plan = Plan::build(vec![StepSpec::new("a", "A")]).unwrap();
        let store = InMemoryArtifacts::new().with(Artifact::new("A", "0xnothex", "0x"));

        let executor = Executor::new(CountingSubmitter::default());
        let failure = executor.run(&plan, &store).await.unwrap_err();

        assert!(matches!(failure.source, DeployError::MalformedArtifact { .. }));
        assert!(failure.manifest.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let plan = Plan::build(vec![StepSpec::new("a", "A")]).unwrap();
        let (_tx, rx) = watch::channel(true);

        let executor = Executor::new(CountingSubmitter::default()).with_cancellation(rx);
        let manifest = executor.run(&plan, &artifacts()).await.unwrap();

        assert_eq!(manifest.status, ManifestStatus::Cancelled);
        assert!(manifest.is_empty());
        assert!(executor.submitter().calls.lock().unwrap().is_empty());
    }
}
