//! Deployment plans.
//!
//! A [`Plan`] is an ordered, validated list of contract creations. Constructor arguments are
//! either literals or references to the address produced by an earlier step, so a dependency
//! error is caught when the plan is built rather than halfway through a deployment.

use std::{collections::HashMap, fmt};

use alloy_core::primitives::{Address, B256, U256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ArtifactStore, DeployError};

/// A concrete constructor argument.
///
/// Every parameter used by the pool contracts is a static ABI type, so each value encodes to a
/// single 32-byte word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
}

impl ArgValue {
    /// The ABI head word for this value.
    pub fn abi_word(&self) -> B256 {
        match self {
            ArgValue::Address(address) => address.into_word(),
            ArgValue::Uint(value) => B256::from(value.to_be_bytes::<32>()),
            ArgValue::Bool(value) => B256::with_last_byte(*value as u8),
        }
    }

    /// The address, if this is an address argument.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            ArgValue::Address(address) => Some(*address),
            _ => None,
        }
    }
}

impl From<Address> for ArgValue {
    fn from(address: Address) -> Self {
        ArgValue::Address(address)
    }
}

impl From<U256> for ArgValue {
    fn from(value: U256) -> Self {
        ArgValue::Uint(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Address(address) => write!(f, "{address}"),
            ArgValue::Uint(value) => write!(f, "{value}"),
            ArgValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// ABI-encode a constructor argument list (static types only).
pub fn encode_constructor_args(args: &[ArgValue]) -> Vec<u8> {
    args.iter()
        .flat_map(|arg| arg.abi_word().0)
        .collect()
}

/// A constructor argument slot in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSlot {
    /// A value known when the plan is built.
    Literal(ArgValue),
    /// The address deployed by the named earlier step.
    Reference(String),
}

impl ArgSlot {
    pub fn literal(value: impl Into<ArgValue>) -> Self {
        ArgSlot::Literal(value.into())
    }

    pub fn reference(step: impl Into<String>) -> Self {
        ArgSlot::Reference(step.into())
    }
}

impl fmt::Display for ArgSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSlot::Literal(value) => write!(f, "{value}"),
            ArgSlot::Reference(step) => write!(f, "ref({step})"),
        }
    }
}

/// Unvalidated description of one deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    /// Name of the artifact whose creation code is deployed.
    pub contract: String,
    #[serde(default)]
    pub args: Vec<ArgSlot>,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: contract.into(),
            args: Vec::new(),
        }
    }

    /// Append a literal constructor argument.
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.args.push(ArgSlot::literal(value));
        self
    }

    /// Append a constructor argument resolved to the address deployed by `step`.
    pub fn arg_ref(mut self, step: impl Into<String>) -> Self {
        self.args.push(ArgSlot::reference(step));
        self
    }
}

/// A validated deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStep {
    pub name: String,
    pub artifact_ref: String,
    pub constructor_args: Vec<ArgSlot>,
}

/// An immutable, validated sequence of deployment steps.
///
/// Every [`ArgSlot::Reference`] names a step with a strictly lower index and step names are
/// unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deref)]
pub struct Plan {
    steps: Vec<DeploymentStep>,
}

impl Plan {
    /// Validate `specs` and build a plan.
    pub fn build(specs: Vec<StepSpec>) -> Result<Self, DeployError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name.as_str(), i).is_some() {
                return Err(DeployError::DuplicateStepName(spec.name.clone()));
            }
        }

        for (i, spec) in specs.iter().enumerate() {
            for slot in &spec.args {
                let ArgSlot::Reference(dependency) = slot else {
                    continue;
                };

                match index.get(dependency.as_str()) {
                    Some(&dep_index) if dep_index < i => {}
                    _ => {
                        return Err(DeployError::InvalidDependency {
                            dependency: dependency.clone(),
                            step: spec.name.clone(),
                        });
                    }
                }
            }
        }

        let steps = specs
            .into_iter()
            .map(|spec| DeploymentStep {
                name: spec.name,
                artifact_ref: spec.contract,
                constructor_args: spec.args,
            })
            .collect();

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    /// Deterministic SHA-256 over the plan and the creation code of every artifact it deploys.
    ///
    /// Two runs with the same fingerprint would submit byte-identical creation transactions
    /// (modulo addresses resolved at run time).
    pub fn fingerprint(&self, artifacts: &impl ArtifactStore) -> Result<String, DeployError> {
        let mut hasher = Sha256::new();

        for step in &self.steps {
            let artifact = artifacts.read_artifact(&step.artifact_ref)?;
            let code = artifact.creation_code()?;

            hash_field(&mut hasher, step.name.as_bytes());
            hash_field(&mut hasher, step.artifact_ref.as_bytes());
            for slot in &step.constructor_args {
                hash_field(&mut hasher, slot.to_string().as_bytes());
            }
            hash_field(&mut hasher, &code);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}

/// Feeds a length-prefixed field to the hasher.
fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;
    use crate::{Artifact, InMemoryArtifacts};

    fn three_step_chain() -> Vec<StepSpec> {
        vec![
            StepSpec::new("deployPool", "Pool")
                .arg(address!("0x9b567e03d891F537b2B7874aA4A3308Cfe2F4FBb")),
            StepSpec::new("deployLogic", "Logic"),
            StepSpec::new("deployFactory", "Factory")
                .arg_ref("deployLogic")
                .arg_ref("deployPool"),
        ]
    }

    #[test]
    fn test_accepts_three_step_chain() {
        let plan = Plan::build(three_step_chain()).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2].name, "deployFactory");
        assert_eq!(
            plan[2].constructor_args,
            vec![ArgSlot::reference("deployLogic"), ArgSlot::reference("deployPool")]
        );
    }

    #[test]
    fn test_rejects_self_reference() {
        let specs = vec![StepSpec::new("a", "A"), StepSpec::new("b", "B").arg_ref("b")];
        match Plan::build(specs) {
            Err(DeployError::InvalidDependency { dependency, step }) => {
                assert_eq!(dependency, "b");
                assert_eq!(step, "b");
            }
            other => panic!("expected invalid dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_forward_reference() {
        let specs = vec![StepSpec::new("a", "A").arg_ref("b"), StepSpec::new("b", "B")];
        assert!(matches!(
            Plan::build(specs),
            Err(DeployError::InvalidDependency { dependency, step })
                if dependency == "b" && step == "a"
        ));
    }

    #[test]
    fn test_rejects_unknown_reference() {
        let specs = vec![StepSpec::new("a", "A").arg_ref("missing")];
        assert!(matches!(
            Plan::build(specs),
            Err(DeployError::InvalidDependency { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let specs = vec![StepSpec::new("a", "A"), StepSpec::new("a", "B")];
        assert!(matches!(
            Plan::build(specs),
            Err(DeployError::DuplicateStepName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_empty_plan_is_valid() {
        assert!(Plan::build(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_abi_encoding() {
        let addr = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
        let encoded = encode_constructor_args(&[
            ArgValue::Address(addr),
            ArgValue::Uint(U256::from(1_000_000_000_000_000_000u128)),
            ArgValue::Bool(true),
        ]);

        assert_eq!(encoded.len(), 96);
        assert_eq!(
            hex::encode(&encoded[..32]),
            "00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
        );
        assert_eq!(
            hex::encode(&encoded[32..64]),
            "0000000000000000000000000000000000000000000000000de0b6b3a7640000"
        );
        assert_eq!(encoded[95], 1);
        assert!(encoded[64..95].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_fingerprint_tracks_bytecode() {
        let plan = Plan::build(three_step_chain()).unwrap();
        let artifacts = InMemoryArtifacts::new()
            .with(Artifact::new("Pool", "0x6001", "0x"))
            .with(Artifact::new("Logic", "0x6002", "0x"))
            .with(Artifact::new("Factory", "0x6003", "0x"));

        let first = plan.fingerprint(&artifacts).unwrap();
        assert_eq!(first, plan.fingerprint(&artifacts).unwrap());
        assert_eq!(first.len(), 64);

        let changed = artifacts.with(Artifact::new("Logic", "0x6004", "0x"));
        assert_ne!(first, plan.fingerprint(&changed).unwrap());
    }

    #[test]
    fn test_fingerprint_requires_artifacts() {
        let plan = Plan::build(three_step_chain()).unwrap();
        assert!(matches!(
            plan.fingerprint(&InMemoryArtifacts::new()),
            Err(DeployError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(ArgSlot::reference("fee-pool").to_string(), "ref(fee-pool)");
        assert_eq!(ArgSlot::literal(true).to_string(), "true");
    }
}
