//! swappool-deploy - Size gate and dependency-ordered deployer for the swap pool contracts.
//!
//! The crate checks compiled artifacts against a code size ceiling and deploys a chain of
//! contracts in dependency order, feeding each deployed address into later constructor
//! arguments. The compiler and the RPC endpoint sit behind the [`Compiler`] and
//! [`TxSubmitter`] traits.

mod artifact;
pub use artifact::{ARTIFACTS_DIR, Artifact, ArtifactStore, HardhatArtifacts, InMemoryArtifacts};

mod compiler;
pub use compiler::{Compiler, CompilerSettings, HardhatCompiler};

mod config;
pub use config::{
    CONFIG_FILENAME, ContractsConfig, ENV_PREFIX, NetworkConfig, SizeCheckConfig, SwapPoolConfig,
};

mod deployer;
pub use deployer::{DeployOutcome, Deployer};

mod error;
pub use error::{BytecodeField, DeployError, RunFailure};

mod executor;
pub use executor::{AddressTable, Deployment, Executor, TxSubmitter};

mod manifest;
pub use manifest::{DeploymentLock, DeploymentRecord, MANIFEST_FILENAME, Manifest, ManifestStatus};

mod plan;
pub use plan::{ArgSlot, ArgValue, DeploymentStep, Plan, StepSpec, encode_constructor_args};

pub mod rpc;
pub use rpc::{RpcSubmitter, RpcSubmitterConfig};

mod size_gate;
pub use size_gate::{EIP170_CODE_SIZE_LIMIT, SizeReport, evaluate};

mod standard;
pub use standard::{FACTORY_STEP, FEE_POOL_STEP, POOL_LOGIC_STEP, swap_pool_plan, swap_pool_steps};
