//! The swap pool deployment.
//!
//! Three contracts are deployed in order:
//! 1. the fee pool, owned by holders of the configured NFT and paid in the fee token;
//! 2. the pool logic implementation that every pool instance delegates to;
//! 3. the factory, wired to the logic implementation, the fee token and the fee pool.

use crate::{ContractsConfig, DeployError, Plan, StepSpec};

/// Step deploying the fee distribution pool.
pub const FEE_POOL_STEP: &str = "fee-pool";
/// Step deploying the pool logic implementation.
pub const POOL_LOGIC_STEP: &str = "swap-pool-logic";
/// Step deploying the factory.
pub const FACTORY_STEP: &str = "swap-pool-factory";

/// Step specs of the swap pool deployment.
pub fn swap_pool_steps(contracts: &ContractsConfig) -> Vec<StepSpec> {
    vec![
        StepSpec::new(FEE_POOL_STEP, &contracts.fee_pool)
            .arg(contracts.stoner_nft)
            .arg(contracts.fee_token),
        StepSpec::new(POOL_LOGIC_STEP, &contracts.pool_logic),
        StepSpec::new(FACTORY_STEP, &contracts.factory)
            .arg_ref(POOL_LOGIC_STEP)
            .arg(contracts.fee_token)
            .arg_ref(FEE_POOL_STEP),
    ]
}

/// Build the validated swap pool plan.
pub fn swap_pool_plan(contracts: &ContractsConfig) -> Result<Plan, DeployError> {
    Plan::build(swap_pool_steps(contracts))
}
