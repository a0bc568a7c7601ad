use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::{
    ArtifactStore, Compiler, DeploymentLock, Executor, HardhatArtifacts, HardhatCompiler,
    Manifest, ManifestStatus, RpcSubmitter, SizeReport, SwapPoolConfig, evaluate, rpc,
    swap_pool_plan,
};

/// Result of [`Deployer::deploy`].
#[derive(Debug)]
pub struct DeployOutcome {
    pub manifest: Manifest,
    /// `true` when an identical, completed deployment was found and nothing was submitted.
    pub reused: bool,
}

/// Drives compilation, size checks and the swap pool deployment for one configuration.
#[derive(Debug, Clone)]
pub struct Deployer {
    pub config: SwapPoolConfig,
}

impl Deployer {
    pub fn new(config: SwapPoolConfig) -> Self {
        Self { config }
    }

    pub fn artifacts(&self) -> HardhatArtifacts {
        HardhatArtifacts::new(&self.config.project_root)
    }

    pub async fn compile(&self) -> Result<()> {
        HardhatCompiler::new(&self.config.project_root)
            .compile()
            .await
            .context("Failed to compile contracts")
    }

    /// Compile (unless `skip_compile`) and evaluate `contract` against `limit_bytes`.
    pub async fn size_check(
        &self,
        contract: &str,
        limit_bytes: u64,
        skip_compile: bool,
    ) -> Result<SizeReport> {
        if !skip_compile {
            self.compile().await?;
        }

        let artifact = self.artifacts().read_artifact(contract)?;
        let report = evaluate(&artifact, limit_bytes)?;

        tracing::info!(
            contract,
            creation_size = report.creation_size_bytes,
            deployed_size = report.deployed_size_bytes,
            limit = report.limit_bytes,
            margin = report.margin_bytes,
            within_limit = report.within_limit,
            "Size check evaluated"
        );

        Ok(report)
    }

    /// Compile (unless `skip_compile`) and confirm every named artifact can be loaded.
    ///
    /// Returns the contracts that could not be loaded, with the reason.
    pub async fn compile_check(
        &self,
        contracts: &[String],
        skip_compile: bool,
    ) -> Result<Vec<(String, String)>> {
        if !skip_compile {
            self.compile().await?;
        }

        let artifacts = self.artifacts();
        let failures = contracts
            .iter()
            .filter_map(|name| {
                artifacts
                    .read_artifact(name)
                    .and_then(|a| a.creation_code())
                    .err()
                    .map(|e| (name.clone(), e.to_string()))
            })
            .collect();

        Ok(failures)
    }

    /// Deploy the swap pool contracts.
    ///
    /// A completed manifest with the same plan fingerprint is reused unless `redeploy` is set.
    /// A partial manifest from an earlier run blocks the deployment unless `redeploy` is set,
    /// since its contracts already exist on-chain. A previous manifest that is replaced is
    /// archived next to the new one first. The new manifest is saved whatever the outcome.
    pub async fn deploy(
        &self,
        redeploy: bool,
        skip_compile: bool,
        cancel: watch::Receiver<bool>,
    ) -> Result<DeployOutcome> {
        tracing::info!(network = %self.config.network.name, "Starting deployment process...");

        if !skip_compile {
            self.compile().await?;
        }

        let artifacts = self.artifacts();
        let plan = swap_pool_plan(&self.config.contracts).context("Invalid deployment plan")?;
        let fingerprint = plan
            .fingerprint(&artifacts)
            .context("Failed to fingerprint deployment plan")?;

        let _lock = DeploymentLock::acquire(&self.config.deployment_dir())?;
        let manifest_path = self.config.manifest_path();

        if manifest_path.exists() && !redeploy {
            let previous = Manifest::load_from_file(&manifest_path)?;

            match previous.status {
                ManifestStatus::Completed
                    if previous.fingerprint.as_deref() == Some(fingerprint.as_str())
                        && previous.chain_id == Some(self.config.network.chain_id) =>
                {
                    tracing::info!(
                        path = %manifest_path.display(),
                        "Contracts already deployed with this plan, skipping deployment"
                    );
                    return Ok(DeployOutcome {
                        manifest: previous,
                        reused: true,
                    });
                }
                ManifestStatus::Completed => {
                    tracing::info!("Plan changed since the last deployment, redeploying");
                }
                status => {
                    anyhow::bail!(
                        "Previous deployment at {} is {} with {} contract(s) on-chain; \
                         inspect it and rerun with --redeploy",
                        manifest_path.display(),
                        status,
                        previous.len()
                    );
                }
            }
        }

        let from = match self.config.network.deployer {
            Some(address) => address,
            None => rpc::first_node_account(&self.config.network.rpc_url)
                .await
                .context("Failed to resolve deployer account")?,
        };

        let submitter = RpcSubmitter::new(self.config.submitter_config(from))?;
        submitter.verify_chain_id(self.config.network.chain_id).await?;

        tracing::info!(
            deployer = %from,
            rpc_url = %self.config.network.rpc_url,
            chain_id = self.config.network.chain_id,
            fingerprint = %fingerprint,
            "Deploying swap pool contracts..."
        );

        // Contracts recorded by the previous manifest are on-chain; keep their record.
        Manifest::archive(&manifest_path)?;

        let executor = Executor::new(submitter)
            .with_chain_id(self.config.network.chain_id)
            .with_fingerprint(fingerprint)
            .with_cancellation(cancel);

        match executor.run(&plan, &artifacts).await {
            Ok(manifest) => {
                manifest.save_to_file(&manifest_path)?;
                Ok(DeployOutcome {
                    manifest,
                    reused: false,
                })
            }
            Err(failure) => {
                if let Err(e) = failure.manifest.save_to_file(&manifest_path) {
                    tracing::error!(err = %e, "Failed to save partial manifest");
                }
                Err(failure.into())
            }
        }
    }
}
