//! Project configuration.
//!
//! Configuration is layered with figment: built-in defaults, then `Swappool.toml`, then
//! `SWAPPOOL_`-prefixed environment variables (`__` separates nested keys, e.g.
//! `SWAPPOOL_NETWORK__RPC_URL`).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::{Address, address};
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CompilerSettings, EIP170_CODE_SIZE_LIMIT, MANIFEST_FILENAME, RpcSubmitterConfig};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Swappool.toml";

/// Prefix of environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "SWAPPOOL_";

/// Network the contracts are deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Name used for the deployment directory.
    pub name: String,
    pub rpc_url: Url,
    pub chain_id: u64,
    /// Node-managed account sending the creation transactions. The node's first account is used
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "sonic".to_string(),
            rpc_url: Url::parse("https://rpc.soniclabs.com/").expect("valid default RPC URL"),
            chain_id: 146,
            deployer: None,
            gas_limit: None,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2_000,
        }
    }
}

/// Contract names and external addresses used by the pool deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// ERC-20 the pools collect fees in.
    pub fee_token: Address,
    /// NFT collection whose holders share the fee pool.
    pub stoner_nft: Address,
    pub fee_pool: String,
    pub pool_logic: String,
    pub factory: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            fee_token: address!("0xC046dCb16592FBb3F9fA0C629b8D93090dD4cB76"),
            stoner_nft: address!("0x9b567e03d891F537b2B7874aA4A3308Cfe2F4FBb"),
            fee_pool: "StonerFeePool".to_string(),
            pool_logic: "SwapPool".to_string(),
            factory: "SwapPoolFactory".to_string(),
        }
    }
}

/// Settings for the `size-check` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeCheckConfig {
    pub contract: String,
    pub limit_bytes: u64,
}

impl Default for SizeCheckConfig {
    fn default() -> Self {
        Self {
            contract: "SwapPoolNative".to_string(),
            limit_bytes: EIP170_CODE_SIZE_LIMIT,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPoolConfig {
    /// Hardhat project root (where `hardhat.config.js` and `artifacts/` live).
    pub project_root: PathBuf,
    /// Directory receiving one sub-directory per network with its manifest.
    pub outdata: PathBuf,
    /// Contracts that must be present after compilation.
    pub compile_check: Vec<String>,
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub size_check: SizeCheckConfig,
    pub compiler: CompilerSettings,
}

impl Default for SwapPoolConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            outdata: PathBuf::from("deployments"),
            compile_check: vec!["SwapPoolNative".to_string(), "StonerFeePool".to_string()],
            network: NetworkConfig::default(),
            contracts: ContractsConfig::default(),
            size_check: SizeCheckConfig::default(),
            compiler: CompilerSettings::default(),
        }
    }
}

impl SwapPoolConfig {
    fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment,
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the configuration from a TOML file (or a directory containing one), layered over
    /// the defaults and under environment overrides.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let config: Self = Self::figment(Some(&config_path))
            .extract()
            .context(format!("Failed to load config from {}", config_path.display()))?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load `Swappool.toml` from the working directory if present, defaults otherwise.
    pub fn load_or_default() -> Result<Self> {
        let path = PathBuf::from(CONFIG_FILENAME);
        if path.exists() {
            return Self::load_from_file(&path);
        }

        tracing::debug!("No {} found, using defaults", CONFIG_FILENAME);
        Self::figment(None)
            .extract()
            .context("Failed to load configuration from environment")
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Directory holding the manifest and lock of the configured network.
    pub fn deployment_dir(&self) -> PathBuf {
        self.outdata.join(&self.network.name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.deployment_dir().join(MANIFEST_FILENAME)
    }

    /// Submitter settings for the configured network, sending from `from`.
    pub fn submitter_config(&self, from: Address) -> RpcSubmitterConfig {
        RpcSubmitterConfig {
            rpc_url: self.network.rpc_url.clone(),
            from,
            gas_limit: self.network.gas_limit,
            confirmation_timeout: Duration::from_secs(self.network.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.network.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_defaults_match_sonic_project() {
        let config = SwapPoolConfig::default();
        assert_eq!(config.network.chain_id, 146);
        assert_eq!(config.network.rpc_url.as_str(), "https://rpc.soniclabs.com/");
        assert_eq!(config.size_check.limit_bytes, 24_576);
        assert_eq!(config.size_check.contract, "SwapPoolNative");
        assert_eq!(config.compiler.optimizer_runs, 1);
        assert!(config.compiler.via_ir);
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("deployments/sonic/deployment-manifest.json")
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);

        let mut config = SwapPoolConfig::default();
        config.network.name = "local".to_string();
        config.network.chain_id = 31337;
        config.network.deployer = Some(address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        config.size_check.limit_bytes = 49_152;

        config.save_to_file(&path).expect("Failed to save config");
        let loaded =
            SwapPoolConfig::load_from_file(temp_dir.path()).expect("Failed to load config");

        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "[network]\nname = \"anvil\"\nrpc_url = \"http://localhost:8545\"\nchain_id = 31337\n",
        )
        .unwrap();

        let config = SwapPoolConfig::load_from_file(&path).expect("Failed to load config");

        assert_eq!(config.network.name, "anvil");
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.network.confirmation_timeout_secs, 120);
        assert_eq!(config.contracts, ContractsConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("swappool-test").expect("Failed to create temp dir");
        assert!(SwapPoolConfig::load_from_file(&temp_dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_submitter_config() {
        let config = SwapPoolConfig::default();
        let from = Address::with_last_byte(1);
        let submitter = config.submitter_config(from);
        assert_eq!(submitter.from, from);
        assert_eq!(submitter.confirmation_timeout, Duration::from_secs(120));
        assert_eq!(submitter.poll_interval, Duration::from_millis(2_000));
    }
}
