use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// How reports are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Plain,
}

#[derive(Parser)]
#[command(name = "swappool")]
#[command(
    author,
    version,
    about = "Size-check and deploy the swap pool contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SWAPPOOL_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Swappool.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Swappool.toml is used when present, defaults otherwise.
    #[arg(long, alias = "conf", env = "SWAPPOOL_CONFIG")]
    pub config: Option<String>,

    /// How reports are printed.
    #[arg(long, env = "SWAPPOOL_OUTPUT", default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile and check that a contract's deployed code fits under the size limit.
    ///
    /// Exits with a non-zero status when the contract is over the limit.
    SizeCheck {
        /// The contract to check. Defaults to `size_check.contract` from the configuration.
        #[arg(long)]
        contract: Option<String>,

        /// The limit in bytes. Defaults to `size_check.limit_bytes` (24576, EIP-170).
        #[arg(long)]
        limit: Option<u64>,

        /// Use the existing artifacts instead of compiling first.
        #[arg(long, default_value_t = false)]
        skip_compile: bool,
    },

    /// Compile and confirm that the named contracts produced loadable artifacts.
    CompileCheck {
        /// Contracts to look for. Defaults to `compile_check` from the configuration.
        contracts: Vec<String>,

        /// Use the existing artifacts instead of compiling first.
        #[arg(long, default_value_t = false)]
        skip_compile: bool,
    },

    /// Print the deployment plan without submitting anything.
    Plan,

    /// Compile and deploy the fee pool, the pool logic and the factory, in order.
    Deploy {
        /// Redeploy all contracts.
        /// If not provided and a manifest for the network exists, the contracts are not redeployed.
        #[arg(long, env = "SWAPPOOL_REDEPLOY", default_value_t = false)]
        redeploy: bool,

        /// Use the existing artifacts instead of compiling first.
        #[arg(long, default_value_t = false)]
        skip_compile: bool,
    },
}
