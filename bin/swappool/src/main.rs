//! swappool is a CLI tool to size-check and deploy the swap pool contracts.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tokio::sync::watch;

use cli::{Cli, Command, OutputFormat};
use swappool_deploy::{
    CompilerSettings, Deployer, Manifest, RunFailure, SizeReport, SwapPoolConfig, swap_pool_plan,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt().with_max_level(cli.verbosity).init();

    let config = match &cli.config {
        Some(path) => SwapPoolConfig::load_from_file(&PathBuf::from(path))?,
        None => SwapPoolConfig::load_or_default()?,
    };

    tracing::debug!(
        project_root = %config.project_root.display(),
        network = %config.network.name,
        chain_id = config.network.chain_id,
        "Configuration resolved"
    );

    let deployer = Deployer::new(config);

    match cli.command {
        Command::SizeCheck {
            contract,
            limit,
            skip_compile,
        } => {
            let contract =
                contract.unwrap_or_else(|| deployer.config.size_check.contract.clone());
            let limit = limit.unwrap_or(deployer.config.size_check.limit_bytes);

            let report = deployer.size_check(&contract, limit, skip_compile).await?;
            print_size_report(&report, &deployer.config.compiler, cli.output);

            if !report.within_limit {
                anyhow::bail!("{report}");
            }
        }
        Command::CompileCheck {
            contracts,
            skip_compile,
        } => {
            let contracts = if contracts.is_empty() {
                deployer.config.compile_check.clone()
            } else {
                contracts
            };

            let failures = deployer.compile_check(&contracts, skip_compile).await?;
            for name in &contracts {
                match failures.iter().find(|(failed, _)| failed == name) {
                    Some((_, reason)) => println!("{name}: FAILED ({reason})"),
                    None => println!("{name}: ok"),
                }
            }

            if !failures.is_empty() {
                anyhow::bail!("{} contract(s) failed the compile check", failures.len());
            }
        }
        Command::Plan => {
            let plan = swap_pool_plan(&deployer.config.contracts)?;
            let fingerprint = plan
                .fingerprint(&deployer.artifacts())
                .unwrap_or_else(|e| format!("unavailable ({e})"));

            let mut table = new_table(cli.output);
            table.set_header(vec!["#", "Step", "Contract", "Constructor args"]);
            for (index, step) in plan.iter().enumerate() {
                let args = step
                    .constructor_args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                table.add_row(vec![
                    (index + 1).to_string(),
                    step.name.clone(),
                    step.artifact_ref.clone(),
                    args,
                ]);
            }
            println!("{table}");
            println!("Plan fingerprint: {fingerprint}");
        }
        Command::Deploy {
            redeploy,
            skip_compile,
        } => {
            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current step...");
                    cancel_tx.send_replace(true);
                }
            });

            let outcome = match deployer.deploy(redeploy, skip_compile, cancel_rx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let Some(manifest) = partial_manifest(&err) {
                        print_manifest(manifest, cli.output);
                        println!("Manifest: {}", deployer.config.manifest_path().display());
                    }
                    return Err(err.context("Deployment failed"));
                }
            };

            print_manifest(&outcome.manifest, cli.output);
            println!(
                "Manifest: {}{}",
                deployer.config.manifest_path().display(),
                if outcome.reused { " (reused)" } else { "" }
            );

            if !outcome.manifest.is_complete() {
                anyhow::bail!("Deployment {}", outcome.manifest.status);
            }
        }
    }

    Ok(())
}

fn new_table(output: OutputFormat) -> Table {
    let mut table = Table::new();
    if output == OutputFormat::Table {
        table.load_preset(UTF8_FULL);
    } else {
        table.load_preset(comfy_table::presets::NOTHING);
    }
    table
}

/// Steps that completed before a failed run, if `err` comes from the executor.
fn partial_manifest(err: &anyhow::Error) -> Option<&Manifest> {
    err.downcast_ref::<RunFailure>().map(|failure| &failure.manifest)
}

fn print_size_report(report: &SizeReport, compiler: &CompilerSettings, output: OutputFormat) {
    let mut table = new_table(output);
    table.set_header(vec!["Contract", report.contract_name.as_str()]);
    table.add_row(vec![
        "Compiler".to_string(),
        format!(
            "solc {}, optimizer runs {}, viaIR {}, evm {}",
            compiler.solc_version, compiler.optimizer_runs, compiler.via_ir, compiler.evm_version
        ),
    ]);
    table.add_row(vec![
        "Creation code".to_string(),
        format!("{} bytes", report.creation_size_bytes),
    ]);
    table.add_row(vec![
        "Deployed code".to_string(),
        format!("{} bytes", report.deployed_size_bytes),
    ]);
    table.add_row(vec!["Limit".to_string(), format!("{} bytes", report.limit_bytes)]);

    let margin = if report.within_limit {
        format!(
            "{} bytes under ({:.1}% headroom)",
            report.margin_bytes,
            report.headroom_percent()
        )
    } else {
        format!(
            "{} bytes over ({:.1}% reduction needed)",
            report.margin_bytes.unsigned_abs(),
            report.reduction_needed_percent()
        )
    };
    table.add_row(vec!["Margin".to_string(), margin]);
    table.add_row(vec![
        "Status".to_string(),
        if report.within_limit { "PASS" } else { "FAIL" }.to_string(),
    ]);

    println!("{table}");
}

fn print_manifest(manifest: &Manifest, output: OutputFormat) {
    let mut table = new_table(output);
    table.set_header(vec!["Step", "Contract", "Address", "Transaction"]);
    for record in manifest.iter() {
        table.add_row(vec![
            record.step_name.clone(),
            record.contract_name.clone(),
            record.deployed_address.to_string(),
            record.tx_hash.to_string(),
        ]);
    }
    println!("{table}");
    println!("Status: {}", manifest.status);
}
