//! Compiler invocation.

use std::{future::Future, path::PathBuf, process::Stdio};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Something that compiles the project so that its artifacts can be read.
pub trait Compiler {
    fn compile(&self) -> impl Future<Output = Result<(), anyhow::Error>> + Send;
}

/// Compiler settings the artifacts are expected to be built with.
///
/// These are reported next to size checks; the Hardhat config in the project root is what
/// actually drives solc.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerSettings {
    pub solc_version: String,
    pub optimizer_runs: u32,
    pub via_ir: bool,
    pub evm_version: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            solc_version: "0.8.19".to_string(),
            optimizer_runs: 1,
            via_ir: true,
            evm_version: "london".to_string(),
        }
    }
}

/// Runs `npx hardhat compile` in a project directory.
#[derive(Debug, Clone)]
pub struct HardhatCompiler {
    project_root: PathBuf,
    program: String,
    args: Vec<String>,
}

impl HardhatCompiler {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            program: "npx".to_string(),
            args: vec!["hardhat".to_string(), "compile".to_string()],
        }
    }

    /// Replace the command used to compile (e.g. a `pnpm` wrapper).
    pub fn with_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }
}

impl Compiler for HardhatCompiler {
    async fn compile(&self) -> Result<(), anyhow::Error> {
        tracing::info!(
            project_root = %self.project_root.display(),
            command = %format!("{} {}", self.program, self.args.join(" ")),
            "Compiling contracts..."
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "compiler", "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Compilation failed ({}): {}",
                output.status,
                stderr.trim()
            );
        }

        tracing::info!("Compilation finished");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let compiler = HardhatCompiler::new(".").with_command("true", vec![]);
        assert!(compiler.compile().await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        let compiler = HardhatCompiler::new(".").with_command(
            "sh",
            vec!["-c".to_string(), "echo 'HH700: boom' >&2; exit 1".to_string()],
        );
        let err = compiler.compile().await.unwrap_err();
        assert!(err.to_string().contains("HH700: boom"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let compiler = HardhatCompiler::new(".").with_command("swappool-no-such-binary", vec![]);
        assert!(compiler.compile().await.is_err());
    }
}
