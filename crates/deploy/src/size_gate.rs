//! Deployable code size check.
//!
//! The gate is a pure function of an artifact and a ceiling. Whether a failing report blocks a
//! deployment is decided by the caller.

use std::fmt;

use serde::Serialize;

use crate::{Artifact, BytecodeField, DeployError};

/// EIP-170 ceiling on deployed (runtime) code, in bytes.
pub const EIP170_CODE_SIZE_LIMIT: u64 = 24_576;

/// Outcome of a size check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub contract_name: String,
    pub creation_size_bytes: u64,
    pub deployed_size_bytes: u64,
    pub limit_bytes: u64,
    pub within_limit: bool,
    /// `limit_bytes - deployed_size_bytes`, negative when over budget. Saturates at the `i64`
    /// bounds.
    pub margin_bytes: i64,
}

impl SizeReport {
    /// Remaining headroom as a percentage of the limit. Zero when over budget.
    pub fn headroom_percent(&self) -> f64 {
        if !self.within_limit || self.limit_bytes == 0 {
            return 0.0;
        }
        self.margin_bytes as f64 / self.limit_bytes as f64 * 100.0
    }

    /// Share of the deployed code that has to go to fit under the limit. Zero when within budget.
    pub fn reduction_needed_percent(&self) -> f64 {
        if self.within_limit {
            return 0.0;
        }
        self.margin_bytes.unsigned_abs() as f64 / self.deployed_size_bytes as f64 * 100.0
    }
}

impl fmt::Display for SizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.within_limit {
            write!(
                f,
                "{} is under the limit by {} bytes ({:.1}% headroom)",
                self.contract_name,
                self.margin_bytes,
                self.headroom_percent()
            )
        } else {
            write!(
                f,
                "{} is {} bytes over the limit ({:.1}% reduction needed)",
                self.contract_name,
                self.margin_bytes.unsigned_abs(),
                self.reduction_needed_percent()
            )
        }
    }
}

/// Evaluate `artifact` against `limit_bytes`.
///
/// Sizes are the hex digit count divided by two, ignoring an optional `0x` prefix. Only the
/// deployed code is compared with the limit; the creation size is reported for information.
pub fn evaluate(artifact: &Artifact, limit_bytes: u64) -> Result<SizeReport, DeployError> {
    let deployed_size_bytes = artifact.byte_len(BytecodeField::DeployedBytecode)? as u64;
    let creation_size_bytes = artifact.byte_len(BytecodeField::CreationBytecode)? as u64;

    let within_limit = deployed_size_bytes <= limit_bytes;
    let margin_bytes = if within_limit {
        i64::try_from(limit_bytes - deployed_size_bytes).unwrap_or(i64::MAX)
    } else {
        i64::try_from(deployed_size_bytes - limit_bytes).map_or(i64::MIN, |over| -over)
    };

    Ok(SizeReport {
        contract_name: artifact.contract_name.clone(),
        creation_size_bytes,
        deployed_size_bytes,
        limit_bytes,
        within_limit,
        margin_bytes,
    })
}
