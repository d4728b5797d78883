//! `hcacheck version`: evaluate a constraint from the command line.

use anyhow::Result;
use hcacheck_core::{VersionError, firmware_satisfies, satisfies};

use crate::error::CliError;

/// Returns whether `actual` satisfies `constraint`.
pub fn execute(constraint: &str, actual: &str, firmware: bool) -> Result<bool> {
    let evaluate: fn(&str, &str) -> Result<bool, VersionError> = if firmware {
        firmware_satisfies
    } else {
        satisfies
    };
    let ok = evaluate(constraint, actual).map_err(|e| CliError::Arguments(e.to_string()))?;
    println!(
        "{actual} {} {constraint}",
        if ok { "satisfies" } else { "does not satisfy" }
    );
    Ok(ok)
}
