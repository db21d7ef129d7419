use bird_tool_utils::external_command_checker::*;

use crate::error::{PanfillError, Result};

/// BLAST+ programs needed by the blastp homology method.
pub fn check_for_blast() -> Result<()> {
    check_for_makeblastdb()?;
    check_for_blastp()
}

pub fn check_for_makeblastdb() -> Result<()> {
    check_presence("makeblastdb")
}

pub fn check_for_blastp() -> Result<()> {
    check_presence("blastp")
}

fn check_presence(program: &str) -> Result<()> {
    self::check_for_external_command_presence(program, &format!("which {}", program)).map_err(
        |e| PanfillError::ExternalCommand {
            program: program.to_string(),
            detail: format!("not found on the PATH ({})", e),
        },
    )
}
