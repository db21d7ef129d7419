use std::process::Command;

use crate::error::{PanfillError, Result};

/// Run an external command to completion, returning an error describing the
/// failure when it cannot be started or exits unsuccessfully.
pub fn run_command(cmd: &mut Command, program: &str) -> Result<()> {
    debug!("Running {} command: {:?}", program, cmd);
    let output = cmd.output().map_err(|e| PanfillError::ExternalCommand {
        program: program.to_string(),
        detail: format!("failed to start ({}), attempted command was {:?}", e, cmd),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Error when running {} process.", program);
        error!("The STDERR was: {:?}", stderr);
        debug!("The STDOUT was: {:?}", String::from_utf8_lossy(&output.stdout));
        return Err(PanfillError::ExternalCommand {
            program: program.to_string(),
            detail: format!(
                "{} from command {:?}: {}",
                output.status,
                cmd,
                stderr.trim()
            ),
        });
    }
    debug!("Process {} finished", program);
    Ok(())
}
