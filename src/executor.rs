//! Fault-contained command execution.

use tracing::warn;

use crate::command::{Command, CommandResult};
use crate::config::Saml2Config;
use crate::error::CommandError;
use crate::request::HttpRequestData;

/// Run a command, converting protocol faults into a bare 500.
///
/// The returned result never carries a principal or body for a failed
/// exchange. Infrastructure faults are returned as `Err` for the host to
/// handle.
pub fn run_command(
    command: Command,
    request: &HttpRequestData,
    config: &Saml2Config,
) -> anyhow::Result<CommandResult> {
    match command.run(request, config) {
        Ok(result) => Ok(result),
        Err(CommandError::Protocol(e)) => {
            warn!(command = %command, path = %request.path, error = %e, "SAML2 command failed");
            Ok(CommandResult::internal_server_error())
        }
        Err(CommandError::Internal(e)) => Err(e.context(format!("SAML2 command {} failed", command))),
    }
}
