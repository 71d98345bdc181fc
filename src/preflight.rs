use crate::config::Utility;
use std::env;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("device target is empty")]
    EmptyTarget,
    #[error("transport program '{0}' was not found on PATH")]
    MissingProgram(String),
}

/// Check that the host can poll a device with the given utility.
///
/// CLI targets are shell commands whose first word (`telnet`, `socat`, ...)
/// must be runnable. SNMP needs nothing outside this binary.
pub fn check(utility: Utility, target: &str) -> Result<(), PreflightError> {
    if !cfg!(target_os = "linux") {
        tracing::warn!(
            "Host OS is {}, only Linux is tested. Continuing anyway.",
            env::consts::OS
        );
    }

    match utility {
        Utility::Snmp => Ok(()),
        Utility::Cli => {
            let program = target
                .split_whitespace()
                .next()
                .ok_or(PreflightError::EmptyTarget)?;
            let path = which::which(program)
                .map_err(|_| PreflightError::MissingProgram(program.to_string()))?;
            tracing::debug!("Using {} for CLI target '{}'", path.display(), target);
            Ok(())
        }
    }
}
