//! Process invocation.
//!
//! External tools (git, make, the delivery testnet generator, the genesis
//! scripts) run to completion before the pipeline advances. A non-zero
//! exit is surfaced as a step failure; retries, if ever wanted, belong
//! here and not in the provisioning engine.

use log::debug;
use std::path::Path;
use std::process::Command;

/// Errors raised by external tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to spawn '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {code}: {stderr}")]
    ExitStatus {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Captured output of a completed process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Runs a command to completion in a working directory.
pub trait ProcessRunner {
    fn run(&self, command: &str, args: &[&str], cwd: &Path) -> Result<ProcessOutput, BuildError>;
}

/// Default runner backed by `std::process::Command`.
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn run(&self, command: &str, args: &[&str], cwd: &Path) -> Result<ProcessOutput, BuildError> {
        debug!("running '{}' {:?} in {:?}", command, args, cwd);

        let output = Command::new(command)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|source| BuildError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(BuildError::ExitStatus {
                command: command.to_string(),
                code: exit_code,
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}
