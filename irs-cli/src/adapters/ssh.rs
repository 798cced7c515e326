use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use irs_core::error::AppError;
use irs_core::remediation::{CommandOutput, ComputeApi, RemoteExec, RemoteSession};

use super::process::run_bounded;

/// Slack on top of the connect timeout for the command itself to finish.
const COMMAND_GRACE: Duration = Duration::from_secs(60);

/// Remote execution through the system `ssh` binary in batch mode. The host address is
/// resolved from the compute capability's description of the resource.
pub struct SshExec<'a> {
    compute: &'a dyn ComputeApi,
    user: String,
    identity_file: Option<PathBuf>,
}

impl<'a> SshExec<'a> {
    pub fn new(compute: &'a dyn ComputeApi, user: impl Into<String>, identity_file: Option<PathBuf>) -> Self {
        Self {
            compute,
            user: user.into(),
            identity_file,
        }
    }
}

struct SshSession {
    destination: String,
    identity_file: Option<PathBuf>,
    connect_timeout: Duration,
}

impl SshSession {
    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .args(["-o", "ServerAliveInterval=5", "-o", "ServerAliveCountMax=3"]);
        if let Some(key) = &self.identity_file {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(&self.destination).arg(remote);
        cmd
    }
}

impl RemoteSession for SshSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput, AppError> {
        tracing::debug!(destination = %self.destination, %command, "ssh run");
        let out = run_bounded(
            self.command(command),
            self.connect_timeout + COMMAND_GRACE,
            "REMEDIATION_SSH_UNAVAILABLE",
        )?;
        // ssh reserves 255 for its own failures; anything else is the remote command's.
        if out.exit_code == Some(255) {
            return Err(AppError::unavailable("REMEDIATION_SSH_UNAVAILABLE", "SSH connection lost")
                .with_details(format!("destination={}; stderr={}", self.destination, out.stderr.trim())));
        }
        Ok(out)
    }
}

impl RemoteExec for SshExec<'_> {
    fn connect(&self, resource_ref: &str, timeout: Duration) -> Result<Box<dyn RemoteSession>, AppError> {
        let description = self.compute.describe(resource_ref)?;
        let host = description.address().ok_or_else(|| {
            AppError::new("REMEDIATION_NO_ADDRESS", "Resource has no reachable address")
                .with_details(format!("resource_ref={resource_ref}; state={}", description.state))
        })?;

        let mut session = SshSession {
            destination: format!("{}@{host}", self.user),
            identity_file: self.identity_file.clone(),
            connect_timeout: timeout,
        };

        // Probe once so connection failures surface from `connect`, not the first command.
        let probe = session.run("true")?;
        if probe.exit_code != Some(0) {
            return Err(AppError::unavailable("REMEDIATION_SSH_UNAVAILABLE", "SSH probe failed")
                .with_details(format!("destination={}; stderr={}", session.destination, probe.stderr.trim())));
        }
        tracing::info!(resource_ref, destination = %session.destination, "ssh session established");
        Ok(Box::new(session))
    }
}
