use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const STATE_RUNNING: &str = "running";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceDescription {
    pub state: String,
    pub instance_type: String,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
}

impl InstanceDescription {
    pub fn is_running(&self) -> bool {
        self.state == STATE_RUNNING
    }

    /// Private address first, public as fallback.
    pub fn address(&self) -> Option<&str> {
        self.private_ip
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.public_ip.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Resource mutation capability. Each call is blocking and bounded by the adapter.
pub trait ComputeApi {
    fn describe(&self, resource_ref: &str) -> Result<InstanceDescription, AppError>;
    fn stop(&self, resource_ref: &str) -> Result<(), AppError>;
    fn wait_stopped(&self, resource_ref: &str, timeout: Duration) -> Result<(), AppError>;
    fn set_instance_type(&self, resource_ref: &str, instance_type: &str) -> Result<(), AppError>;
    fn start(&self, resource_ref: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

pub trait RemoteSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput, AppError>;
}

/// Remote command execution. Connection retries, if any, belong to the adapter.
pub trait RemoteExec {
    fn connect(&self, resource_ref: &str, timeout: Duration) -> Result<Box<dyn RemoteSession>, AppError>;
}
