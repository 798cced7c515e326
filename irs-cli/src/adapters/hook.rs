use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use irs_core::error::AppError;
use irs_core::remediation::{CommandOutput, ComputeApi, InstanceDescription};

use super::process::run_bounded;

/// Resource mutation through an operator-supplied executable.
///
/// Protocol: `<hook> describe <ref>` prints an `InstanceDescription` as JSON;
/// `stop <ref>`, `wait-stopped <ref> <secs>`, `set-type <ref> <type>` and `start <ref>`
/// signal success with exit status 0. Anything on stderr is carried into the error.
pub struct HookCompute {
    hook: Option<PathBuf>,
    call_timeout: Duration,
}

impl HookCompute {
    pub fn new(hook: Option<PathBuf>, call_timeout: Duration) -> Self {
        Self { hook, call_timeout }
    }

    fn call(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, AppError> {
        let Some(hook) = &self.hook else {
            return Err(AppError::new("REMEDIATION_NOT_CONFIGURED", "No compute hook configured")
                .with_details("set remediation.compute_hook or IRS_COMPUTE_HOOK"));
        };
        let mut cmd = Command::new(hook);
        cmd.args(args);
        tracing::debug!(hook = %hook.display(), ?args, "compute hook call");

        let out = run_bounded(cmd, timeout, "REMEDIATION_COMPUTE_UNAVAILABLE")?;
        if out.exit_code != Some(0) {
            return Err(AppError::new("REMEDIATION_COMPUTE_FAILED", "Compute hook reported failure").with_details(
                format!(
                    "op={}; exit={:?}; stderr={}",
                    args.first().copied().unwrap_or(""),
                    out.exit_code,
                    out.stderr.trim()
                ),
            ));
        }
        Ok(out)
    }
}

impl ComputeApi for HookCompute {
    fn describe(&self, resource_ref: &str) -> Result<InstanceDescription, AppError> {
        let out = self.call(&["describe", resource_ref], self.call_timeout)?;
        serde_json::from_str(out.stdout.trim()).map_err(|e| {
            AppError::new("REMEDIATION_COMPUTE_FAILED", "Compute hook printed an invalid description")
                .with_details(format!("resource_ref={resource_ref}; err={e}"))
        })
    }

    fn stop(&self, resource_ref: &str) -> Result<(), AppError> {
        self.call(&["stop", resource_ref], self.call_timeout).map(drop)
    }

    fn wait_stopped(&self, resource_ref: &str, timeout: Duration) -> Result<(), AppError> {
        let secs = timeout.as_secs().to_string();
        self.call(&["wait-stopped", resource_ref, &secs], timeout + self.call_timeout)
            .map(drop)
    }

    fn set_instance_type(&self, resource_ref: &str, instance_type: &str) -> Result<(), AppError> {
        self.call(&["set-type", resource_ref, instance_type], self.call_timeout)
            .map(drop)
    }

    fn start(&self, resource_ref: &str) -> Result<(), AppError> {
        self.call(&["start", resource_ref], self.call_timeout).map(drop)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("hook.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write hook");
        let mut perms = fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    #[test]
    fn describe_parses_hook_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hook = script(
            &dir,
            r#"[ "$1" = describe ] && echo '{"state":"running","instance_type":"t3.micro","private_ip":"10.0.0.5"}'"#,
        );
        let compute = HookCompute::new(Some(hook), Duration::from_secs(5));
        let d = compute.describe("i-0abc").expect("describe");
        assert!(d.is_running());
        assert_eq!(d.instance_type, "t3.micro");
        assert_eq!(d.address(), Some("10.0.0.5"));
    }

    #[test]
    fn non_zero_exit_is_a_failure_with_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hook = script(&dir, "echo 'IncorrectInstanceState' >&2; exit 1");
        let compute = HookCompute::new(Some(hook), Duration::from_secs(5));
        let err = compute.stop("i-0abc").expect_err("stop fails");
        assert_eq!(err.code, "REMEDIATION_COMPUTE_FAILED");
        assert!(err.details.unwrap_or_default().contains("IncorrectInstanceState"));
    }

    #[test]
    fn unconfigured_hook_is_reported() {
        let compute = HookCompute::new(None, Duration::from_secs(5));
        let err = compute.describe("i-0abc").expect_err("no hook");
        assert_eq!(err.code, "REMEDIATION_NOT_CONFIGURED");
    }
}
