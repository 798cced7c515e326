use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use irs_core::error::AppError;
use irs_core::remediation::CommandOutput;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run a child process to completion or kill it once `timeout` passes.
///
/// Spawn failures are `unavailable` (the binary is missing or not executable); a non-zero
/// exit is returned as output for the caller to judge.
pub fn run_bounded(mut cmd: Command, timeout: Duration, code: &str) -> Result<CommandOutput, AppError> {
    let program = format!("{:?}", cmd.get_program());
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            AppError::unavailable(code, "Failed to spawn process").with_details(format!("program={program}; err={e}"))
        })?;

    // Drain both pipes concurrently so a chatty child cannot block on a full buffer.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::unavailable(code, "Process timed out")
                    .with_details(format!("program={program}; timeout_secs={}", timeout.as_secs())));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(AppError::new(code, "Failed to wait for process")
                    .with_details(format!("program={program}; err={e}")));
            }
        }
    };

    Ok(CommandOutput {
        stdout: stdout.map(join).unwrap_or_default(),
        stderr: stderr.map(join).unwrap_or_default(),
        exit_code: status.code(),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let out = run_bounded(cmd, Duration::from_secs(5), "TEST_PROCESS").expect("run");
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.exit_code, Some(3));
    }

    #[test]
    fn slow_process_is_killed_at_the_deadline() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = run_bounded(cmd, Duration::from_millis(200), "TEST_PROCESS").expect_err("timeout");
        assert_eq!(err.code, "TEST_PROCESS");
        assert!(err.retryable);
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let cmd = Command::new("/nonexistent/irs-hook");
        let err = run_bounded(cmd, Duration::from_secs(1), "TEST_PROCESS").expect_err("spawn");
        assert!(err.retryable);
    }
}
