use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::ControllerError;

/// Marker substituted for the credential in anything that reaches a log line.
/// Fixed length so the marker leaks nothing about the credential.
const REDACTED: &str = "********";

/// Spawns the external control-plane program with an argument vector,
/// bounds its lifetime, and classifies the result.
///
/// Arguments are always passed as a vector, never through a shell, so a
/// hostile hostname or IP cannot inject into the command line.
pub struct ScriptInvoker {
    script: PathBuf,
}

impl ScriptInvoker {
    pub fn new(script: PathBuf) -> Self {
        Self { script }
    }

    /// Run the program and return its stdout on a zero exit.
    ///
    /// The child leads its own process group, so on timeout the whole group
    /// is SIGKILLed and the child reaped before returning; nothing the
    /// program spawned outlives the call. The invoker does not assume any
    /// stdout format; parsing is the caller's concern.
    pub async fn invoke(
        &self,
        args: &[String],
        secret: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ControllerError> {
        debug!(
            "invoking {} {}",
            self.script.display(),
            redacted_line(args, secret)
        );

        let child = Command::new(&self.script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ControllerError::process(
                    None,
                    &format!("failed to spawn {}: {}", self.script.display(), e),
                )
            })?;

        // The child's pid is the group id (process_group(0) above).
        let pgid = child.id().map(|pid| pid as i32);
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let output = match timeout {
            Some(deadline) => {
                match tokio::time::timeout(deadline, wait.as_mut()).await {
                    Ok(result) => result,
                    Err(_) => {
                        // Kill the whole group, descendants included, then
                        // reap the child before reporting the timeout.
                        if let Some(pgid) = pgid {
                            unsafe { libc::killpg(pgid, libc::SIGKILL) };
                        }
                        let _ = wait.await;
                        return Err(ControllerError::DiscoveryTimeout);
                    }
                }
            }
            None => wait.await,
        }
        .map_err(|e| ControllerError::process(None, &format!("failed to collect output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ControllerError::process(output.status.code(), &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Render an argument vector for logging with the credential scrubbed.
/// Every log line that includes an argv must go through this.
pub fn redacted_line(args: &[String], secret: &str) -> String {
    args.iter()
        .map(|arg| {
            if !secret.is_empty() && arg == secret {
                REDACTED
            } else {
                arg.as_str()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
