// External tool invocation shared by the lsof source and the container cache

use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Upper bound for any external tool invocation
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} not found")]
    Unavailable(String),

    #[error("failed to run {program}: {source}")]
    Failed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Captured result of a finished tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

/// Run `program` with `args`, capturing stdout as lossy UTF-8.
///
/// stderr is discarded. A run that exceeds `timeout` is killed and reported
/// as [`ToolError::TimedOut`]. A non-zero exit is *not* an error here; the
/// caller decides what a failed exit means.
///
/// Blocks the caller. Inside the multi-threaded runtime the wait happens in
/// `block_in_place`; outside any runtime a current-thread runtime drives it.
pub fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<ToolOutput, ToolError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.block_on(run_tool_async(program, args, timeout)))
        }
        _ => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| ToolError::Failed {
                    program: program.to_string(),
                    source: e,
                })?;
            runtime.block_on(run_tool_async(program, args, timeout))
        }
    }
}

async fn run_tool_async(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ToolError::Unavailable(program.to_string()),
            _ => ToolError::Failed {
                program: program.to_string(),
                source: e,
            },
        })?;

    // Dropping the timed-out future drops the child, which kills it
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ToolError::Failed {
                program: program.to_string(),
                source: e,
            });
        }
        Err(_) => {
            log::warn!("{} did not finish within {:?}, killed", program, timeout);
            return Err(ToolError::TimedOut {
                program: program.to_string(),
                timeout,
            });
        }
    };

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}

/// Check if a command exists on this host
pub fn is_tool_available(program: &str) -> bool {
    std::process::Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
