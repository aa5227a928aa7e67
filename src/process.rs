use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::process::Command;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

use crate::AppResult;

/// Captured result of a single child process run.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandOutput {
    pub program: String,
    pub args: Vec<String>,
    /// `None` when the child was killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    #[serde(with = "crate::serde_helpers::offset_datetime")]
    pub started_at: OffsetDateTime,
    #[serde(with = "crate::serde_helpers::duration")]
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run a child process to completion, capturing stdout and stderr.
///
/// `limit` of `None` waits indefinitely. On expiry the child is killed and
/// the output is marked timed out instead of surfacing an error, so callers
/// can report the step like any other failure.
#[tracing::instrument(name = "Running external command", level = "debug", skip(cwd))]
pub async fn run_command<P: AsRef<Path>>(
    program: &str,
    args: &[&str],
    cwd: P,
    limit: Option<Duration>,
) -> AppResult<CommandOutput> {
    let started_at = OffsetDateTime::now_utc();
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd.as_ref())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the wait future on timeout must not leave the child behind.
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    let waited = match limit {
        Some(limit) => match timeout(limit, child.wait_with_output()).await {
            Ok(result) => Some(result?),
            Err(_) => None,
        },
        None => Some(child.wait_with_output().await?),
    };
    let elapsed = start.elapsed();

    let output = match waited {
        Some(raw) => {
            trace!("{} {:?} exited with {:?}", program, args, raw.status.code());
            CommandOutput {
                program: program.to_owned(),
                args: args.iter().map(|a| (*a).to_owned()).collect(),
                exit_code: raw.status.code(),
                stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
                timed_out: false,
                started_at,
                elapsed,
            }
        }
        None => {
            warn!("{} {:?} timed out after {:?}", program, args, limit);
            CommandOutput {
                program: program.to_owned(),
                args: args.iter().map(|a| (*a).to_owned()).collect(),
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
                started_at,
                elapsed,
            }
        }
    };

    Ok(output)
}

/// Kill any configured editor processes that might be holding the tree
/// hostage (swap files, half-written buffers).
///
/// Every failure here is swallowed: a missing `pkill`, or no matching
/// process, must never stop the pipeline.
#[tracing::instrument(name = "Killing editor processes", level = "info")]
pub async fn kill_editors(editors: &[String]) -> Vec<CommandOutput> {
    let mut outputs = Vec::with_capacity(editors.len());
    for editor in editors {
        match run_command("pkill", &["-9", editor], ".", None).await {
            Ok(output) => {
                if !output.success() {
                    debug!("pkill -9 {} exited with {:?}", editor, output.exit_code);
                }
                outputs.push(output);
            }
            Err(e) => warn!("Unable to signal {} processes: {}", editor, e),
        }
    }
    if !outputs.is_empty() {
        // Give the editors a moment to exit and release their swap files.
        sleep(Duration::from_secs(1)).await;
    }
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_code_and_both_streams() {
        let out = run_command("sh", &["-c", "echo out; echo err >&2; exit 3"], ".", None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.timed_out);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let out = run_command("true", &[], ".", None).await.unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert!(out.success());
    }

    #[tokio::test]
    async fn kills_child_on_timeout() {
        let out = run_command("sleep", &["5"], ".", Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert_eq!(out.exit_code, None);
        assert!(
            out.elapsed < Duration::from_secs(2),
            "timed-out child took {:?} to come back",
            out.elapsed
        );
    }

    #[tokio::test]
    async fn missing_binary_surfaces_an_error() {
        let result = run_command("definitely-not-a-real-binary", &[], ".", None).await;
        assert!(result.is_err());
    }
}
