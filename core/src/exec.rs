//! Shell execution with bounded output and cancellation: the "shell" tool's
//! 10 MiB per-stream buffer and exit-130-on-kill rule.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Notify;

use crate::error::CoworkErr;
use crate::error::Result;

const MAX_STREAM_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const CANCELLED_EXIT_CODE: i32 = 130;
const GRACE_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ExecParams {
    pub command: Vec<String>,
    pub cwd: PathBuf,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Picks the platform shell: `bash` with `sh` fallback on POSIX,
/// `powershell`/`pwsh` fallback on Windows.
fn shell_invocation(command: &[String]) -> (String, Vec<String>) {
    let joined = shlex::try_join(command.iter().map(String::as_str))
        .unwrap_or_else(|_| command.join(" "));
    #[cfg(windows)]
    {
        let shell = if which::which("pwsh").is_ok() {
            "pwsh"
        } else {
            "powershell"
        };
        (shell.to_string(), vec!["-Command".to_string(), joined])
    }
    #[cfg(not(windows))]
    {
        let shell = if which_has("bash") { "bash" } else { "sh" };
        (shell.to_string(), vec!["-lc".to_string(), joined])
    }
}

#[cfg(not(windows))]
fn which_has(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
        })
        .unwrap_or(false)
}

/// Runs `params.command` under the platform shell, observing `abort` for
/// cancellation. Aborts with exit code 130 when the handle fires.
pub async fn run_shell(params: ExecParams, abort: Arc<Notify>) -> Result<ExecOutput> {
    let start = Instant::now();
    let (shell, args) = shell_invocation(&params.command);

    let mut cmd = Command::new(shell);
    cmd.args(args);
    cmd.current_dir(&params.cwd);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn()?;
    let timeout = Duration::from_millis(params.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| CoworkErr::Io(io::Error::other("stdout pipe not captured")))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| CoworkErr::Io(io::Error::other("stderr pipe not captured")))?;

    let stdout_handle = tokio::spawn(read_capped(BufReader::new(stdout_pipe), MAX_STREAM_BYTES));
    let stderr_handle = tokio::spawn(read_capped(BufReader::new(stderr_pipe), MAX_STREAM_BYTES));

    let cancelled = abort.notified();
    let exit_code = tokio::select! {
        result = tokio::time::timeout(timeout, child.wait()) => {
            match result {
                Ok(Ok(status)) => status.code().unwrap_or(-1),
                Ok(Err(e)) => return Err(CoworkErr::Io(e)),
                Err(_) => {
                    terminate_with_grace(&mut child, GRACE_WINDOW).await?;
                    return Err(CoworkErr::Timeout);
                }
            }
        }
        _ = cancelled => {
            terminate_with_grace(&mut child, GRACE_WINDOW).await?;
            CANCELLED_EXIT_CODE
        }
    };

    let stdout = stdout_handle.await??;
    let stderr = stderr_handle.await??;

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        duration: start.elapsed(),
    })
}

/// Asks the child to exit (`SIGTERM` on unix; no graceful signal exists on
/// Windows, so this is a hard kill there), then waits up to `grace` before
/// escalating to a hard kill if it's still running.
async fn terminate_with_grace(child: &mut Child, grace: Duration) -> Result<()> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: `pid` was just obtained from this live `Child` handle.
            unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        }
    }
    #[cfg(not(unix))]
    {
        child.start_kill()?;
    }

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        child.start_kill()?;
        let _ = child.wait().await;
    }
    Ok(())
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if buf.len() < cap {
            let take = (cap - buf.len()).min(n);
            buf.extend_from_slice(&chunk[..take]);
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let params = ExecParams {
            command: vec!["echo".to_string(), "hi".to_string()],
            cwd: std::env::temp_dir(),
            timeout_ms: None,
        };
        let out = run_shell(params, Arc::new(Notify::new())).await.expect("exec");
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn cancellation_yields_exit_130() {
        let abort = Arc::new(Notify::new());
        let params = ExecParams {
            command: vec!["sleep".to_string(), "5".to_string()],
            cwd: std::env::temp_dir(),
            timeout_ms: Some(10_000),
        };
        let abort2 = abort.clone();
        let handle = tokio::spawn(run_shell(params, abort2));
        tokio::time::sleep(Duration::from_millis(50)).await;
        abort.notify_one();
        let out = handle.await.expect("join").expect("exec");
        assert_eq!(out.exit_code, CANCELLED_EXIT_CODE);
    }

    #[tokio::test]
    async fn timeout_returns_err() {
        let params = ExecParams {
            command: vec!["sleep".to_string(), "5".to_string()],
            cwd: std::env::temp_dir(),
            timeout_ms: Some(50),
        };
        let err = run_shell(params, Arc::new(Notify::new())).await.unwrap_err();
        assert!(matches!(err, CoworkErr::Timeout));
    }
}
