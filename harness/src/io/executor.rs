//! Command-execution capabilities.
//!
//! The lifecycle only talks to [`CommandExecutor`] (synchronous commands) and
//! [`ProcessLauncher`] (background processes). [`SystemExecutor`] implements
//! both with real child processes; tests use scripted implementations that
//! never spawn anything.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument, warn};

use crate::io::process::{
    CommandOutput, ProcessHandle, open_append, run_command_with_timeout, spawn_logged,
};

/// A synchronous command to run to completion.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory for the child.
    pub workdir: PathBuf,
    /// Kill the child and report a timeout after this long.
    pub timeout: Duration,
    /// Step log the captured output is appended to.
    pub log_path: PathBuf,
}

/// A long-lived command to start in the background.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// The process' stdout/stderr are appended here.
    pub log_path: PathBuf,
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandReport {
    pub fn ok() -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            success: false,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Turn an unsuccessful report into an error naming `label`.
    pub fn ensure_success(&self, label: &str) -> Result<()> {
        if self.timed_out {
            bail!("{label} timed out");
        }
        if !self.success {
            let detail = last_line(&self.stderr).or_else(|| last_line(&self.stdout));
            match detail {
                Some(line) => bail!("{label} exited with {:?}: {line}", self.exit_code),
                None => bail!("{label} exited with {:?}", self.exit_code),
            }
        }
        Ok(())
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

/// Runs a command to completion and reports its exit status and output.
pub trait CommandExecutor {
    fn execute(&self, request: &CommandRequest) -> Result<CommandReport>;
}

/// Starts a command in the background and hands back a handle to it.
pub trait ProcessLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn ProcessHandle>>;
}

/// Executor backed by real child processes.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    output_limit_bytes: usize,
}

impl SystemExecutor {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl CommandExecutor for SystemExecutor {
    #[instrument(skip_all, fields(program = %request.program.display(), args = ?request.args))]
    fn execute(&self, request: &CommandRequest) -> Result<CommandReport> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.workdir);

        let output = run_command_with_timeout(cmd, request.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {}", render_command(&request.program, &request.args)))?;
        append_step_log(&request.log_path, &request.program, &request.args, &output)?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "command timed out");
        }
        Ok(CommandReport {
            exit_code: output.status.code(),
            success: !output.timed_out && output.status.success(),
            timed_out: output.timed_out,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

impl ProcessLauncher for SystemExecutor {
    #[instrument(skip_all, fields(program = %request.program.display(), args = ?request.args))]
    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn ProcessHandle>> {
        let mut header = open_append(&request.log_path)?;
        writeln!(
            header,
            "=== {} (background) ===",
            render_command(&request.program, &request.args)
        )
        .with_context(|| format!("write log {}", request.log_path.display()))?;
        drop(header);

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.workdir);
        let handle = spawn_logged(cmd, &request.log_path)?;
        debug!(pid = ?handle.id(), "launched");
        Ok(Box::new(handle))
    }
}

/// Render `program args...` for logs and error messages.
pub fn render_command(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

fn append_step_log(
    path: &Path,
    program: &Path,
    args: &[String],
    output: &CommandOutput,
) -> Result<()> {
    let mut buf = String::new();
    buf.push_str(&format!("=== {} ===\n", render_command(program, args)));
    buf.push_str(&format!(
        "exit: {:?} timed_out: {}\n",
        output.status.code(),
        output.timed_out
    ));
    buf.push_str("--- stdout ---\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    if output.stdout_truncated > 0 {
        buf.push_str(&format!("\n[stdout truncated {} bytes]", output.stdout_truncated));
    }
    buf.push_str("\n--- stderr ---\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.stderr_truncated > 0 {
        buf.push_str(&format!("\n[stderr truncated {} bytes]", output.stderr_truncated));
    }
    buf.push('\n');

    let mut file = open_append(path)?;
    file.write_all(buf.as_bytes())
        .with_context(|| format!("write log {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    fn sh_request(root: &Path, script: &str) -> CommandRequest {
        CommandRequest {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            workdir: root.to_path_buf(),
            timeout: Duration::from_secs(5),
            log_path: root.join("logs").join("target.log"),
        }
    }

    #[test]
    fn execute_reports_status_and_appends_log() {
        let temp = tempdir().expect("tempdir");
        let executor = SystemExecutor::new(1024);

        let ok = executor
            .execute(&sh_request(temp.path(), "echo built"))
            .expect("execute");
        assert!(ok.success);
        assert_eq!(ok.stdout.trim(), "built");

        let failed = executor
            .execute(&sh_request(temp.path(), "echo broken >&2; exit 4"))
            .expect("execute");
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(4));

        let log = std::fs::read_to_string(temp.path().join("logs/target.log")).expect("log");
        assert!(log.contains("built"));
        assert!(log.contains("broken"));
        assert_eq!(log.matches("=== sh -c").count(), 2);
    }

    #[test]
    fn execute_runs_in_workdir() {
        let temp = tempdir().expect("tempdir");
        let executor = SystemExecutor::new(1024);
        executor
            .execute(&sh_request(temp.path(), "touch marker"))
            .expect("execute");
        assert!(temp.path().join("marker").exists());
    }

    #[test]
    fn launch_returns_live_handle() {
        let temp = tempdir().expect("tempdir");
        let executor = SystemExecutor::new(1024);
        let request = LaunchRequest {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "echo serving; sleep 30".to_string()],
            workdir: temp.path().to_path_buf(),
            log_path: temp.path().join("run.log"),
        };
        let mut handle = executor.launch(&request).expect("launch");
        thread::sleep(Duration::from_millis(100));
        assert!(handle.is_alive());
        handle.terminate().expect("terminate");

        let log = std::fs::read_to_string(temp.path().join("run.log")).expect("log");
        assert!(log.contains("(background)"));
    }

    #[test]
    fn ensure_success_names_the_step() {
        let report = CommandReport::failed(1, "error: no such template\n");
        let err = report.ensure_success("func create").expect_err("failed");
        let message = err.to_string();
        assert!(message.contains("func create"));
        assert!(message.contains("no such template"));

        let timed_out = CommandReport {
            timed_out: true,
            ..CommandReport::default()
        };
        assert!(
            timed_out
                .ensure_success("func build")
                .expect_err("timeout")
                .to_string()
                .contains("timed out")
        );
        assert!(CommandReport::ok().ensure_success("func invoke").is_ok());
    }
}
