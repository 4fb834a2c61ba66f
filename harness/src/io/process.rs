//! Child process helpers: bounded synchronous runs and detached background
//! processes.
//!
//! On unix every child leads its own process group. Timeouts and teardown
//! signal the whole group, so helpers spawned by `func` (the function server,
//! pack builders) never outlive the step that started them.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{Signal, killpg},
    unistd::Pid,
};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long a background process gets between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            // Descendants hold the output pipes open; the readers only finish
            // once the whole group is gone.
            stop_tree(&mut child, Stop::Forced).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

/// Opaque handle to a process running in the background.
pub trait ProcessHandle {
    /// OS process id, if the backend has one.
    fn id(&self) -> Option<u32>;
    /// True while the process has not exited.
    fn is_alive(&mut self) -> bool;
    /// Stop the process and everything it started. Errors when the process
    /// had already exited.
    fn terminate(&mut self) -> Result<()>;
}

/// [`ProcessHandle`] over a `std::process::Child`.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
    grace: Duration,
}

impl ChildHandle {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            grace: TERMINATE_GRACE,
        }
    }

    /// Override the SIGTERM to SIGKILL grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(pid = self.child.id(), exit_code = ?status.code(), "background process exited");
                false
            }
            Err(err) => {
                warn!(pid = self.child.id(), err = %err, "liveness probe failed");
                false
            }
        }
    }

    fn terminate(&mut self) -> Result<()> {
        let pid = self.child.id();
        if let Some(status) = self.child.try_wait().context("probe before terminate")? {
            // The leader is gone but whatever it started may not be.
            sweep_group(pid);
            return Err(anyhow!(
                "process {pid} already exited with {:?}",
                status.code()
            ));
        }

        stop_tree(&mut self.child, Stop::Graceful).context("signal background process")?;
        match self
            .child
            .wait_timeout(self.grace)
            .context("wait for background process")?
        {
            Some(status) => debug!(pid, exit_code = ?status.code(), "background process stopped"),
            None => {
                warn!(
                    pid,
                    grace_ms = self.grace.as_millis() as u64,
                    "background process ignored SIGTERM, killing"
                );
                stop_tree(&mut self.child, Stop::Forced).context("kill background process")?;
                self.child.wait().context("reap background process")?;
            }
        }
        sweep_group(pid);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Graceful,
    Forced,
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Signal every member of the group led by `leader`. `Ok(false)` means the
/// group is already empty.
#[cfg(unix)]
fn signal_group(leader: u32, signal: Signal) -> Result<bool> {
    let pgid = i32::try_from(leader).context("process id out of range")?;
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(err) => Err(err).with_context(|| format!("signal process group {leader}")),
    }
}

#[cfg(unix)]
fn stop_tree(child: &mut Child, stop: Stop) -> Result<()> {
    let signal = match stop {
        Stop::Graceful => Signal::SIGTERM,
        Stop::Forced => Signal::SIGKILL,
    };
    signal_group(child.id(), signal).map(|_| ())
}

#[cfg(not(unix))]
fn stop_tree(child: &mut Child, _stop: Stop) -> Result<()> {
    child.kill().context("kill process")
}

/// SIGKILL whatever is left in the group of an exited leader.
#[cfg(unix)]
fn sweep_group(leader: u32) {
    match signal_group(leader, Signal::SIGKILL) {
        Ok(true) => debug!(pgid = leader, "killed leftover process group members"),
        Ok(false) => {}
        Err(err) => debug!(pgid = leader, err = %format!("{err:#}"), "could not sweep process group"),
    }
}

#[cfg(not(unix))]
fn sweep_group(_leader: u32) {}

/// Spawn `cmd` detached from the harness' stdio, appending its stdout and
/// stderr to `log_path`.
pub fn spawn_logged(mut cmd: Command, log_path: &Path) -> Result<ChildHandle> {
    let stdout = open_append(log_path)?;
    let stderr = stdout
        .try_clone()
        .with_context(|| format!("clone log handle {}", log_path.display()))?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    own_process_group(&mut cmd);

    let child = cmd.spawn().context("spawn background command")?;
    debug!(pid = child.id(), "background process spawned");
    Ok(ChildHandle::new(child))
}

/// Open `path` for appending, creating parent directories as needed.
pub fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::tempdir;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_exit_status_and_output() {
        let output = run_command_with_timeout(
            sh("printf out; printf err >&2; exit 3"),
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, b"out");
        assert_eq!(output.stderr, b"err");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let output =
            run_command_with_timeout(sh("printf abcdef"), Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 2);
    }

    #[test]
    fn kills_command_on_timeout() {
        let output =
            run_command_with_timeout(sh("sleep 5"), Duration::from_millis(200), 1024).expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let cmd = Command::new("definitely-not-a-real-binary-for-harness");
        assert!(run_command_with_timeout(cmd, Duration::from_secs(1), 1024).is_err());
    }

    #[test]
    fn background_process_is_alive_until_terminated() {
        let temp = tempdir().expect("tempdir");
        let mut handle = spawn_logged(sh("sleep 30"), &temp.path().join("run.log")).expect("spawn");
        assert!(handle.is_alive());
        handle.terminate().expect("terminate");
        assert!(!handle.is_alive());
    }

    #[test]
    fn exited_process_is_not_alive_and_terminate_errors() {
        let temp = tempdir().expect("tempdir");
        let log = temp.path().join("run.log");
        let mut handle = spawn_logged(sh("echo bye; exit 1"), &log).expect("spawn");
        thread::sleep(Duration::from_millis(300));
        assert!(!handle.is_alive());
        assert!(handle.terminate().is_err());
        let contents = std::fs::read_to_string(&log).expect("log");
        assert!(contents.contains("bye"));
    }

    #[test]
    fn timeout_does_not_wait_for_background_children() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 4 & sleep 4"),
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    fn spawn_in(dir: &Path, script: &str) -> ChildHandle {
        let mut cmd = sh(script);
        cmd.current_dir(dir);
        spawn_logged(cmd, &dir.join("run.log")).expect("spawn")
    }

    /// Wait for the script to publish its background child's pid.
    #[cfg(unix)]
    fn read_pid(path: &Path) -> i32 {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(text) = std::fs::read_to_string(path)
                && let Ok(pid) = text.trim().parse()
            {
                return pid;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("no pid written to {}", path.display());
    }

    #[cfg(unix)]
    fn is_running(pid: i32) -> bool {
        // Zombies still accept signal 0 but are already dead.
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            && stat.contains(") Z ")
        {
            return false;
        }
        nix::sys::signal::kill(Pid::from_raw(pid), None::<Signal>).is_ok()
    }

    #[cfg(unix)]
    fn gone_within(pid: i32, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if !is_running(pid) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    const PUBLISH_PID: &str = "echo $! > child.pid.tmp; mv child.pid.tmp child.pid";

    #[cfg(unix)]
    #[test]
    fn terminate_sends_sigterm_and_stops_grandchildren() {
        let temp = tempdir().expect("tempdir");
        let script = format!(
            "trap 'touch got_term; kill $! 2>/dev/null; exit 0' TERM; sleep 300 & {PUBLISH_PID}; wait"
        );
        let mut handle = spawn_in(temp.path(), &script);
        let grandchild = read_pid(&temp.path().join("child.pid"));
        assert!(is_running(grandchild));

        handle.terminate().expect("terminate");

        assert!(temp.path().join("got_term").exists());
        assert!(gone_within(grandchild, Duration::from_secs(3)));
    }

    #[cfg(unix)]
    #[test]
    fn terminate_escalates_to_sigkill_when_sigterm_is_ignored() {
        let temp = tempdir().expect("tempdir");
        let script = format!("trap '' TERM; sleep 300 & {PUBLISH_PID}; wait");
        let mut handle =
            spawn_in(temp.path(), &script).with_grace(Duration::from_millis(200));
        let grandchild = read_pid(&temp.path().join("child.pid"));

        let started = Instant::now();
        handle.terminate().expect("terminate");

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!handle.is_alive());
        assert!(gone_within(grandchild, Duration::from_secs(3)));
    }

    #[cfg(unix)]
    #[test]
    fn terminate_after_leader_exit_still_clears_its_group() {
        let temp = tempdir().expect("tempdir");
        let script = format!("sleep 300 & {PUBLISH_PID}; exit 0");
        let mut handle = spawn_in(temp.path(), &script);
        let grandchild = read_pid(&temp.path().join("child.pid"));
        thread::sleep(Duration::from_millis(200));
        assert!(!handle.is_alive());

        assert!(handle.terminate().is_err());
        assert!(gone_within(grandchild, Duration::from_secs(3)));
    }
}
