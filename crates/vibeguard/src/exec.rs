// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
//! Shell command execution with output capture, timeout, and cancellation.
//!
//! Each check command runs as a shell string (`sh -c` on POSIX, `cmd /C` on
//! Windows) inheriting the parent's environment and working directory.
//! Stdout and stderr are captured separately plus concatenated in arrival
//! order as `combined`. Two signals can abort the subprocess and are
//! reported distinctly:
//!
//! - the per-check deadline fired: `timed_out = true`, exit code set to the
//!   timeout sentinel;
//! - the shared cancellation token fired first (fail-fast or Ctrl-C):
//!   `cancelled = true`, exit code −1.
//!
//! On Unix the child gets its own process group so that termination reaches
//! the whole pipeline the shell may have spawned: SIGTERM first, SIGKILL
//! after a short grace period.

use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sentinel exit code reported for timed-out commands. Matches the process
/// exit code the run itself uses when a timeout is the dominant outcome.
pub const TIMEOUT_EXIT_CODE: i32 = 4;

/// Exit code reported for commands aborted by the shared cancel signal.
pub const CANCELLED_EXIT_CODE: i32 = -1;

/// Conventional exit code recorded when the command could not be spawned.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

const EXIT_CODE_SIGNAL_BASE: i32 = 128;
const READ_CHUNK_SIZE: usize = 8192;
const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Captured output and outcome of one command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// OS exit status, or a sentinel for timeout/cancellation.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Stdout and stderr interleaved in the order chunks arrived.
    pub combined: String,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
    /// The per-check deadline fired.
    pub timed_out: bool,
    /// The shared cancellation signal fired before the deadline.
    pub cancelled: bool,
}

impl CommandOutput {
    /// True when the process exited on its own with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.cancelled
    }
}

/// Run `command` through the system shell with the given deadline and
/// cancellation signal. Spawn failures (command interpreter missing, fork
/// limits) surface as the unchanged OS error; everything after a successful
/// spawn is captured on the returned [`CommandOutput`].
pub async fn run_shell(
    command: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> io::Result<CommandOutput> {
    let start = Instant::now();

    let mut cmd = shell_command(command);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    set_process_group(&mut cmd);

    let mut child = cmd.spawn()?;

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout pipe not available"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr pipe not available"))?;

    let (agg_tx, mut agg_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let stdout_task = tokio::spawn(read_stream(stdout_pipe, agg_tx.clone()));
    let stderr_task = tokio::spawn(read_stream(stderr_pipe, agg_tx));

    let (exit_code, timed_out, cancelled) = tokio::select! {
        status = child.wait() => (exit_status_code(status?), false, false),
        () = cancel.cancelled() => {
            terminate(&mut child).await;
            (CANCELLED_EXIT_CODE, false, true)
        }
        () = tokio::time::sleep(timeout) => {
            tracing::debug!(command, timeout_ms = timeout.as_millis() as u64, "command deadline fired");
            terminate(&mut child).await;
            (TIMEOUT_EXIT_CODE, true, false)
        }
    };

    let stdout = drain(stdout_task).await;
    let stderr = drain(stderr_task).await;

    let mut combined = Vec::with_capacity(stdout.len() + stderr.len());
    while let Some(chunk) = agg_rx.recv().await {
        combined.extend_from_slice(&chunk);
    }

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        combined: String::from_utf8_lossy(&combined).into_owned(),
        duration: start.elapsed(),
        timed_out,
        cancelled,
    })
}

/// The command is a shell string, not an argv vector; this is part of the
/// configuration contract.
fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn set_process_group(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn set_process_group(_cmd: &mut Command) {}

/// Terminate the child and its process group: SIGTERM, then SIGKILL after a
/// short grace if the child is still alive.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        signal_group(child, libc::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        signal_group(child, libc::SIGKILL);
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_group(child: &Child, signal: i32) {
    if let Some(pid) = child.id() {
        let pid = pid as libc::pid_t;
        let pgid = unsafe { libc::getpgid(pid) };
        if pgid != -1 {
            unsafe { libc::killpg(pgid, signal) };
        }
    }
}

fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_CODE_SIGNAL_BASE + signal;
        }
    }
    -1
}

/// Read a pipe to EOF, forwarding each chunk to the combined-output channel.
async fn read_stream<R: AsyncRead + Unpin + Send>(
    mut reader: R,
    agg_tx: mpsc::UnboundedSender<Vec<u8>>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = tmp[..n].to_vec();
                let _ = agg_tx.send(chunk.clone());
                buf.extend_from_slice(&chunk);
            }
        }
    }
    buf
}

/// Await a reader task, giving it a bounded window to drain after the child
/// terminated. A pipe held open by an orphaned grandchild must not hang the
/// worker.
async fn drain(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    let mut handle = handle;
    match tokio::time::timeout(IO_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}
