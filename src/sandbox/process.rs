use std::future::Future;
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use super::Invocation;

/// Upper bound on captured bytes per stream
pub const OUTPUT_LIMIT: u64 = 16 * 1024 * 1024;

/// How a process came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    /// Killed by the runner after the deadline passed
    TimedOut,
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::Exited(code),
            None => Self::Signaled(status.signal().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(0)
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }
}

/// Spawns exactly one external process per call
///
/// Every compiler and every program run goes through this trait. Calls are
/// independent of each other and may run concurrently.
pub trait ProcessRunner: Send + Sync {
    /// Runs `invocation`, feeds it `stdin` and waits until it terminates
    ///
    /// Resolves once the process exits, is killed by a signal, or overruns
    /// `deadline`, in which case its whole process group is killed.
    fn run(
        &self,
        invocation: &Invocation,
        stdin: Option<&str>,
        deadline: Duration,
    ) -> impl Future<Output = Result<ProcessOutput>> + Send;
}

/// Runs processes directly on the host with piped stdio
///
/// Provides a wall clock limit and nothing else: no memory, file system or
/// permission controls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRunner;

impl ProcessRunner for LocalRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        stdin: Option<&str>,
        deadline: Duration,
    ) -> Result<ProcessOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            // own process group, so a timeout can take down everything it forked
            .process_group(0);

        let start_time = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn `{}`", invocation.program))?;
        let pid = child.id();

        let mut stdin_pipe = child.stdin.take();
        let mut stdout_pipe = child.stdout.take().context("stdout was not captured")?;
        let mut stderr_pipe = child.stderr.take().context("stderr was not captured")?;
        let payload = stdin.unwrap_or_default().as_bytes();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let exchange = async {
            let feed = async {
                if let Some(mut pipe) = stdin_pipe.take() {
                    match pipe.write_all(payload).await {
                        Ok(()) => {}
                        // the program is free to exit without reading its input
                        Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                        Err(e) => return Err(e),
                    }
                    // dropping the pipe closes the program's stdin
                }
                Ok(())
            };
            let (fed, out, err) = tokio::join!(
                feed,
                drain(&mut stdout_pipe, &mut stdout),
                drain(&mut stderr_pipe, &mut stderr),
            );
            fed?;
            if out? {
                log::warn!(
                    "`{}` wrote more than {OUTPUT_LIMIT} bytes to stdout",
                    invocation.program
                );
            }
            if err? {
                log::warn!(
                    "`{}` wrote more than {OUTPUT_LIMIT} bytes to stderr",
                    invocation.program
                );
            }
            child.wait().await
        };
        let outcome = timeout(deadline, exchange).await;

        let termination = match outcome {
            Ok(status) => {
                let status = status
                    .with_context(|| format!("Failed to wait for `{}`", invocation.program))?;
                Termination::from(status)
            }
            Err(_) => {
                log::warn!(
                    "`{}` exceeded its {}ms deadline, killing it",
                    invocation.program,
                    deadline.as_millis()
                );
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    log::debug!("Reaping `{}` after timeout: {e}", invocation.program);
                }
                Termination::TimedOut
            }
        };

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            termination,
            elapsed: start_time.elapsed(),
        })
    }
}

/// Reads `pipe` to its end, keeping the first `OUTPUT_LIMIT` bytes in `buf`
///
/// Anything past the limit is read and thrown away so the writer never blocks
/// on a full pipe. Returns whether output was cut off.
async fn drain<R>(pipe: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut kept = (&mut *pipe).take(OUTPUT_LIMIT);
    kept.read_to_end(buf).await?;
    let discarded = tokio::io::copy(pipe, &mut tokio::io::sink()).await?;
    Ok(discarded > 0)
}

fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: plain syscall; the group was created by us for this child
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        log::debug!(
            "Failed to kill process group {pid}: {}",
            std::io::Error::last_os_error()
        );
    }
}
