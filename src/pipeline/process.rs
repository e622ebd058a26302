//! Converter process supervision.
//!
//! ## Ownership
//!
//! [`SpawnedJob::supervise`] owns the [`Child`] for its whole life. It is the
//! only code that waits on it and the only code that signals it; everyone
//! else (the registry's cancel path) sends requests through the job's
//! [`ProcessHandle`]. This makes three races harmless:
//!
//! * timeout-kill vs. cancel-terminate on the same child: the requests are
//!   serialised through one `select!` loop;
//! * a signal arriving after exit: `Child::id()` is `None` once reaped, and
//!   the request is acknowledged as a no-op;
//! * PID reuse: a PID is only signalled while its zombie is still unreaped.
//!
//! ## Why a process group?
//!
//! pandoc starts the LaTeX engine as a grandchild. Signalling only pandoc's
//! PID would leave xelatex running and holding the output pipes. The child
//! is spawned as leader of a fresh group and signals go to `-pgid`.
//!
//! Whatever is left of the group once the leader has been reaped is killed
//! before the output is drained. If the job is dropped before its child was
//! reaped (the `invoke` future was abandoned), `GroupGuard` kills the whole
//! group; `kill_on_drop` alone would only reach the leader.
//!
//! ## Output capture
//!
//! stdout/stderr are drained by spawned reader tasks (a full pipe would stall
//! the converter), capped at [`MAX_CAPTURE_BYTES`] each. After exit the
//! readers are awaited for at most [`READER_DRAIN_TIMEOUT`]: a descendant
//! that left the group (`setsid`) can keep the pipe open indefinitely.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::command::ConverterCommand;
use crate::registry::{JobKey, ProcessHandle, SignalKind, SupervisorLink};

/// Maximum stdout or stderr captured per stream (1 MiB).
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// How long to wait for the output readers once the child has exited.
pub const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A launched converter, not yet supervised.
pub struct SpawnedJob {
    child: Child,
    handle: Arc<ProcessHandle>,
    link: SupervisorLink,
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
    group: GroupGuard,
}

/// Kills the child's process group on drop unless disarmed.
///
/// Armed from spawn until the leader has been reaped.
struct GroupGuard {
    pid: Option<u32>,
    armed: bool,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(pid) = self.pid {
            debug!("Job dropped before exit; killing process group {}", pid);
            if let Err(e) = signal_group(pid, SignalKind::Kill) {
                warn!("Failed to kill process group {}: {}", pid, e);
            }
        }
    }
}

/// How the converter process ended.
#[derive(Debug)]
pub struct Finished {
    /// Exit status as reported by the OS.
    pub status: ExitStatus,
    /// True when the wall-clock limit fired and the process was killed.
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Launch `command` and create the job's cancellation handle.
///
/// Nothing is registered here; the caller registers [`SpawnedJob::handle`]
/// before calling [`SpawnedJob::supervise`].
pub fn spawn(command: &ConverterCommand, key: JobKey) -> io::Result<SpawnedJob> {
    let mut child = command.to_tokio().spawn()?;
    let pid = child.id();
    debug!("Spawned converter pid={:?} for {}", pid, key);

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout = tokio::spawn(read_capped(stdout));
    let stderr = tokio::spawn(read_capped(stderr));

    let (handle, link) = ProcessHandle::new(key, pid);
    Ok(SpawnedJob {
        child,
        handle,
        link,
        stdout,
        stderr,
        group: GroupGuard::new(pid),
    })
}

impl SpawnedJob {
    pub fn handle(&self) -> &Arc<ProcessHandle> {
        &self.handle
    }

    /// Drive the child to exit.
    ///
    /// Serves signal requests from the handle while waiting. When `timeout`
    /// elapses the process group is killed and the loop keeps waiting until
    /// the child is reaped, so a timed-out job never leaves a zombie.
    pub async fn supervise(self, timeout: Duration) -> io::Result<Finished> {
        let SpawnedJob {
            mut child,
            handle,
            link,
            stdout,
            stderr,
            mut group,
        } = self;
        let SupervisorLink {
            mut signals,
            exited,
        } = link;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;
        let mut signals_open = true;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                request = signals.recv(), if signals_open => match request {
                    Some(request) => {
                        debug!("Delivering {:?} to {}", request.kind, handle.key());
                        let result = deliver(&mut child, request.kind);
                        let _ = request.ack.send(result);
                    }
                    None => signals_open = false,
                },
                _ = &mut deadline, if !timed_out => {
                    timed_out = true;
                    warn!(
                        "Converter for {} exceeded {}s; killing process group",
                        handle.key(),
                        timeout.as_secs()
                    );
                    if let Err(e) = deliver(&mut child, SignalKind::Kill) {
                        warn!("Group kill failed for {}: {}; killing leader", handle.key(), e);
                        child.start_kill()?;
                    }
                }
            }
        };

        group.disarm();
        // Stragglers from the group would outlive the job and hold the pipes.
        if let Some(pid) = handle.pid() {
            if let Err(e) = signal_group(pid, SignalKind::Kill) {
                warn!("Failed to sweep process group of {}: {}", handle.key(), e);
            }
        }

        let _ = exited.send(true);
        // Requests still queued target a reaped child.
        signals.close();
        while let Ok(request) = signals.try_recv() {
            let _ = request.ack.send(Ok(()));
        }

        let stdout = drain(stdout, handle.key(), "stdout").await;
        let stderr = drain(stderr, handle.key(), "stderr").await;

        Ok(Finished {
            status,
            timed_out,
            stdout,
            stderr,
        })
    }
}

/// Send `kind` to the child's process group.
///
/// A child that has already been reaped, or a group that no longer exists,
/// counts as success.
fn deliver(child: &mut Child, kind: SignalKind) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    #[cfg(unix)]
    {
        signal_group(pid, kind)
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, kind);
        child.start_kill()
    }
}

/// Send `kind` to process group `pgid`. A group that no longer exists
/// counts as success.
#[cfg(unix)]
fn signal_group(pgid: u32, kind: SignalKind) -> io::Result<()> {
    let signal = match kind {
        SignalKind::Terminate => libc::SIGTERM,
        SignalKind::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) has no memory-safety preconditions. The group id is the
    // leader's pid, which is not recycled while the group has members.
    let rc = unsafe { libc::kill(-(pgid as libc::pid_t), signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

/// Without process groups only the leader is reachable, through `kill_on_drop`.
#[cfg(not(unix))]
fn signal_group(_pgid: u32, _kind: SignalKind) -> io::Result<()> {
    Ok(())
}

/// Read a stream to the end, keeping at most [`MAX_CAPTURE_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        let _ = (&mut stream)
            .take(MAX_CAPTURE_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        // Keep draining past the cap so the writer never blocks on a full pipe.
        let _ = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await;
    }
    buf
}

async fn drain(reader: JoinHandle<Vec<u8>>, key: &JobKey, stream: &str) -> String {
    let abort = reader.abort_handle();
    match tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!("{} reader for {} failed: {}", stream, key, e);
            String::new()
        }
        Err(_) => {
            warn!("{} of {} still open after exit; discarding", stream, key);
            abort.abort();
            String::new()
        }
    }
}
