//! In-flight job registry: job key → running converter process.
//!
//! ## Why a registry?
//!
//! A conversion runs for seconds to a minute inside one request handler,
//! while the cancel request that should stop it arrives on a *different*
//! request. The registry is the rendezvous point: the invoking side
//! registers a [`ProcessHandle`] right after spawning, and the cancelling
//! side looks it up by [`JobKey`].
//!
//! ## Locking discipline
//!
//! One `std::sync::Mutex` guards the map. It is held only for the map
//! operation itself and never across an `.await` or a cancellation's grace
//! period.
//!
//! ## Signal delivery
//!
//! A [`ProcessHandle`] does not own the child. The supervising loop in
//! [`crate::pipeline::process`] does, and the handle forwards terminate/kill
//! requests to it over a channel. Because only the owner signals and reaps,
//! a signal can never reach a recycled PID, and a terminate that races a
//! timeout-kill on an already-reaped child is acknowledged as a no-op.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_GRACE_PERIOD_SECS;

// ── JobKey ───────────────────────────────────────────────────────────────

/// Identifier of one in-flight conversion, used for cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a job: the caller's request id, or the output path when the
    /// caller supplied none (or only whitespace).
    pub fn for_job(request_id: Option<&str>, output_path: &Path) -> Self {
        match request_id.map(str::trim) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self(output_path.to_string_lossy().into_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── ProcessHandle ────────────────────────────────────────────────────────

/// Signal the supervising loop should deliver to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalKind {
    /// Graceful: SIGTERM to the process group on Unix.
    Terminate,
    /// Forceful: SIGKILL to the process group on Unix.
    Kill,
}

pub(crate) struct SignalRequest {
    pub(crate) kind: SignalKind,
    pub(crate) ack: oneshot::Sender<io::Result<()>>,
}

/// Supervisor-side ends of a [`ProcessHandle`]'s channels.
pub(crate) struct SupervisorLink {
    pub(crate) signals: mpsc::UnboundedReceiver<SignalRequest>,
    pub(crate) exited: watch::Sender<bool>,
}

/// Cancellation capability for one running converter process.
///
/// Cheap to share (`Arc`); all methods take `&self` and are idempotent.
pub struct ProcessHandle {
    key: JobKey,
    pid: Option<u32>,
    started: Instant,
    cancelled: AtomicBool,
    signals: mpsc::UnboundedSender<SignalRequest>,
    exited: watch::Receiver<bool>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("key", &self.key)
            .field("pid", &self.pid)
            .field("elapsed", &self.started.elapsed())
            .field("cancelled", &self.is_cancelled())
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl ProcessHandle {
    /// Create a handle plus the link its supervising loop listens on.
    pub(crate) fn new(key: JobKey, pid: Option<u32>) -> (Arc<Self>, SupervisorLink) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(false);
        let handle = Arc::new(Self {
            key,
            pid,
            started: Instant::now(),
            cancelled: AtomicBool::new(false),
            signals: signal_tx,
            exited: exit_rx,
        });
        let link = SupervisorLink {
            signals: signal_rx,
            exited: exit_tx,
        };
        (handle, link)
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// OS process id at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record that termination was requested by a caller, so the invoking
    /// side reports the job as cancelled rather than failed.
    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the child has been reaped (or its supervisor is gone).
    pub fn has_exited(&self) -> bool {
        *self.exited.borrow() || self.signals.is_closed()
    }

    /// Ask the child to exit.
    pub async fn terminate(&self) -> io::Result<()> {
        self.signal(SignalKind::Terminate).await
    }

    /// Force the child to exit.
    pub async fn kill(&self) -> io::Result<()> {
        self.signal(SignalKind::Kill).await
    }

    async fn signal(&self, kind: SignalKind) -> io::Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .signals
            .send(SignalRequest { kind, ack: ack_tx })
            .is_err()
        {
            // Supervisor already finished: the child is reaped.
            return Ok(());
        }
        ack_rx.await.unwrap_or(Ok(()))
    }

    /// Wait until the child has exited, up to `limit` when given.
    ///
    /// Returns whether exit was observed.
    pub async fn wait_for_exit(&self, limit: Option<Duration>) -> bool {
        let mut exited = self.exited.clone();
        let wait = async move {
            // Err means the supervisor dropped its sender, i.e. it is done.
            let _ = exited.wait_for(|done| *done).await.map(|_| ());
        };
        match limit {
            Some(limit) => tokio::time::timeout(limit, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }
}

// ── ProcessRegistry ──────────────────────────────────────────────────────

/// Thread-safe map of in-flight jobs.
///
/// Construct once at start-up and share by `Arc`.
#[derive(Debug)]
pub struct ProcessRegistry {
    jobs: Mutex<HashMap<JobKey, Arc<ProcessHandle>>>,
    grace_period: Duration,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS))
    }
}

impl ProcessRegistry {
    /// Create an empty registry whose cancellations wait `grace_period`
    /// between terminate and kill.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            grace_period,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobKey, Arc<ProcessHandle>>> {
        // The map holds no invariant a panicking holder could break halfway.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the handle for `key`; returns the displaced one.
    pub fn register(&self, key: JobKey, handle: Arc<ProcessHandle>) -> Option<Arc<ProcessHandle>> {
        debug!("Registering conversion {}", key);
        let previous = self.lock().insert(key.clone(), handle);
        if previous.is_some() {
            warn!("Job key {} was still registered; previous entry overwritten", key);
        }
        previous
    }

    /// Remove the entry for `key`. Absent keys are not an error.
    pub fn unregister(&self, key: &JobKey) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            debug!("Unregistered conversion {}", key);
        }
        removed
    }

    /// Remove the entry for `key` only if it still holds `handle`.
    ///
    /// A finished job calls this instead of [`Self::unregister`] so it can
    /// never evict a newer job that reused its key.
    pub fn release(&self, key: &JobKey, handle: &Arc<ProcessHandle>) -> bool {
        let mut jobs = self.lock();
        match jobs.get(key) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                jobs.remove(key);
                debug!("Released conversion {}", key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &JobKey) -> Option<Arc<ProcessHandle>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the registered keys, sorted.
    pub fn keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Terminate the job registered under `key`.
    ///
    /// The entry is taken out of the map first, so the registry never keeps
    /// a dead entry whatever happens next. Then, outside the lock: graceful
    /// terminate, up to `grace_period` for the child to exit, forced kill if
    /// it did not.
    ///
    /// Returns `false` when no live job is registered under `key` (including
    /// one whose process already exited) or when signalling failed; `true`
    /// once the termination sequence completed.
    pub async fn cancel(&self, key: &JobKey) -> bool {
        let Some(handle) = self.lock().remove(key) else {
            debug!("Cancel requested for unknown job {}", key);
            return false;
        };
        // Reaped but not yet released: the job finished on its own.
        if handle.has_exited() {
            debug!("Cancel requested for {} after it exited", key);
            return false;
        }

        handle.mark_cancelled();
        match self.terminate(&handle).await {
            Ok(()) => {
                info!("Cancelled conversion for {}", key);
                true
            }
            Err(e) => {
                error!("Error cancelling process {}: {}", key, e);
                false
            }
        }
    }

    /// Cancel every registered job; returns how many were terminated.
    pub async fn cancel_all(&self) -> usize {
        let keys = self.keys();
        if keys.is_empty() {
            return 0;
        }
        info!("Cancelling {} in-flight conversion(s)", keys.len());
        join_all(keys.iter().map(|key| self.cancel(key)))
            .await
            .into_iter()
            .filter(|cancelled| *cancelled)
            .count()
    }

    async fn terminate(&self, handle: &ProcessHandle) -> io::Result<()> {
        handle.terminate().await?;
        if handle.wait_for_exit(Some(self.grace_period)).await {
            return Ok(());
        }
        warn!(
            "Conversion {} ignored terminate for {:?}; killing",
            handle.key(),
            self.grace_period
        );
        handle.kill().await?;
        handle.wait_for_exit(None).await;
        Ok(())
    }
}
