//! Primary-thread hand-off
//!
//! A [`PrimaryQueue`] is bound to the thread that created it (the UI thread).
//! Any thread may [`dispatch`](PrimaryQueue::dispatch) a job; jobs run in
//! arrival order when the owner thread calls [`drain`](PrimaryQueue::drain),
//! typically once per event-loop turn.
//!
//! ```ignore
//! let queue = PrimaryQueue::new();
//! queue.set_wake_callback(move || proxy.wake());
//!
//! // In the event loop
//! queue.drain()?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::config::BindingConfig;
use crate::error::{BindingError, Result};
use crate::lock;

/// A unit of work handed to the primary thread
pub type Job = Box<dyn FnOnce() + Send>;

/// Called when a job is enqueued from a non-owner thread
///
/// Use this to wake an event loop (e.g., via `EventLoopProxy`).
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

static GLOBAL_QUEUE: OnceLock<PrimaryQueue> = OnceLock::new();

struct QueueInner {
    owner: ThreadId,
    sender: UnboundedSender<Job>,
    receiver: Mutex<UnboundedReceiver<Job>>,
    pending: AtomicUsize,
    draining: AtomicBool,
    wake: Mutex<Option<WakeCallback>>,
    inline_on_primary: bool,
}

/// Clears the draining flag when a drain ends, including by panic
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Ordered job queue targeting one owner thread
#[derive(Clone)]
pub struct PrimaryQueue {
    inner: Arc<QueueInner>,
}

impl PrimaryQueue {
    /// Create a queue owned by the calling thread
    pub fn new() -> Self {
        Self::with_options(BindingConfig::current().delivery.inline_on_primary)
    }

    /// Create a queue owned by the calling thread
    ///
    /// With `inline_on_primary`, jobs dispatched on the owner thread while
    /// nothing is queued or running run immediately instead of waiting for a
    /// drain.
    pub fn with_options(inline_on_primary: bool) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                owner: thread::current().id(),
                sender,
                receiver: Mutex::new(receiver),
                pending: AtomicUsize::new(0),
                draining: AtomicBool::new(false),
                wake: Mutex::new(None),
                inline_on_primary,
            }),
        }
    }

    /// Designate `queue` as the process-wide primary queue
    pub fn install_global(queue: PrimaryQueue) -> Result<()> {
        let owner = queue.owner();
        GLOBAL_QUEUE
            .set(queue)
            .map_err(|_| BindingError::PrimaryQueueInstalled)?;
        tracing::debug!(?owner, "PrimaryQueue: installed global queue");
        Ok(())
    }

    /// The process-wide primary queue
    ///
    /// Call [`install_global`](Self::install_global) from the UI thread at
    /// startup. If none was installed, the first caller's thread becomes the
    /// owner, which is wrong whenever that caller is a worker.
    pub fn global() -> &'static PrimaryQueue {
        GLOBAL_QUEUE.get_or_init(|| {
            let thread = thread::current();
            tracing::warn!(
                thread = ?thread.id(),
                name = thread.name().unwrap_or("<unnamed>"),
                "PrimaryQueue: no global queue installed, binding to current thread"
            );
            PrimaryQueue::new()
        })
    }

    /// The global queue, if one was installed or initialized
    pub fn try_global() -> Option<&'static PrimaryQueue> {
        GLOBAL_QUEUE.get()
    }

    pub fn owner(&self) -> ThreadId {
        self.inner.owner
    }

    pub fn is_primary_thread(&self) -> bool {
        thread::current().id() == self.inner.owner
    }

    pub fn set_wake_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.inner.wake) = Some(Arc::new(callback));
    }

    /// Number of jobs waiting for a drain
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Run `job` on the owner thread, after every job dispatched before it
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let on_primary = self.is_primary_thread();
        if on_primary && self.inner.inline_on_primary && self.pending() == 0 {
            // Inside a running job this is queued instead, so jobs never nest
            if !self.inner.draining.swap(true, Ordering::AcqRel) {
                let _guard = DrainGuard(&self.inner.draining);
                job();
                self.run_queued();
                return;
            }
        }

        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        if self.inner.sender.send(Box::new(job)).is_err() {
            // The receiver lives in `inner`, so this cannot happen while
            // `self` is alive.
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        if !on_primary {
            let wake = lock(&self.inner.wake).clone();
            if let Some(wake) = wake {
                wake();
            }
        }
    }

    /// Run every queued job in order; returns how many ran
    ///
    /// Jobs dispatched while draining run in the same drain. A drain started
    /// from inside a job returns `Ok(0)` and leaves the work to the outer one.
    pub fn drain(&self) -> Result<usize> {
        let actual = thread::current().id();
        if actual != self.inner.owner {
            tracing::warn!(owner = ?self.inner.owner, ?actual, "PrimaryQueue: drain from wrong thread");
            return Err(BindingError::WrongThread {
                owner: self.inner.owner,
                actual,
            });
        }
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }
        let _guard = DrainGuard(&self.inner.draining);

        let ran = self.run_queued();
        if ran > 0 {
            tracing::trace!(jobs = ran, "PrimaryQueue: drained");
        }
        Ok(ran)
    }

    /// Caller holds the draining flag
    fn run_queued(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = lock(&self.inner.receiver).try_recv();
            let Ok(job) = next else { break };
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            job();
            ran += 1;
        }
        ran
    }
}

impl Default for PrimaryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrimaryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryQueue")
            .field("owner", &self.inner.owner)
            .field("pending", &self.pending())
            .field("inline_on_primary", &self.inner.inline_on_primary)
            .finish()
    }
}
