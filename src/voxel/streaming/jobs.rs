//! Job substrate for chunk builds and listener dispatch.
//!
//! Jobs run on a dedicated rayon pool. Every completion notifies one
//! pool-wide condition variable, so [`JobSystem::join_all`] sleeps until
//! something actually finishes instead of polling.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::core::{Error, Result};

#[derive(Debug, Default)]
struct SignalState {
    completed: u64,
    interrupted: bool,
}

/// Completion and interruption signal shared by a pool's jobs
#[derive(Debug, Default)]
struct Signal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl Signal {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn completed(&self) {
        self.lock().completed += 1;
        self.cond.notify_all();
    }

    fn interrupt(&self) {
        self.lock().interrupted = true;
        self.cond.notify_all();
    }

    /// Block until `done` holds, the deadline passes or an interrupt arrives.
    /// `pending` counts what is still outstanding for the timeout error.
    fn wait_until(
        &self,
        deadline: Option<Instant>,
        consume_interrupt: bool,
        done: impl Fn() -> bool,
        pending: impl Fn() -> usize,
    ) -> Result<()> {
        let mut state = self.lock();
        loop {
            if consume_interrupt && state.interrupted {
                state.interrupted = false;
                return Err(Error::Interrupted);
            }
            if done() {
                return Ok(());
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::JoinTimeout { pending: pending() });
                    }
                    deadline - now
                }
                None => Duration::from_secs(3600),
            };
            state = self
                .cond
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Cancels the join currently in progress, or the next one to start.
#[derive(Clone, Debug)]
pub struct Interrupter {
    signal: Arc<Signal>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        log::debug!("Join interrupt requested");
        self.signal.interrupt();
    }

    /// Whether an interrupt is waiting to be consumed by a join
    pub fn is_pending(&self) -> bool {
        self.signal.lock().interrupted
    }
}

#[derive(Debug)]
struct JobSlot<T> {
    done: AtomicBool,
    result: Mutex<Option<Result<T>>>,
}

/// Completion handle for a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    slot: Arc<JobSlot<T>>,
    signal: Arc<Signal>,
}

impl<T> JobHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.slot.done.load(Ordering::Acquire)
    }

    /// Block until the job finishes
    pub fn wait(&self) {
        // Without an interrupt or a deadline the wait can only end in Ok
        let _ = self.signal.wait_until(None, false, || self.is_finished(), || 1);
    }

    /// Block for at most `timeout`; returns whether the job finished
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.signal
            .wait_until(Some(Instant::now() + timeout), false, || self.is_finished(), || 1)
            .is_ok()
    }

    /// Take the job's result. `None` while the job runs or once already taken.
    pub fn take(&self) -> Option<Result<T>> {
        if !self.is_finished() {
            return None;
        }
        self.slot.result.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Wait for the job and take its result
    pub fn join(self) -> Result<T> {
        self.wait();
        self.take()
            .unwrap_or_else(|| Err(Error::WorkerPool("job result already taken".into())))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Worker pool running chunk jobs
pub struct JobSystem {
    pool: ThreadPool,
    signal: Arc<Signal>,
}

impl JobSystem {
    /// Create a pool with `threads` workers (0 lets rayon pick)
    pub fn new(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("chunk-worker-{i}"))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;
        log::debug!("Job system started with {} worker(s)", pool.current_num_threads());
        Ok(Self { pool, signal: Arc::new(Signal::default()) })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Handle that interrupts joins on this pool
    pub fn interrupter(&self) -> Interrupter {
        Interrupter { signal: Arc::clone(&self.signal) }
    }

    /// Jobs completed since the pool started
    pub fn completed(&self) -> u64 {
        self.signal.lock().completed
    }

    /// Run `task` on the pool. A panic inside the task becomes
    /// [`Error::JobPanicked`] in the handle.
    pub fn submit<T, F>(&self, task: F) -> JobHandle<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::new(JobSlot { done: AtomicBool::new(false), result: Mutex::new(None) });
        let job_slot = Arc::clone(&slot);
        let signal = Arc::clone(&self.signal);

        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task))
                .unwrap_or_else(|payload| Err(Error::JobPanicked(panic_message(payload.as_ref()))));
            *job_slot.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            job_slot.done.store(true, Ordering::Release);
            signal.completed();
        });

        JobHandle { slot, signal: Arc::clone(&self.signal) }
    }

    /// Fork-join barrier: block until every handle has finished.
    ///
    /// Fails with [`Error::JoinTimeout`] once `timeout` elapses and with
    /// [`Error::Interrupted`] when an [`Interrupter`] fires. Either way the
    /// jobs keep running and the handles stay usable.
    pub fn join_all<'a, T, I>(&self, handles: I, timeout: Duration) -> Result<()>
    where
        T: 'a,
        I: IntoIterator<Item = &'a JobHandle<T>> + Clone,
    {
        let pending = || handles.clone().into_iter().filter(|h| !h.is_finished()).count();
        self.signal
            .wait_until(Some(Instant::now() + timeout), true, || pending() == 0, pending)
    }
}

impl std::fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSystem")
            .field("threads", &self.threads())
            .field("completed", &self.completed())
            .finish()
    }
}
