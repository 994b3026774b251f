use std::{
    any::Any,
    mem,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam::channel::{self, Receiver, Sender};
use futures::channel::oneshot;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, trace, warn};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A boxed unit of work, for batches mixing different closures.
pub type Task<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

static GLOBAL: Lazy<TaskRunner> = Lazy::new(|| TaskRunner::new(&RunnerConfig::default()));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Number of worker threads, `0` for one per available core.
    pub workers: usize,
    /// Prefix of the worker thread names.
    pub thread_name: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            thread_name: "stack-worker".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

/// Cooperative cancellation flag shared between a batch and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops scheduling of units that have not started yet. Units already
    /// running finish, but their results are discarded.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Also set once a unit of the batch has failed.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Marshals completions onto a thread chosen by the caller, e.g. a UI event loop.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

/// A queue of completions drained by whichever thread owns it.
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub fn dispatcher(&self) -> QueueDispatcher {
        QueueDispatcher {
            tx: self.tx.clone(),
        }
    }

    /// Runs every queued completion on the calling thread. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one completion and runs it.
    pub fn run_next_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: Sender<Job>,
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        if self.tx.send(job).is_err() {
            debug!("Event queue is gone, dropping completion");
        }
    }
}

/// Result of a batch that is still running.
#[derive(Debug)]
pub struct BatchHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
    cancel: CancelToken,
}

impl<T> BatchHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>, cancel: CancelToken) -> Self {
        Self { rx, cancel }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks the calling thread until the batch resolves.
    pub fn join(self) -> Result<T> {
        futures::executor::block_on(self.wait())
    }

    pub async fn wait(self) -> Result<T> {
        self.rx.await.unwrap_or_else(|_| Err(Error::Cancelled))
    }

    /// The result, if the batch has resolved already.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => result,
            Err(_) => Some(Err(Error::Cancelled)),
        }
    }
}

/// A bounded pool of worker threads running independent units of work.
///
/// Results are always gathered in submission order. A batch resolves exactly
/// once: with every result, with the first failure, or as cancelled.
#[derive(Debug)]
pub struct TaskRunner {
    pool: Option<ThreadPool>,
}

impl TaskRunner {
    pub fn new(config: &RunnerConfig) -> Self {
        let prefix = config.thread_name.clone();
        let built = ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(move |i| format!("{prefix}-{i}"))
            .panic_handler(|payload| {
                error!(
                    panic = %panic_message(payload.as_ref()),
                    "Batch completion panicked"
                );
            })
            .build();
        let pool = match built {
            Ok(pool) => {
                debug!(workers = pool.current_num_threads(), "Task runner started");
                Some(pool)
            }
            Err(err) => {
                warn!(%err, "No worker threads, units of work will run on the submitting thread");
                None
            }
        };

        Self { pool }
    }

    /// Process-wide runner with the default configuration.
    pub fn global() -> &'static TaskRunner {
        &GLOBAL
    }

    /// Number of worker threads, `0` if units run on the submitting thread.
    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(0, ThreadPool::current_num_threads)
    }

    /// Schedules `tasks` and calls `on_complete` on a worker thread once the
    /// batch resolves. `on_complete` runs exactly once.
    #[instrument(skip_all, fields(units = tasks.len()))]
    pub fn submit<T, F, C>(&self, tasks: Vec<F>, on_complete: C) -> CancelToken
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        C: FnOnce(Result<Vec<T>>) + Send + 'static,
    {
        let cancel = CancelToken::new();
        let units = tasks.len();
        if units == 0 {
            on_complete(Ok(Vec::new()));
            return cancel;
        }

        let on_complete: Completion<T> = Box::new(on_complete);
        let batch = Arc::new(Batch {
            slots: Mutex::new((0..units).map(|_| None).collect()),
            remaining: AtomicUsize::new(units),
            cancel: cancel.clone(),
            on_complete: Mutex::new(Some(on_complete)),
        });
        debug!(units, "Batch submitted");

        for (index, task) in tasks.into_iter().enumerate() {
            let batch = batch.clone();
            self.execute(Box::new(move || batch.run_unit(index, task)));
        }
        cancel
    }

    /// Schedules `tasks`, returning a handle to join or await.
    pub fn spawn<T, F>(&self, tasks: Vec<F>) -> BatchHandle<Vec<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancel = self.submit(tasks, move |result| {
            let _ = tx.send(result);
        });
        BatchHandle::new(rx, cancel)
    }

    /// Runs `tasks` and blocks until all of them finished or one failed.
    pub fn run<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.spawn(tasks).join()
    }

    /// Schedules `tasks` and hands the result to `callback` through `dispatcher`.
    pub fn spawn_dispatched<T, F, D, C>(&self, tasks: Vec<F>, dispatcher: D, callback: C) -> CancelToken
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        D: Dispatcher,
        C: FnOnce(Result<Vec<T>>) + Send + 'static,
    {
        self.submit(tasks, move |result| {
            dispatcher.dispatch(Box::new(move || callback(result)))
        })
    }

    /// Queues `job` behind every job submitted before it.
    fn execute(&self, job: Job) {
        match &self.pool {
            Some(pool) => pool.spawn_fifo(job),
            None => job(),
        }
    }
}

/// One unit of work per index in `0..count`, all sharing `f`.
pub fn indexed<T, F>(count: usize, f: F) -> Vec<impl FnOnce() -> Result<T> + Send + 'static>
where
    T: 'static,
    F: Fn(usize) -> Result<T> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    (0..count)
        .map(|i| {
            let f = f.clone();
            move || f(i)
        })
        .collect()
}

type Completion<T> = Box<dyn FnOnce(Result<Vec<T>>) + Send>;

struct Batch<T> {
    slots: Mutex<Vec<Option<T>>>,
    remaining: AtomicUsize,
    cancel: CancelToken,
    on_complete: Mutex<Option<Completion<T>>>,
}

impl<T> Batch<T> {
    fn run_unit<F>(&self, index: usize, task: F)
    where
        F: FnOnce() -> Result<T>,
    {
        if self.cancel.is_cancelled() {
            trace!(index, "Skipping unit of cancelled batch");
        } else {
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(value)) => self.slots.lock()[index] = Some(value),
                Ok(Err(err)) => self.fail(index, err),
                Err(payload) => self.fail(index, Error::Panicked(panic_message(payload.as_ref()))),
            }
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.settle();
        }
    }

    fn fail(&self, index: usize, err: Error) {
        debug!(index, %err, "Unit of work failed, abandoning batch");
        self.cancel.cancel();
        self.complete(Err(Error::TaskFailure {
            index,
            source: Box::new(err),
        }));
    }

    fn settle(&self) {
        if self.cancel.is_cancelled() {
            debug!("Batch cancelled");
            self.complete(Err(Error::Cancelled));
            return;
        }
        let slots = mem::take(&mut *self.slots.lock());
        let result = slots
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or(Error::Cancelled);
        debug!("Batch completed");
        self.complete(result);
    }

    fn complete(&self, result: Result<Vec<T>>) {
        let on_complete = self.on_complete.lock().take();
        if let Some(on_complete) = on_complete {
            on_complete(result);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
