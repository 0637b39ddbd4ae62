//! Dynamically sized worker pool draining a [`TaskQueue`]
//!
//! Flow of one [`Dispatcher::run`]:
//! 1. Start `min(max_workers, queue.len())` workers
//! 2. Each worker pops a task, fetches it, and hands the result to the
//!    completion callback when it passes the result check
//! 3. After every delivery the pool grows if the queue outgrew it
//! 4. A worker that finds the queue empty leaves the live set; the last
//!    one out fires the completion signal

use super::http::{Fetcher, ReqwestFetcher};
use super::runner::{self, Completion};
use crate::config::{Config, DispatcherConfig, HttpConfig};
use crate::observability::{RunMetrics, RunSummary};
use crate::queue::TaskQueue;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub type WorkerId = usize;

/// Receives `(url, serialized_params)` before each request
pub type DebugSink = Arc<dyn Fn(&str, &str) + Send + Sync>;

type CompletionCallback = Arc<dyn Fn(Completion) + Send + Sync>;

/// Worker pool front end
///
/// Settings are plain fields of the instance and apply to every later
/// `run`. `max_workers` and `check_result` are read once when a run starts.
#[derive(Clone)]
pub struct Dispatcher {
    fetcher: Arc<dyn Fetcher>,
    max_workers: usize,
    check_result: bool,
    debugger: Option<DebugSink>,
}

impl Dispatcher {
    /// Dispatcher with default settings over the given fetcher
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self::with_config(Arc::new(fetcher), &DispatcherConfig::default())
    }

    pub fn with_config(fetcher: Arc<dyn Fetcher>, config: &DispatcherConfig) -> Self {
        let mut dispatcher = Self {
            fetcher,
            max_workers: 1,
            check_result: config.check_result,
            debugger: None,
        };
        dispatcher.set_max_workers(config.max_workers);
        dispatcher
    }

    /// Dispatcher backed by a [`ReqwestFetcher`] built from `http`
    pub fn from_http_config(
        http: &HttpConfig,
        config: &DispatcherConfig,
    ) -> super::http::Result<Self> {
        let fetcher = ReqwestFetcher::new(http)?;
        Ok(Self::with_config(Arc::new(fetcher), config))
    }

    pub fn from_config(config: &Config) -> super::http::Result<Self> {
        Self::from_http_config(&config.http, &config.dispatcher)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Set the worker cap; values below 1 are raised to 1
    pub fn set_max_workers(&mut self, max_workers: usize) -> &mut Self {
        if max_workers == 0 {
            warn!("max_workers must be at least 1, using 1");
        }
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn check_result(&self) -> bool {
        self.check_result
    }

    pub fn set_check_result(&mut self, enabled: bool) -> &mut Self {
        self.check_result = enabled;
        self
    }

    pub fn set_debugger<F>(&mut self, sink: F) -> &mut Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.debugger = Some(Arc::new(sink));
        self
    }

    pub fn clear_debugger(&mut self) -> &mut Self {
        self.debugger = None;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.set_max_workers(max_workers);
        self
    }

    pub fn with_check_result(mut self, enabled: bool) -> Self {
        self.check_result = enabled;
        self
    }

    pub fn with_debugger<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.set_debugger(sink);
        self
    }

    /// Drain `queue`, calling `on_complete` for each delivered result
    ///
    /// Resolves once the queue is empty and every worker has exited.
    /// `on_complete` may push onto a clone of `queue`; those tasks are
    /// fetched within the same run. The callback runs on the worker that
    /// fetched the task, so several callbacks may execute at once on a
    /// multi-threaded runtime.
    ///
    /// Panics raised by `on_complete` are not caught: the remaining
    /// workers finish draining and the panic is then resumed here.
    ///
    /// Two runs must not drain the same queue concurrently.
    pub async fn run<F>(&self, queue: &TaskQueue, on_complete: F) -> RunSummary
    where
        F: Fn(Completion) + Send + Sync + 'static,
    {
        let run_id = Uuid::now_v7();
        let span = info_span!("fetch_run", %run_id);
        self.drive(queue, Arc::new(on_complete)).instrument(span).await
    }

    async fn drive(&self, queue: &TaskQueue, on_complete: CompletionCallback) -> RunSummary {
        let started = Instant::now();
        let queued = queue.len();
        let target = self.max_workers.min(queued);

        info!(
            queued,
            max_workers = self.max_workers,
            check_result = self.check_result,
            "Starting fetch run"
        );

        let metrics = Arc::new(RunMetrics::new());
        if target == 0 {
            info!("Queue empty, nothing to fetch");
            return metrics.snapshot(started.elapsed());
        }

        // Created before any worker exists, so the signal can never be missed
        let (done_tx, done_rx) = oneshot::channel();

        let pool = Arc::new(Pool {
            queue: queue.clone(),
            fetcher: Arc::clone(&self.fetcher),
            on_complete,
            debugger: self.debugger.clone(),
            max_workers: self.max_workers,
            check_result: self.check_result,
            metrics: Arc::clone(&metrics),
            state: Mutex::new(PoolState {
                target,
                live: HashSet::with_capacity(target),
                next_id: 0,
                workers: JoinSet::new(),
                done: Some(done_tx),
            }),
        });

        {
            let mut state = pool.lock();
            pool.spawn_up_to_target(&mut state);
        }

        // The sender lives in the pool until the last worker retires
        let _ = done_rx.await;

        let mut workers = std::mem::take(&mut pool.lock().workers);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }

        let summary = metrics.snapshot(started.elapsed());
        info!(
            popped = summary.popped,
            delivered = summary.delivered,
            failed = summary.failed,
            filtered = summary.filtered,
            peak_workers = summary.peak_workers,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Fetch run complete"
        );
        summary
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_workers", &self.max_workers)
            .field("check_result", &self.check_result)
            .field("debugger", &self.debugger.is_some())
            .finish_non_exhaustive()
    }
}

/// State shared by the workers of a single run
pub(super) struct Pool {
    pub(super) queue: TaskQueue,
    pub(super) fetcher: Arc<dyn Fetcher>,
    pub(super) on_complete: CompletionCallback,
    pub(super) debugger: Option<DebugSink>,
    pub(super) max_workers: usize,
    pub(super) check_result: bool,
    pub(super) metrics: Arc<RunMetrics>,
    state: Mutex<PoolState>,
}

struct PoolState {
    /// Current concurrency target; only ever raised during a run
    target: usize,
    live: HashSet<WorkerId>,
    next_id: WorkerId,
    workers: JoinSet<()>,
    done: Option<oneshot::Sender<()>>,
}

impl Pool {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Critical sections never panic midway, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_up_to_target(self: &Arc<Self>, state: &mut PoolState) {
        while state.live.len() < state.target {
            let worker_id = state.next_id;
            state.next_id += 1;
            state.live.insert(worker_id);

            let pool = Arc::clone(self);
            state
                .workers
                .spawn(runner::work(pool, worker_id).in_current_span());
            debug!(worker_id, live = state.live.len(), "Worker started");
        }
        self.metrics.observe_workers(state.live.len());
    }

    /// Grow the pool when the queue has outrun it
    ///
    /// Called after each delivered completion, so work pushed by the
    /// callback gets picked up by fresh workers.
    pub(super) fn rescale(self: &Arc<Self>) {
        let queued = self.queue.len();
        let mut state = self.lock();
        let live = state.live.len();

        if queued > live && live < self.max_workers {
            let wanted = self.max_workers.min(queued);
            if wanted > state.target {
                debug!(queued, live, from = state.target, to = wanted, "Raising worker target");
                state.target = wanted;
                self.spawn_up_to_target(&mut state);
            }
        }
    }

    /// Remove a worker from the live set, firing completion if it was the last
    pub(super) fn retire(&self, worker_id: WorkerId) {
        let mut state = self.lock();
        state.live.remove(&worker_id);
        debug!(worker_id, live = state.live.len(), "Worker exited");

        if state.live.is_empty() {
            if let Some(done) = state.done.take() {
                let _ = done.send(());
            }
        }
    }
}
