//! Worker pool and dispatcher.
//!
//! The pool hands a task to an idle worker if there is one and otherwise
//! runs it on the submitting thread. Submission never blocks on a full
//! queue and never spawns extra threads, and a saturated pool slows the
//! dispatcher down to the pace of the workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError};

use super::{Frontier, SearchNode};
use crate::error::{PackingError, PackingResult};

/// Unit of work run by the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Expansion step executed for every node popped from the frontier.
pub type ExpandFn = Arc<dyn Fn(Arc<SearchNode>) + Send + Sync + 'static>;

/// Fixed-size thread pool with a caller-runs saturation policy.
pub struct WorkerPool {
    /// Rendezvous channel: a send only succeeds if a worker is waiting.
    sender: Option<Sender<Task>>,

    workers: Vec<JoinHandle<()>>,

    /// Tasks run on the submitting thread.
    inline_runs: AtomicU64,
}

impl WorkerPool {
    /// Spawn `threads` workers. With zero threads every task runs inline.
    pub fn new(threads: usize) -> PackingResult<Self> {
        if threads == 0 {
            return Ok(Self {
                sender: None,
                workers: Vec::new(),
                inline_runs: AtomicU64::new(0),
            });
        }

        let (sender, receiver) = crossbeam_channel::bounded::<Task>(0);
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("packing-worker-{}", i))
                .spawn(move || {
                    for task in receiver.iter() {
                        task();
                    }
                })
                .map_err(|e| {
                    PackingError::ThreadPool(format!("failed to spawn worker {}: {}", i, e))
                })?;
            workers.push(handle);
        }
        log::debug!("Worker pool started with {} threads", threads);

        Ok(Self {
            sender: Some(sender),
            workers,
            inline_runs: AtomicU64::new(0),
        })
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Tasks that ran on the submitting thread so far.
    pub fn inline_runs(&self) -> u64 {
        self.inline_runs.load(Ordering::Relaxed)
    }

    /// Run `task` on an idle worker, or on this thread if none is idle.
    pub fn submit(&self, task: Task) -> PackingResult<()> {
        let Some(sender) = &self.sender else {
            task();
            return Ok(());
        };

        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => {
                self.inline_runs.fetch_add(1, Ordering::Relaxed);
                task();
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(PackingError::ThreadPool(
                "all worker threads have exited".into(),
            )),
        }
    }

    /// Stop accepting tasks and wait for the workers to exit.
    pub fn shutdown(mut self) -> PackingResult<()> {
        self.sender = None;
        let mut result = Ok(());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                result = Err(PackingError::ThreadPool("worker thread panicked".into()));
            }
        }
        result
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Single loop feeding frontier nodes to the pool.
pub struct Dispatcher {
    handle: JoinHandle<PackingResult<u64>>,
}

impl Dispatcher {
    /// Start the dispatch loop on its own thread.
    ///
    /// The loop ends when the frontier is marked finished. A failed
    /// submission marks the frontier finished and ends the loop with the error.
    pub fn spawn(
        frontier: Arc<Frontier>,
        pool: Arc<WorkerPool>,
        expand: ExpandFn,
    ) -> PackingResult<Self> {
        let handle = thread::Builder::new()
            .name("packing-dispatcher".into())
            .spawn(move || Self::run(&frontier, &pool, &expand))
            .map_err(|e| PackingError::ThreadPool(format!("failed to spawn dispatcher: {}", e)))?;
        Ok(Self { handle })
    }

    /// Dispatch loop. Returns the number of dispatched nodes.
    pub fn run(frontier: &Frontier, pool: &WorkerPool, expand: &ExpandFn) -> PackingResult<u64> {
        let mut dispatched = 0u64;
        while let Some(node) = frontier.blocking_pop() {
            let expand = Arc::clone(expand);
            if let Err(e) = pool.submit(Box::new(move || expand(node))) {
                log::error!("Dispatcher stopping: {}", e);
                frontier.mark_finished();
                return Err(e);
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Wait for the loop to end.
    pub fn join(self) -> PackingResult<u64> {
        self.handle
            .join()
            .map_err(|_| PackingError::ThreadPool("dispatcher thread panicked".into()))?
    }
}
