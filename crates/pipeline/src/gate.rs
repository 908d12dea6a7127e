//! Bounded-concurrency task gate
//!
//! A fixed pool of workers pulls jobs off one FIFO queue, so at most `limit`
//! jobs run at once and a finished job immediately frees its slot for the
//! next queued one. Each job runs in its own task: a panic fails only that
//! job's result.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
struct GateCounters {
    active: AtomicUsize,
    queued: AtomicUsize,
    closed: AtomicBool,
}

/// FIFO work queue with at most `limit` jobs in flight
pub struct ConcurrencyGate {
    queue: mpsc::UnboundedSender<Job>,
    counters: Arc<GateCounters>,
    workers: Vec<JoinHandle<()>>,
    limit: usize,
}

impl ConcurrencyGate {
    /// Create a gate; must be called inside a Tokio runtime
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        let (queue, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(GateCounters::default());

        let workers = (0..limit)
            .map(|worker| tokio::spawn(worker_loop(worker, rx.clone(), counters.clone())))
            .collect();

        Self {
            queue,
            counters,
            workers,
            limit,
        }
    }

    /// Queue a task; the receiver resolves with its output
    ///
    /// The receiver errors if the task panics or the gate was closed before
    /// the task started.
    pub fn submit<F, T>(&self, task: F) -> oneshot::Receiver<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() {
            return rx;
        }

        let job: Job = Box::pin(async move {
            let _ = tx.send(task.await);
        });

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(job).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
        }
        rx
    }

    /// Stop starting queued jobs; running jobs finish on their own
    pub fn close(&self) {
        self.counters.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Jobs currently running
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Drop for ConcurrencyGate {
    fn drop(&mut self) {
        // Workers stop pulling; jobs already spawned run to completion
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    counters: Arc<GateCounters>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };
        counters.queued.fetch_sub(1, Ordering::SeqCst);

        if counters.closed.load(Ordering::SeqCst) {
            // Dropping the job drops its result sender
            continue;
        }

        counters.active.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = tokio::spawn(job).await {
            if e.is_panic() {
                tracing::error!(worker, "Gated task panicked");
            }
        }
        counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}
