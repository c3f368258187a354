//! Task Queue
//!
//! Fixed-size worker pool fed by an unbounded intake channel.
//!
//! ## Responsibilities
//! - **Intake**: accepting commands from any task without blocking the caller.
//! - **Isolation**: running each command as its own tokio task so a panic surfaces as a
//!   failed handle instead of killing the worker that picked it up.
//! - **Shutdown**: refusing new work, then draining or cancelling what is queued.
//!
//! Workers share the receiving end behind an async mutex; whichever worker is idle takes
//! the next job. Commands are independent, so ordering between them is not preserved.

use super::command::StorageCommand;
use super::types::*;
use crate::error::CommandError;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};

/// State shared between the queue front and its workers.
struct WorkerShared {
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>,
    in_flight: DashMap<TaskId, AbortHandle>,
    cancelled: AtomicBool,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

pub struct TaskQueue {
    /// `None` once shutdown has begun.
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    shared: Arc<WorkerShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    next_task_id: AtomicU64,
    enqueued: AtomicU64,
    rejected: AtomicU64,
}

impl TaskQueue {
    /// Spawns `worker_count` workers (at least one) and returns the running queue.
    pub fn start(worker_count: usize) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();

        let shared = Arc::new(WorkerShared {
            receiver: tokio::sync::Mutex::new(receiver),
            in_flight: DashMap::new(),
            cancelled: AtomicBool::new(false),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let workers = (0..worker_count)
            .map(|worker_id| {
                let shared = shared.clone();
                tokio::spawn(async move { worker_loop(worker_id, shared).await })
            })
            .collect();

        tracing::info!("Task queue started with {} workers", worker_count);

        Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            shared,
            workers: Mutex::new(workers),
            worker_count,
            next_task_id: AtomicU64::new(1),
            enqueued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    /// Submits a command and returns its handle without waiting for it to start.
    ///
    /// After `shutdown` the handle resolves immediately to `QueueClosed`.
    pub fn enqueue<C: StorageCommand>(&self, command: C) -> TaskHandle<C::Output> {
        let id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let name = command.name();
        let (result_tx, result_rx) = oneshot::channel();

        let shared = self.shared.clone();
        let future: JobFuture = Box::pin(async move {
            let result = command.execute().await;
            match &result {
                Ok(_) => {
                    shared.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("{} ({}) succeeded", id, name);
                }
                Err(e) => {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("{} ({}) failed: {}", id, name, e);
                }
            }
            if result_tx.send(result).is_err() {
                tracing::trace!("Result of {} dropped, nobody is waiting", id);
            }
        });

        let job = Job { id, name, future };
        let accepted = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        };

        if !accepted {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Rejected {} ({}): queue is shut down", id, name);
            return TaskHandle::resolved(id, name, CommandError::QueueClosed);
        }

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Enqueued {} ({})", id, name);
        TaskHandle::new(id, name, result_rx)
    }

    pub fn is_accepting(&self) -> bool {
        self.sender.lock().is_some()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            succeeded: self.shared.succeeded.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            in_flight: self.shared.in_flight.len(),
        }
    }

    /// Stops intake and winds the workers down.
    ///
    /// With a grace period, queued and running commands may finish within it; whatever
    /// is left afterwards is cancelled. Without one, running commands are cancelled and
    /// queued ones are dropped right away. Handles of cancelled or dropped commands
    /// resolve to `Aborted`. Returns `true` if everything finished on its own.
    pub async fn shutdown(&self, grace: Option<Duration>) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            tracing::debug!("Task queue already shut down");
            return true;
        };
        drop(sender);

        let mut workers = std::mem::take(&mut *self.workers.lock());
        tracing::info!(
            "Shutting down task queue ({} in flight, grace {:?})",
            self.shared.in_flight.len(),
            grace
        );

        let drained = match grace {
            Some(grace) => tokio::time::timeout(grace, async {
                while let Some(worker) = workers.last_mut() {
                    let _ = worker.await;
                    workers.pop();
                }
            })
            .await
            .is_ok(),
            None => false,
        };

        if !drained {
            self.cancel_all();
            for worker in workers {
                let _ = worker.await;
            }
        }

        tracing::info!("Task queue stopped (drained: {})", drained);
        drained
    }

    fn cancel_all(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        let mut aborted = 0;
        for entry in self.shared.in_flight.iter() {
            entry.value().abort();
            aborted += 1;
        }
        if aborted > 0 {
            tracing::warn!("Cancelled {} running command(s)", aborted);
        }
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<WorkerShared>) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        let next = {
            let mut receiver = shared.receiver.lock().await;
            receiver.recv().await
        };

        let Some(Job { id, name, future }) = next else {
            break;
        };

        if shared.cancelled.load(Ordering::SeqCst) {
            tracing::debug!("Worker {} dropping {} ({})", worker_id, id, name);
            continue;
        }

        let task = tokio::spawn(future);
        shared.in_flight.insert(id, task.abort_handle());
        // Cancellation may have swept the table just before the insert.
        if shared.cancelled.load(Ordering::SeqCst) {
            task.abort();
        }

        match task.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                shared.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Worker {}: {} ({}) panicked", worker_id, id, name);
            }
            Err(_) => {
                tracing::warn!("Worker {}: {} ({}) was cancelled", worker_id, id, name);
            }
        }

        shared.in_flight.remove(&id);
    }

    tracing::debug!("Worker {} stopped", worker_id);
}
