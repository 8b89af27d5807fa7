//! Fixed-size worker pool with future-valued task submission.
//!
//! Workers drain a FIFO queue; `submit` hands back a [`TaskHandle`] that
//! resolves to the task's return value. Dropping the pool closes the
//! queue: each worker finishes its current task, drains what remains, and
//! exits before the drop returns. No task stealing, no priorities.

use crate::error::{RagError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a submitted task's eventual value.
pub struct TaskHandle<T> {
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task completes.
    ///
    /// Returns `Cancelled` if the value was lost — the task panicked or
    /// the pool shut down before it ran.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| RagError::Cancelled)
    }

    /// A handle that resolves immediately with `value` (used when work was
    /// executed synchronously).
    pub fn ready(value: T) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(value);
        Self { receiver: rx }
    }
}

/// Fixed pool of worker threads executing queued tasks.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `num_workers` threads (at least one).
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..num_workers.max(1))
            .map(|_| {
                let receiver: Receiver<Job> = receiver.clone();
                thread::spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        // A panicking task must not take its worker down;
                        // the dropped result channel reports Cancelled.
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
                    }
                })
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queues a task and returns a handle to its result.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let job: Job = Box::new(move || {
            let _ = tx.send(task());
        });
        if let Some(sender) = &self.sender {
            let _ = sender.send(job);
        }
        TaskHandle { receiver: rx }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain outstanding work and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
