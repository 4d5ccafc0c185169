use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};

use crate::decode::traits::ReplicaFactory;
use crate::error::TranslateError;
use crate::orchestrator::worker::{DecodeWorker, WorkerMessage, WorkerSettings};
use crate::types::{RankedResult, Task, WorkerId};

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

type WorkerThread = JoinHandle<Result<usize, TranslateError>>;

struct WorkerSlot {
    id: WorkerId,
    /// `None` once the worker has been joined or detached.
    thread: Option<WorkerThread>,
}

/// Fixed set of decode workers fed from one shared task queue.
///
/// Every spawned worker stays registered until it is terminated. Terminating
/// joins a finished worker and detaches one that is still running after the
/// task channel has been closed, so it leaves at its next receive.
pub struct WorkerPool {
    workers: Vec<WorkerSlot>,
    tasks: Option<Sender<WorkerMessage>>,
    shutdown_grace: Duration,
}

impl WorkerPool {
    pub(crate) fn spawn(
        n_jobs: usize,
        settings: WorkerSettings,
        factory: Arc<dyn ReplicaFactory>,
        queue_capacity: Option<usize>,
        results: Sender<RankedResult>,
        shutdown_grace: Duration,
    ) -> Result<Self, TranslateError> {
        let (task_tx, task_rx): (Sender<WorkerMessage>, Receiver<WorkerMessage>) =
            match queue_capacity {
                Some(capacity) => crossbeam_channel::bounded(capacity.max(1)),
                None => crossbeam_channel::unbounded(),
            };

        let mut pool = Self {
            workers: Vec::with_capacity(n_jobs),
            tasks: Some(task_tx),
            shutdown_grace,
        };

        for idx in 0..n_jobs {
            let id = WorkerId(idx);
            let worker = DecodeWorker::new(
                id,
                settings,
                Arc::clone(&factory),
                task_rx.clone(),
                results.clone(),
            );
            // On error the partially built pool is dropped, which tears down
            // the workers started so far.
            let thread = thread::Builder::new()
                .name(format!("decode-worker-{idx}"))
                .spawn(move || worker.run())
                .map_err(|source| TranslateError::WorkerSpawn { worker: id, source })?;
            pool.workers.push(WorkerSlot {
                id,
                thread: Some(thread),
            });
        }

        tracing::debug!(workers = n_jobs, ?queue_capacity, "worker pool started");
        Ok(pool)
    }

    /// A pool with no workers, for driving the reassembler directly.
    #[cfg(test)]
    pub(crate) fn idle(shutdown_grace: Duration) -> Self {
        Self {
            workers: Vec::new(),
            tasks: None,
            shutdown_grace,
        }
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id).collect()
    }

    /// Workers neither terminated nor finished.
    pub fn alive(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| matches!(&w.thread, Some(t) if !t.is_finished()))
            .count()
    }

    /// Queues a task. While a bounded queue is full, worker health and the
    /// interrupt flag are checked on every poll tick.
    pub(crate) fn dispatch(&mut self, task: Task, interrupt: &AtomicBool) -> Result<(), TranslateError> {
        self.send_blocking(WorkerMessage::Decode(task), interrupt)
    }

    /// One stop sentinel per live worker, queued behind all tasks. Blocks like
    /// `dispatch` until every sentinel is queued or no worker is left to
    /// receive one.
    pub(crate) fn send_stop(&mut self, interrupt: &AtomicBool) -> Result<(), TranslateError> {
        let live = self.workers.iter().filter(|w| w.thread.is_some()).count();
        for _ in 0..live {
            if self.alive() == 0 {
                break;
            }
            self.send_blocking(WorkerMessage::Stop, interrupt)?;
        }
        Ok(())
    }

    fn send_blocking(
        &mut self,
        mut message: WorkerMessage,
        interrupt: &AtomicBool,
    ) -> Result<(), TranslateError> {
        let sender = self
            .tasks
            .clone()
            .ok_or(TranslateError::ChannelClosed("task"))?;
        loop {
            match sender.send_timeout(message, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(pending)) => {
                    if interrupt.load(Ordering::SeqCst) {
                        return Err(TranslateError::Interrupted);
                    }
                    self.check_health()?;
                    if matches!(pending, WorkerMessage::Stop) && self.alive() == 0 {
                        return Ok(());
                    }
                    message = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    self.check_health()?;
                    return Err(TranslateError::ChannelClosed("task"));
                }
            }
        }
    }

    /// Joins workers that already exited. A worker that returned an error or
    /// panicked is a fatal failure of the run.
    pub(crate) fn check_health(&mut self) -> Result<(), TranslateError> {
        for worker in &mut self.workers {
            if !matches!(&worker.thread, Some(t) if t.is_finished()) {
                continue;
            }
            if let Some(thread) = worker.thread.take() {
                reap(worker.id, thread)?;
            }
        }
        Ok(())
    }

    /// Waits up to the grace period for workers to leave on their own, then
    /// terminates whatever is left.
    pub(crate) fn shutdown(&mut self) {
        let deadline = Instant::now() + self.shutdown_grace;
        while self.alive() > 0 && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL.min(self.shutdown_grace));
        }
        self.terminate_all();
    }

    /// Idempotent. Returns `false` when the worker is unknown or was already
    /// terminated.
    ///
    /// Termination is cooperative: a finished worker is joined, a running one
    /// is detached and keeps running until its current decode returns and it
    /// sees the closed task channel. A replica stuck inside a decode call is
    /// not stopped.
    pub fn terminate(&mut self, id: WorkerId) -> bool {
        let Some(worker) = self.workers.iter_mut().find(|w| w.id == id) else {
            return false;
        };
        let Some(thread) = worker.thread.take() else {
            return false;
        };
        if thread.is_finished() {
            if let Err(err) = reap(id, thread) {
                tracing::warn!(error = %err, "worker ended with an error");
            }
        } else {
            tracing::warn!(worker = %id, "worker still running after shutdown, detaching");
        }
        true
    }

    pub(crate) fn terminate_all(&mut self) {
        // Closing the queue first lets detached workers leave at their next receive.
        self.tasks = None;
        for id in self.worker_ids() {
            self.terminate(id);
        }
    }
}

/// Closes the task channel and terminates every worker, with the same
/// cooperative semantics as [`WorkerPool::terminate`].
impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

fn reap(id: WorkerId, thread: WorkerThread) -> Result<(), TranslateError> {
    match thread.join() {
        Ok(Ok(decoded)) => {
            tracing::debug!(worker = %id, decoded, "worker exited");
            Ok(())
        }
        Ok(Err(err)) => Err(TranslateError::WorkerFailed {
            worker: id,
            message: err.to_string(),
        }),
        Err(payload) => Err(TranslateError::WorkerFailed {
            worker: id,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
