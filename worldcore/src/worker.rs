//! Background task queue (§5 `[ADDED]`). The tick builds a task, enqueues
//! it, and moves on — persistence/loot/XP-grant calls are fire-and-forget
//! from the tick's standpoint and must be idempotent at the business
//! level, matching the teacher's pattern of never awaiting I/O from inside
//! a fixed-update system.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct BackgroundWorker {
    tx: SyncSender<Task>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawns one dedicated OS thread draining a bounded channel of
    /// capacity `queue_capacity`. A full queue drops the newest task and
    /// logs a warning rather than blocking the tick.
    pub fn spawn(queue_capacity: usize) -> Self {
        let (tx, rx): (SyncSender<Task>, Receiver<Task>) = mpsc::sync_channel(queue_capacity);
        let handle = std::thread::Builder::new()
            .name("worldcore-bg-worker".into())
            .spawn(move || Self::drain(rx))
            .expect("failed to spawn background worker thread");
        Self { tx, handle: Some(handle) }
    }

    fn drain(rx: Receiver<Task>) {
        for task in rx {
            task();
        }
    }

    /// Enqueue a task. Never blocks: if the queue is full the task is
    /// dropped and a warning logged, since the tick must never stall on
    /// background work.
    pub fn submit(&self, task: Task) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("background worker queue full, dropping task");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("background worker thread gone, dropping task");
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        // Dropping `tx` closes the channel; the worker thread's `for task in rx`
        // loop then exits on its own once the queue drains.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Test-only synchronous stand-in: runs tasks inline so assertions can
/// observe their effect without sleeping for a background thread.
pub struct InlineWorker;

impl InlineWorker {
    pub fn submit(&self, task: Task) {
        task();
    }
}
