use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::types::{GraphError, Result};

use super::GraphDb;

enum WorkerMessage {
    Trigger,
    Shutdown,
}

/// Background thread running a job against a database at a fixed interval.
///
/// The thread holds only a weak reference and exits once the database is
/// gone, on [`Worker::shutdown`], or when the worker is dropped.
pub struct Worker {
    name: &'static str,
    sender: Sender<WorkerMessage>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Spawns a thread running `job` every `interval` and on each trigger.
    pub fn spawn<F>(name: &'static str, interval: Duration, db: Weak<GraphDb>, job: F) -> Result<Self>
    where
        F: Fn(&GraphDb) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || Self::run_loop(name, interval, db, receiver, job))?;
        Ok(Self {
            name,
            sender,
            handle: Some(handle),
        })
    }

    /// Requests an immediate run.
    pub fn trigger(&self) -> Result<()> {
        self.sender
            .send(WorkerMessage::Trigger)
            .map_err(|_| GraphError::Corruption("worker channel closed"))
    }

    /// Stops the thread and waits for it unless called from the worker itself.
    pub fn shutdown(&mut self) {
        let _ = self.sender.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }

    fn run_loop<F>(
        name: &'static str,
        interval: Duration,
        db: Weak<GraphDb>,
        receiver: Receiver<WorkerMessage>,
        job: F,
    ) where
        F: Fn(&GraphDb),
    {
        loop {
            match receiver.recv_timeout(interval) {
                Ok(WorkerMessage::Trigger) | Err(RecvTimeoutError::Timeout) => {
                    let Some(db) = db.upgrade() else {
                        break;
                    };
                    job(&db);
                }
                Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = name, "db.worker.stopped");
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.handle.is_some())
            .finish()
    }
}
