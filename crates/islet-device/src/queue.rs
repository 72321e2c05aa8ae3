// Queue: the single in-order command queue of a device
//
// Commands are boxed closures executed one at a time, in submission order, by
// a dedicated worker thread. The host side only ever blocks in `wait()`, which
// returns once every command submitted so far has completed.
//
//   host thread                     worker thread
//   -----------                     -------------
//   submit(cmd) --- channel ------> cmd(&mut DeviceScope)
//   wait()      <-- condvar ------- completed += 1
//
// A failing (or panicking) command does not stop the queue. The first failure
// since the last `wait()` is kept and handed back by that next `wait()`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use islet_core::{Error, ErrorKind, Result};
use tracing::{debug, trace};

use crate::scope::DeviceScope;

/// A unit of device work.
pub type Command = Box<dyn FnOnce(&mut DeviceScope) -> Result<()> + Send + 'static>;

/// Snapshot of a queue's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
}

impl QueueStats {
    pub fn pending(&self) -> u64 {
        self.submitted - self.completed
    }
}

#[derive(Default)]
struct QueueState {
    stats: QueueStats,
    error: Option<Error>,
}

struct Shared {
    name: String,
    state: Mutex<QueueState>,
    done: Condvar,
    sender: Mutex<Option<Sender<Command>>>,
}

/// Handle to a device's in-order queue. Cloning shares the queue.
#[derive(Clone)]
pub struct Queue {
    shared: Arc<Shared>,
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Queue {
    /// Create the queue and spawn its worker.
    pub(crate) fn spawn(name: &str) -> Result<(Queue, JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel::<Command>();
        let shared = Arc::new(Shared {
            name: name.to_string(),
            state: Mutex::new(QueueState::default()),
            done: Condvar::new(),
            sender: Mutex::new(Some(tx)),
        });
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("{name}-queue"))
            .spawn(move || worker_loop(worker_shared, rx))
            .map_err(|e| Error::device(format!("cannot start queue worker: {e}")))?;
        Ok((Queue { shared }, handle))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Enqueue a command. Returns as soon as the command is queued.
    pub fn submit<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(&mut DeviceScope) -> Result<()> + Send + 'static,
    {
        let sender = lock(&self.shared.sender);
        let Some(tx) = sender.as_ref() else {
            return Err(Error::device(format!("queue '{}' is shut down", self.shared.name)));
        };
        let index = {
            let mut state = lock(&self.shared.state);
            state.stats.submitted += 1;
            state.stats.submitted
        };
        if tx.send(Box::new(command)).is_err() {
            let mut state = lock(&self.shared.state);
            state.stats.submitted -= 1;
            return Err(Error::device(format!("queue '{}' worker is gone", self.shared.name)));
        }
        trace!(queue = %self.shared.name, index, "submitted command");
        Ok(())
    }

    /// Block until every submitted command has completed.
    ///
    /// Returns the first error raised by a command since the previous wait.
    pub fn wait(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        while state.stats.completed < state.stats.submitted {
            state = self
                .shared
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> QueueStats {
        lock(&self.shared.state).stats
    }

    /// Whether both handles refer to the same queue.
    pub fn same_queue(&self, other: &Queue) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Stop accepting commands. The worker drains what is queued and exits.
    pub(crate) fn shutdown(&self) {
        lock(&self.shared.sender).take();
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.shared.name)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>, rx: Receiver<Command>) {
    let mut scope = DeviceScope::new();
    while let Ok(command) = rx.recv() {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| command(&mut scope))) {
            Ok(r) => r,
            Err(payload) => Err(Error::device(format!(
                "command panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };
        let mut state = lock(&shared.state);
        state.stats.completed += 1;
        if let Err(e) = result {
            debug!(queue = %shared.name, error = %e, "command failed");
            if state.error.is_none() {
                state.error = Some(match e.kind() {
                    ErrorKind::Device => e,
                    _ => Error::device(e.to_string()),
                });
            }
        }
        drop(state);
        shared.done.notify_all();
    }
    trace!(queue = %shared.name, "queue worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
