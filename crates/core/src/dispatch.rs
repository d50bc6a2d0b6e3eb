//! Consumer-context task queue
//!
//! Anything that must not run on the network context (prompts, world
//! mutation) is posted here as a closure and executed later by the
//! consumer loop via [`DispatchQueue::run_pending`].

use tokio::sync::mpsc;
use tracing::debug;

/// Unit of work posted to the consumer context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Receiving end, owned by the consumer loop
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<Task>,
    rx: mpsc::UnboundedReceiver<Task>,
}

/// Posting end, clonable and usable from any thread
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Task>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Get a handle for posting tasks to this queue
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            tx: self.tx.clone(),
        }
    }

    /// Run every task queued so far, in post order.
    ///
    /// Tasks posted while draining (e.g. by a running task) run in the
    /// same call. Returns how many tasks ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Post a task to run on the consumer context. Never blocks.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(task)).is_err() {
            debug!("Dispatch queue dropped, task discarded");
        }
    }
}
