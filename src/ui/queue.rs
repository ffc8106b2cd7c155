//! Hand-off of state updates from background workers to the UI thread.
//!
//! Workers never touch UI state. They push a closure; the UI thread drains
//! the queue once per frame and runs each closure against its state. A
//! closure that panics is caught, logged and dropped; the frame goes on.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use thiserror::Error;
use tracing::error;

pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("ui task queue is full ({0} pending)")]
    Full(usize),
    #[error("ui task queue is closed")]
    Closed,
}

/// Outcome of one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub ran: usize,
    pub panicked: usize,
}

/// Receiving side, owned by the UI thread.
pub struct TaskQueue<S> {
    tx: Sender<Task<S>>,
    rx: Receiver<Task<S>>,
    capacity: usize,
}

/// Sending side, cloned into workers.
pub struct QueueHandle<S> {
    tx: Sender<Task<S>>,
    capacity: usize,
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<S> TaskQueue<S> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    pub fn handle(&self) -> QueueHandle<S> {
        QueueHandle {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Run every closure pending at the start of the call, in FIFO order.
    ///
    /// Closures pushed while draining wait for the next frame.
    pub fn drain(&self, state: &mut S) -> DrainReport {
        let mut report = DrainReport::default();
        for _ in 0..self.rx.len() {
            let task = match self.rx.try_recv() {
                Ok(task) => task,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            report.ran += 1;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task(state))) {
                report.panicked += 1;
                error!(panic = %panic_message(&*payload), "ui task panicked");
            }
        }
        report
    }
}

impl<S> QueueHandle<S> {
    /// Enqueue without blocking. A full queue is reported, not waited on.
    pub fn push(&self, task: impl FnOnce(&mut S) + Send + 'static) -> Result<(), QueueError> {
        match self.tx.try_send(Box::new(task)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                error!(capacity = self.capacity, "ui task queue full, dropping update");
                Err(QueueError::Full(self.capacity))
            }
            Err(TrySendError::Disconnected(_)) => Err(QueueError::Closed),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
