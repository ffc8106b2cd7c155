//! Background execution of blocking vault work.

use std::collections::VecDeque;
use std::io;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Spawn: Send + Sync {
    fn spawn(&self, job: Job);
}

/// Blocking-thread pool backed by a tokio runtime.
pub struct WorkerPool {
    runtime: Option<Runtime>,
}

impl WorkerPool {
    pub fn new(max_threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_threads.max(1))
            .thread_name("vault-worker")
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }
}

impl Spawn for WorkerPool {
    fn spawn(&self, job: Job) {
        if let Some(runtime) = &self.runtime {
            drop(runtime.spawn_blocking(job));
        }
    }
}

impl Drop for WorkerPool {
    // A vault call stuck on a prompt must not hold up exit.
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Holds jobs until the caller runs them, in any order it likes.
#[derive(Default)]
pub struct ManualSpawner {
    jobs: Mutex<VecDeque<Job>>,
}

impl ManualSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn run_next(&self) -> bool {
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Most recently spawned first.
    pub fn run_last(&self) -> bool {
        let job = self.jobs.lock().pop_back();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Spawn for ManualSpawner {
    fn spawn(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }
}
