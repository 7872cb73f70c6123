//! Single-thread sequential worker.
//!
//! Jobs run one at a time, in submission order, on one background thread.
//! Results come back on a channel tagged with the job's submission index.
//!
//! [`SequentialWorker::shutdown_now`] raises the stop signal: jobs still in
//! the queue are dropped without running and the running job sees the signal
//! at its next check. The thread is not joined, since a job blocked inside a
//! protocol call may take a while to notice.

use crate::logging::log_debug;
use crate::task::StopSignal;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce(&StopSignal) -> bool + Send + 'static>;

/// Outcome of one job. `Err` carries the panic message of a job that blew up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub index: usize,
    pub outcome: Result<bool, String>,
}

pub struct SequentialWorker {
    jobs: Option<Sender<(usize, Job)>>,
    results: Receiver<JobResult>,
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
    submitted: usize,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

impl SequentialWorker {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<(usize, Job)>();
        let (result_tx, result_rx) = unbounded::<JobResult>();
        let stop = StopSignal::new();
        let worker_stop = stop.clone();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for (index, job) in job_rx.iter() {
                    if worker_stop.is_stopped() {
                        break;
                    }
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&worker_stop)))
                        .map_err(panic_message);
                    if result_tx.send(JobResult { index, outcome }).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            stop,
            handle: Some(handle),
            submitted: 0,
        })
    }

    /// Queue a job; returns its submission index, or None after shutdown.
    pub fn submit<F>(&mut self, job: F) -> Option<usize>
    where
        F: FnOnce(&StopSignal) -> bool + Send + 'static,
    {
        let jobs = self.jobs.as_ref()?;
        let index = self.submitted;
        jobs.send((index, Box::new(job))).ok()?;
        self.submitted += 1;
        Some(index)
    }

    pub fn results(&self) -> &Receiver<JobResult> {
        &self.results
    }

    /// Stop accepting jobs; queued jobs still run.
    pub fn shutdown(&mut self) {
        self.jobs.take();
    }

    /// Stop accepting jobs, drop queued ones and signal the running one.
    /// Idempotent.
    pub fn shutdown_now(&mut self) {
        self.jobs.take();
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                log_debug!("Worker still busy at shutdown, detaching");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}

impl Drop for SequentialWorker {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}
