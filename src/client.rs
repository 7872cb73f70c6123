//! The client: turns batches of units into tasks and runs them.
//!
//! Uploads go through a [`SequentialWorker`]: every batch becomes one task,
//! the tasks run strictly one after another, and the caller waits for all of
//! them up to an effective timeout. Existence checks and deletes always run
//! as a single task on the calling thread.

use crate::batch::batches;
use crate::config::ConnectionParameters;
use crate::error::{Result, TransferError};
use crate::logging::{self, log_debug, log_error};
use crate::remote::Connector;
use crate::task::{StopSignal, Task, TransferUnit};
use crate::worker::{JobResult, SequentialWorker};
use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seconds allowed per file when the caller passes a timeout below 1
pub const SECONDS_PER_FILE: u64 = 60 * 60;

const WORKER_THREAD_NAME: &str = "sftp-batch-worker";

/// Timeout actually enforced for `files` files.
pub fn effective_timeout(timeout_secs: i64, files: usize) -> u64 {
    if timeout_secs < 1 {
        SECONDS_PER_FILE * files as u64
    } else {
        timeout_secs as u64
    }
}

/// Handle for interrupting a caller blocked in an upload.
///
/// Clones share state; call [`Interrupt::interrupt`] from another thread.
/// The pending interrupt is consumed by the wait it aborts.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn interrupt(&self) {
        let _ = self.tx.try_send(());
    }

    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Batch SFTP client.
#[derive(Clone)]
pub struct SftpClient {
    params: Arc<ConnectionParameters>,
    connector: Arc<dyn Connector>,
}

impl SftpClient {
    /// Client talking SSH/SFTP.
    #[cfg(feature = "ssh")]
    pub fn new(params: ConnectionParameters) -> Self {
        Self::with_connector(params, Arc::new(crate::remote::SshConnector::new()))
    }

    pub fn with_connector(params: ConnectionParameters, connector: Arc<dyn Connector>) -> Self {
        Self {
            params: Arc::new(params),
            connector,
        }
    }

    pub fn parameters(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Switch logging on or off for the whole process.
    pub fn set_logging_enabled(enabled: bool) {
        logging::set_enabled(enabled);
    }

    // ── Upload ───────────────────────────────────────────────────────────────

    pub fn upload_file(&self, local: &str, remote: &str, timeout_secs: i64) -> Result<bool> {
        let task = Task::upload(self.params.clone(), vec![TransferUnit::new(local, remote)]);
        self.run_tasks(vec![task], timeout_secs, None)
    }

    /// Upload every unit in one task.
    pub fn upload(&self, units: Vec<TransferUnit>, timeout_secs: i64) -> Result<bool> {
        self.upload_batched(units, 0, timeout_secs)
    }

    /// Upload in tasks of `batch_size` units. Sizes below 2 mean one task.
    pub fn upload_batched(
        &self,
        units: Vec<TransferUnit>,
        batch_size: usize,
        timeout_secs: i64,
    ) -> Result<bool> {
        if units.is_empty() {
            return Ok(true);
        }
        let tasks = self.upload_tasks(units, batch_size);
        self.run_tasks(tasks, timeout_secs, None)
    }

    /// Like [`upload_batched`](Self::upload_batched), abortable through `interrupt`.
    pub fn upload_interruptible(
        &self,
        units: Vec<TransferUnit>,
        batch_size: usize,
        timeout_secs: i64,
        interrupt: &Interrupt,
    ) -> Result<bool> {
        if units.is_empty() {
            return Ok(true);
        }
        let tasks = self.upload_tasks(units, batch_size);
        self.run_tasks(tasks, timeout_secs, Some(interrupt))
    }

    pub(crate) fn upload_tasks(&self, units: Vec<TransferUnit>, batch_size: usize) -> Vec<Task> {
        if batch_size < 2 {
            return vec![Task::upload(self.params.clone(), units)];
        }
        batches(units, batch_size)
            .map(|batch| Task::upload(self.params.clone(), batch))
            .collect()
    }

    // ── Existence check / delete ─────────────────────────────────────────────

    pub fn check_file(&self, remote: &str) -> bool {
        self.check_files(&[remote])
    }

    /// True only if every path exists. Stops at the first missing one.
    pub fn check_files<S: AsRef<str>>(&self, remote_paths: &[S]) -> bool {
        let task = Task::existence_check(self.params.clone(), remote_units(remote_paths));
        task.call(self.connector.as_ref(), &StopSignal::new())
    }

    pub fn delete_file(&self, remote: &str) -> bool {
        self.delete(&[remote])
    }

    /// Recursively delete every path. Paths that do not exist count as deleted.
    pub fn delete<S: AsRef<str>>(&self, remote_paths: &[S]) -> bool {
        let task = Task::delete(self.params.clone(), remote_units(remote_paths));
        task.call(self.connector.as_ref(), &StopSignal::new())
    }

    // ── Orchestration ────────────────────────────────────────────────────────

    fn run_tasks(
        &self,
        tasks: Vec<Task>,
        timeout_secs: i64,
        interrupt: Option<&Interrupt>,
    ) -> Result<bool> {
        if tasks.is_empty() {
            return Ok(true);
        }

        let mut worker = SequentialWorker::spawn(WORKER_THREAD_NAME)?;
        let result = self.submit_and_wait(&mut worker, tasks, timeout_secs, interrupt);
        worker.shutdown_now();
        result
    }

    fn submit_and_wait(
        &self,
        worker: &mut SequentialWorker,
        tasks: Vec<Task>,
        timeout_secs: i64,
        interrupt: Option<&Interrupt>,
    ) -> Result<bool> {
        let files: usize = tasks.iter().map(Task::len).sum();
        let count = tasks.len();

        for task in tasks {
            let connector = Arc::clone(&self.connector);
            worker.submit(move |stop| task.call(connector.as_ref(), stop));
        }
        worker.shutdown();

        let timeout = effective_timeout(timeout_secs, files);
        // None when the deadline is past what Instant can represent
        let deadline = Instant::now().checked_add(Duration::from_secs(timeout));
        log_debug!(
            "Queued {} tasks ({} files), waiting up to {} seconds",
            count,
            files,
            timeout
        );

        let results = worker.results().clone();
        let no_interrupt = never();
        let interrupt_rx = interrupt.map(|i| &i.rx).unwrap_or(&no_interrupt);

        let mut outcomes: Vec<Option<std::result::Result<bool, String>>> = vec![None; count];
        let mut received = 0;
        let mut worker_gone = false;

        while received < count && !worker_gone {
            let expired = match deadline {
                Some(deadline) => after(deadline.saturating_duration_since(Instant::now())),
                None => never(),
            };
            select! {
                recv(results) -> msg => match msg {
                    Ok(JobResult { index, outcome }) => {
                        if let Some(slot) = outcomes.get_mut(index) {
                            *slot = Some(outcome);
                        }
                        received += 1;
                    }
                    // Worker exited; anything missing never ran
                    Err(_) => worker_gone = true,
                },
                recv(interrupt_rx) -> _ => {
                    log_error!("Interrupted while waiting for tasks to finish!");
                    worker.shutdown_now();
                    return Err(TransferError::InterruptedWait);
                },
                recv(expired) -> _ => {
                    let err = TransferError::TransferTimeout {
                        files,
                        timeout_secs: timeout,
                    };
                    log_error!("{}", err);
                    worker.shutdown_now();
                    return Err(err);
                },
            }
        }

        let mut success = true;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(true)) => {}
                Some(Ok(false)) => success = false,
                Some(Err(panic)) => {
                    log_error!("Task {} failed: {}", index, panic);
                    success = false;
                }
                None => {
                    log_error!("Task {} was cancelled before it ran", index);
                    success = false;
                }
            }
        }
        Ok(success)
    }
}

fn remote_units<S: AsRef<str>>(paths: &[S]) -> Vec<TransferUnit> {
    paths
        .iter()
        .map(|p| TransferUnit::remote(p.as_ref()))
        .collect()
}
