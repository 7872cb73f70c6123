//! Units of work and the shared session lifecycle.
//!
//! A [`Task`] binds connection parameters to a batch of [`TransferUnit`]s.
//! [`Task::call`] is the single driver for every kind of task:
//!
//! ```text
//! Created -> SessionEstablished -> WorkExecuting -> Success | Failed -> SessionTornDown
//! ```
//!
//! The session is a guard ([`RemoteSession`]) so teardown happens exactly once
//! on every path out of `call`, unwinding included.

mod delete;
mod exists;
mod upload;

use crate::config::ConnectionParameters;
use crate::error::{Result, TransferError};
use crate::logging::{log_debug, log_error};
use crate::remote::{Connector, RemoteChannel};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// A source path paired with a destination path.
///
/// Remote-only operations (existence check, delete) carry the same path in
/// both slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferUnit {
    source: String,
    destination: String,
}

impl TransferUnit {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// A unit for a single remote path.
    pub fn remote(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            destination: path,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl<S: Into<String>, D: Into<String>> From<(S, D)> for TransferUnit {
    fn from((source, destination): (S, D)) -> Self {
        Self::new(source, destination)
    }
}

/// Cooperative stop flag shared between a worker and the task it runs.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }

    /// Err(Cancelled) once the signal has been raised.
    pub fn check(&self) -> Result<()> {
        if self.is_stopped() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a task does with its units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Upload,
    ExistenceCheck,
    Delete,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Upload => write!(f, "upload"),
            TaskKind::ExistenceCheck => write!(f, "existence check"),
            TaskKind::Delete => write!(f, "delete"),
        }
    }
}

// =============================================================================
// RemoteSession
// =============================================================================

/// One authenticated connection plus its protocol channel, owned by a single
/// task invocation. Dropping it closes the channel and then disconnects.
pub struct RemoteSession {
    channel: Box<dyn RemoteChannel>,
    torn_down: bool,
}

impl RemoteSession {
    pub fn open(connector: &dyn Connector, params: &ConnectionParameters) -> Result<Self> {
        let channel = connector.connect(params)?;
        Ok(Self {
            channel,
            torn_down: false,
        })
    }

    pub fn channel(&mut self) -> &mut dyn RemoteChannel {
        self.channel.as_mut()
    }

    /// Best-effort teardown; runs at most once.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.channel.close() {
            log_debug!("Ignoring error while closing channel: {}", e);
        }
        if let Err(e) = self.channel.disconnect() {
            log_debug!("Ignoring error while disconnecting: {}", e);
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

// =============================================================================
// Task
// =============================================================================

/// A batch of units bound to connection parameters.
#[derive(Debug, Clone)]
pub struct Task {
    kind: TaskKind,
    params: Arc<ConnectionParameters>,
    units: Vec<TransferUnit>,
}

impl Task {
    pub fn new(kind: TaskKind, params: Arc<ConnectionParameters>, units: Vec<TransferUnit>) -> Self {
        Self {
            kind,
            params,
            units,
        }
    }

    pub fn upload(params: Arc<ConnectionParameters>, units: Vec<TransferUnit>) -> Self {
        Self::new(TaskKind::Upload, params, units)
    }

    pub fn existence_check(params: Arc<ConnectionParameters>, units: Vec<TransferUnit>) -> Self {
        Self::new(TaskKind::ExistenceCheck, params, units)
    }

    pub fn delete(params: Arc<ConnectionParameters>, units: Vec<TransferUnit>) -> Self {
        Self::new(TaskKind::Delete, params, units)
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn units(&self) -> &[TransferUnit] {
        &self.units
    }

    /// Number of units; the workload used for ordering.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Compare by workload (unit count) only; kind and paths are ignored.
    pub fn cmp_workload(&self, other: &Self) -> Ordering {
        self.len().cmp(&other.len())
    }

    /// Run the task: open a session, do the work, tear the session down.
    ///
    /// Setup failures and work errors are logged and reported as `false`.
    pub fn call(&self, connector: &dyn Connector, stop: &StopSignal) -> bool {
        let mut session = match RemoteSession::open(connector, &self.params) {
            Ok(session) => session,
            Err(e) => {
                log_error!("{}", e);
                return false;
            }
        };

        match self.work(session.channel(), stop) {
            Ok(success) => success,
            Err(e) => {
                log_error!("{} task failed: {}", self.kind, e);
                false
            }
        }
    }

    fn work(&self, channel: &mut dyn RemoteChannel, stop: &StopSignal) -> Result<bool> {
        match self.kind {
            TaskKind::Upload => upload::run(channel, &self.units, stop),
            TaskKind::ExistenceCheck => exists::run(channel, &self.units, stop),
            TaskKind::Delete => delete::run(channel, &self.units, stop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Call, MemoryRemote, Op};

    fn params() -> Arc<ConnectionParameters> {
        Arc::new(
            ConnectionParameters::builder()
                .host("memory")
                .create()
                .unwrap(),
        )
    }

    fn units(paths: &[&str]) -> Vec<TransferUnit> {
        paths.iter().map(|p| TransferUnit::remote(*p)).collect()
    }

    #[test]
    fn test_transfer_unit_constructors() {
        let unit = TransferUnit::remote("a/b");
        assert_eq!(unit.source(), "a/b");
        assert_eq!(unit.destination(), "a/b");

        let unit: TransferUnit = ("local.txt", "remote/local.txt").into();
        assert_eq!(unit.source(), "local.txt");
        assert_eq!(unit.destination(), "remote/local.txt");
    }

    #[test]
    fn test_workload_ordering() {
        let small = Task::upload(params(), units(&["a"]));
        let large = Task::upload(params(), units(&["a", "b", "c"]));
        let same = Task::delete(params(), units(&["x"]));

        assert_eq!(small.cmp_workload(&large), Ordering::Less);
        assert_eq!(large.cmp_workload(&small), Ordering::Greater);
        assert_eq!(small.cmp_workload(&same), Ordering::Equal);

        let mut tasks = vec![large.clone(), small.clone(), same];
        tasks.sort_by(Task::cmp_workload);
        let lens: Vec<usize> = tasks.iter().map(Task::len).collect();
        assert_eq!(lens, vec![1, 1, 3]);
    }

    #[test]
    fn test_session_torn_down_once_on_success() {
        let remote = MemoryRemote::new();
        remote.add_file("a", b"a");

        let task = Task::existence_check(params(), units(&["a"]));
        assert!(task.call(&remote, &StopSignal::new()));

        let calls = remote.calls();
        assert_eq!(calls.first(), Some(&Call::Connect));
        assert_eq!(&calls[calls.len() - 2..], &[Call::Close, Call::Disconnect]);
        assert_eq!(remote.open_sessions(), 0);
    }

    #[test]
    fn test_session_torn_down_on_work_error() {
        let remote = MemoryRemote::new();
        remote.add_file("a", b"a");
        remote.fail_on(Op::List, "a");

        let task = Task::existence_check(params(), units(&["a"]));
        assert!(!task.call(&remote, &StopSignal::new()));

        let closes = remote.calls().iter().filter(|c| **c == Call::Close).count();
        let disconnects = remote
            .calls()
            .iter()
            .filter(|c| **c == Call::Disconnect)
            .count();
        assert_eq!(closes, 1);
        assert_eq!(disconnects, 1);
        assert_eq!(remote.open_sessions(), 0);
    }

    #[test]
    fn test_connect_failure_reports_false() {
        let remote = MemoryRemote::new();
        remote.fail_all(Op::Connect);

        let task = Task::delete(params(), units(&["a"]));
        assert!(!task.call(&remote, &StopSignal::new()));
        assert_eq!(remote.calls(), vec![Call::Connect]);
    }

    #[test]
    fn test_teardown_errors_are_swallowed() {
        let remote = MemoryRemote::new();
        remote.fail_all(Op::Close);
        remote.fail_all(Op::Disconnect);

        let task = Task::delete(params(), units(&["missing"]));
        assert!(task.call(&remote, &StopSignal::new()));
    }

    #[test]
    fn test_stopped_task_fails() {
        let remote = MemoryRemote::new();
        remote.add_file("a", b"a");

        let stop = StopSignal::new();
        stop.stop();
        assert!(stop.check().is_err());

        let task = Task::delete(params(), units(&["a"]));
        assert!(!task.call(&remote, &stop));
        assert!(remote.exists("a"));
        assert_eq!(remote.open_sessions(), 0);
    }
}
