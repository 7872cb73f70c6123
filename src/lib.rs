//! Batch SFTP operations: uploads, existence checks and recursive deletes.
//!
//! ```text
//! SftpClient --partition--> Task, Task, ... --> SequentialWorker (one thread)
//!                                                   |
//!                                   Task::call: open RemoteSession
//!                                               run upload / check / delete
//!                                               tear session down
//! ```
//!
//! Upload batches run strictly one at a time, bounded by a timeout. Each task
//! opens and tears down its own session; connection parameters are shared
//! read-only.

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod remote;
pub mod task;
pub mod worker;

pub use client::{effective_timeout, Interrupt, SftpClient};
pub use config::{ConnectionParameters, ConnectionParametersBuilder, ConnectionProfile, HostKeyPolicy};
pub use error::{RemoteError, RemoteErrorKind, Result, TransferError};
pub use remote::{Connector, MemoryRemote, RemoteChannel};
pub use task::{StopSignal, Task, TaskKind, TransferUnit};
