//! Remote filesystem seam.
//!
//! Tasks only talk to the remote side through [`RemoteChannel`], obtained
//! from a [`Connector`]. The SSH backend lives in [`ssh`]; [`memory`] keeps
//! an in-process tree for tests and dry runs.

pub mod memory;
#[cfg(feature = "ssh")]
pub mod ssh;

pub use memory::{Call, MemoryChannel, MemoryRemote, Op};
#[cfg(feature = "ssh")]
pub use ssh::{SshChannel, SshConnector};

use crate::config::ConnectionParameters;
use crate::error::{RemoteError, Result};
use std::path::Path;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File name without any directory component
    pub name: String,
    pub is_dir: bool,
}

/// Subset of remote file attributes the tasks care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub is_dir: bool,
}

/// An open protocol channel on an authenticated connection.
///
/// Relative paths are resolved against the channel's working directory.
pub trait RemoteChannel: Send {
    /// List a path. A directory yields its entries, a file yields itself.
    fn list(&mut self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    fn stat(&mut self, path: &str) -> RemoteResult<RemoteStat>;

    fn change_dir(&mut self, path: &str) -> RemoteResult<()>;

    /// Absolute path of the working directory.
    fn current_dir(&mut self) -> RemoteResult<String>;

    fn make_dir(&mut self, path: &str) -> RemoteResult<()>;

    fn remove_file(&mut self, path: &str) -> RemoteResult<()>;

    fn remove_dir(&mut self, path: &str) -> RemoteResult<()>;

    /// Copy a local file to `remote`, replacing any existing file.
    fn put(&mut self, local: &Path, remote: &str) -> RemoteResult<()>;

    /// Close the protocol channel.
    fn close(&mut self) -> RemoteResult<()>;

    /// Disconnect the underlying connection.
    fn disconnect(&mut self) -> RemoteResult<()>;
}

/// Opens authenticated channels from connection parameters.
pub trait Connector: Send + Sync {
    fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn RemoteChannel>>;
}

// =============================================================================
// Path helpers (remote paths are always '/'-separated)
// =============================================================================

/// Directory part of `path`, truncated at the last separator.
///
/// Returns None when `path` has no separator.
pub fn parent_dir(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Resolve `path` against the absolute directory `cwd`, folding `.` and `..`.
pub fn resolve(cwd: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", cwd, path)
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("remote/a.jpg"), Some("remote"));
        assert_eq!(parent_dir("a/b/c.txt"), Some("a/b"));
        assert_eq!(parent_dir("/a.jpg"), Some("/"));
        assert_eq!(parent_dir("/home/user/dir"), Some("/home/user"));
        assert_eq!(parent_dir("a.jpg"), None);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("/home/user", "dir/"), "/home/user/dir");
        assert_eq!(resolve("/home/user", "/tmp/x"), "/tmp/x");
        assert_eq!(resolve("/home/user", ".."), "/home");
        assert_eq!(resolve("/home/user", "./a/../b"), "/home/user/b");
        assert_eq!(resolve("/", ".."), "/");
    }
}
