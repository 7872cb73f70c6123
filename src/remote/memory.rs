//! In-memory remote filesystem.
//!
//! Behaves like a small SFTP server: a directory tree rooted at `/`, a home
//! directory as the initial working directory, and `mkdir`/`put` requiring
//! an existing parent. Every call is recorded in a shared journal and any
//! operation can be made to fail, which is what the task tests lean on.

use super::{parent_dir, resolve, Connector, RemoteChannel, RemoteEntry, RemoteResult, RemoteStat};
use crate::config::ConnectionParameters;
use crate::error::{RemoteError, RemoteErrorKind, Result, TransferError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Home directory of a fresh [`MemoryRemote`]
pub const DEFAULT_HOME: &str = "/home/user";

/// Operation kinds, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    List,
    Stat,
    ChangeDir,
    CurrentDir,
    MakeDir,
    RemoveFile,
    RemoveDir,
    Put,
    Close,
    Disconnect,
}

/// A journal entry. Paths are recorded exactly as the caller passed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    List(String),
    Stat(String),
    ChangeDir(String),
    CurrentDir,
    MakeDir(String),
    RemoveFile(String),
    RemoveDir(String),
    Put { local: String, remote: String },
    Close,
    Disconnect,
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::Connect => Op::Connect,
            Call::List(_) => Op::List,
            Call::Stat(_) => Op::Stat,
            Call::ChangeDir(_) => Op::ChangeDir,
            Call::CurrentDir => Op::CurrentDir,
            Call::MakeDir(_) => Op::MakeDir,
            Call::RemoveFile(_) => Op::RemoveFile,
            Call::RemoveDir(_) => Op::RemoveDir,
            Call::Put { .. } => Op::Put,
            Call::Close => Op::Close,
            Call::Disconnect => Op::Disconnect,
        }
    }
}

#[derive(Debug)]
struct State {
    home: String,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    calls: Vec<Call>,
    // (op, path); a None path fails every call of that kind
    failures: Vec<(Op, Option<String>)>,
    put_latency: Option<Duration>,
    open_sessions: usize,
    max_open_sessions: usize,
}

impl State {
    fn should_fail(&self, op: Op, given: &str, resolved: &str) -> bool {
        self.failures.iter().any(|(o, path)| {
            *o == op
                && match path {
                    None => true,
                    Some(p) => p == given || p == resolved,
                }
        })
    }

    fn mkdir_all(&mut self, abs: &str) {
        let mut current = String::new();
        self.dirs.insert("/".to_string());
        for part in abs.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            self.dirs.insert(current.clone());
        }
    }

    fn children(&self, dir: &str) -> Vec<RemoteEntry> {
        let is_child = |p: &String| p != "/" && parent_dir(p) == Some(dir);
        let name = |p: &String| p.rsplit('/').next().unwrap_or_default().to_string();

        let mut entries: Vec<RemoteEntry> = self
            .dirs
            .iter()
            .filter(|p| is_child(p))
            .map(|p| RemoteEntry {
                name: name(p),
                is_dir: true,
            })
            .chain(self.files.keys().filter(|p| is_child(p)).map(|p| RemoteEntry {
                name: name(p),
                is_dir: false,
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

/// Shared handle to an in-memory remote tree. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_home(DEFAULT_HOME)
    }

    pub fn with_home(home: &str) -> Self {
        let home = resolve("/", home);
        let mut state = State {
            home: home.clone(),
            dirs: BTreeSet::new(),
            files: BTreeMap::new(),
            calls: Vec::new(),
            failures: Vec::new(),
            put_latency: None,
            open_sessions: 0,
            max_open_sessions: 0,
        };
        state.mkdir_all(&home);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn abs(&self, path: &str) -> String {
        let home = self.state().home.clone();
        resolve(&home, path)
    }

    pub fn home(&self) -> String {
        self.state().home.clone()
    }

    /// Create a directory and its parents. Relative paths start at home.
    pub fn add_dir(&self, path: &str) -> &Self {
        let abs = self.abs(path);
        self.state().mkdir_all(&abs);
        self
    }

    /// Create a file (and its parent directories).
    pub fn add_file(&self, path: &str, contents: &[u8]) -> &Self {
        let abs = self.abs(path);
        let mut state = self.state();
        if let Some(parent) = parent_dir(&abs) {
            state.mkdir_all(parent);
        }
        state.files.insert(abs, contents.to_vec());
        self
    }

    pub fn exists(&self, path: &str) -> bool {
        let abs = self.abs(path);
        let state = self.state();
        state.dirs.contains(&abs) || state.files.contains_key(&abs)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let abs = self.abs(path);
        self.state().dirs.contains(&abs)
    }

    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        let abs = self.abs(path);
        self.state().files.get(&abs).cloned()
    }

    /// Snapshot of the call journal.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Fail `op` whenever it targets `path` (as given or resolved).
    pub fn fail_on(&self, op: Op, path: &str) {
        self.state().failures.push((op, Some(path.to_string())));
    }

    /// Fail every call of kind `op`.
    pub fn fail_all(&self, op: Op) {
        self.state().failures.push((op, None));
    }

    /// Delay every `put` by `latency`.
    pub fn set_put_latency(&self, latency: Duration) {
        self.state().put_latency = Some(latency);
    }

    pub fn open_sessions(&self) -> usize {
        self.state().open_sessions
    }

    /// Highest number of simultaneously open sessions seen so far.
    pub fn max_open_sessions(&self) -> usize {
        self.state().max_open_sessions
    }
}

impl Connector for MemoryRemote {
    fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn RemoteChannel>> {
        let mut state = self.state();
        state.calls.push(Call::Connect);

        if state.should_fail(Op::Connect, params.host(), params.host()) {
            return Err(TransferError::connect(
                params.host(),
                params.port(),
                "connection refused",
            ));
        }

        state.open_sessions += 1;
        state.max_open_sessions = state.max_open_sessions.max(state.open_sessions);

        Ok(Box::new(MemoryChannel {
            remote: self.clone(),
            cwd: state.home.clone(),
            connected: true,
        }))
    }
}

/// A channel onto a [`MemoryRemote`], with its own working directory.
#[derive(Debug)]
pub struct MemoryChannel {
    remote: MemoryRemote,
    cwd: String,
    connected: bool,
}

impl MemoryChannel {
    /// Record the call and apply failure injection; returns the resolved path.
    fn begin(&self, call: Call, path: &str) -> RemoteResult<(String, MutexGuard<'_, State>)> {
        let op = call.op();
        let resolved = resolve(&self.cwd, path);
        let mut state = self.remote.state();
        state.calls.push(call);
        if state.should_fail(op, path, &resolved) {
            return Err(RemoteError::other(format!("{:?} '{}' failed", op, path)));
        }
        Ok((resolved, state))
    }
}

impl RemoteChannel for MemoryChannel {
    fn list(&mut self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let (abs, state) = self.begin(Call::List(path.to_string()), path)?;
        if state.dirs.contains(&abs) {
            return Ok(state.children(&abs));
        }
        if state.files.contains_key(&abs) {
            let name = abs.rsplit('/').next().unwrap_or_default().to_string();
            return Ok(vec![RemoteEntry {
                name,
                is_dir: false,
            }]);
        }
        Err(RemoteError::not_found(path))
    }

    fn stat(&mut self, path: &str) -> RemoteResult<RemoteStat> {
        let (abs, state) = self.begin(Call::Stat(path.to_string()), path)?;
        if state.dirs.contains(&abs) {
            return Ok(RemoteStat { is_dir: true });
        }
        if state.files.contains_key(&abs) {
            return Ok(RemoteStat { is_dir: false });
        }
        Err(RemoteError::not_found(path))
    }

    fn change_dir(&mut self, path: &str) -> RemoteResult<()> {
        let (abs, state) = self.begin(Call::ChangeDir(path.to_string()), path)?;
        if state.dirs.contains(&abs) {
            drop(state);
            self.cwd = abs;
            return Ok(());
        }
        if state.files.contains_key(&abs) {
            return Err(RemoteError::other(format!("Not a directory: '{}'", path)));
        }
        Err(RemoteError::not_found(path))
    }

    fn current_dir(&mut self) -> RemoteResult<String> {
        let cwd = self.cwd.clone();
        let (_, _state) = self.begin(Call::CurrentDir, &cwd)?;
        Ok(cwd)
    }

    fn make_dir(&mut self, path: &str) -> RemoteResult<()> {
        let (abs, mut state) = self.begin(Call::MakeDir(path.to_string()), path)?;
        if state.dirs.contains(&abs) || state.files.contains_key(&abs) {
            return Err(RemoteError::other(format!("Already exists: '{}'", path)));
        }
        match parent_dir(&abs) {
            Some(parent) if state.dirs.contains(parent) => {
                state.dirs.insert(abs);
                Ok(())
            }
            _ => Err(RemoteError::not_found(path)),
        }
    }

    fn remove_file(&mut self, path: &str) -> RemoteResult<()> {
        let (abs, mut state) = self.begin(Call::RemoveFile(path.to_string()), path)?;
        if state.dirs.contains(&abs) {
            return Err(RemoteError::other(format!("Is a directory: '{}'", path)));
        }
        match state.files.remove(&abs) {
            Some(_) => Ok(()),
            None => Err(RemoteError::not_found(path)),
        }
    }

    fn remove_dir(&mut self, path: &str) -> RemoteResult<()> {
        let cwd = self.cwd.clone();
        let (abs, mut state) = self.begin(Call::RemoveDir(path.to_string()), path)?;
        if !state.dirs.contains(&abs) {
            return Err(RemoteError::not_found(path));
        }
        if abs == cwd {
            return Err(RemoteError::other(format!(
                "Directory is the working directory: '{}'",
                path
            )));
        }
        if !state.children(&abs).is_empty() {
            return Err(RemoteError::other(format!("Directory not empty: '{}'", path)));
        }
        state.dirs.remove(&abs);
        Ok(())
    }

    fn put(&mut self, local: &Path, remote: &str) -> RemoteResult<()> {
        let latency = self.remote.state().put_latency;
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }

        let call = Call::Put {
            local: local.to_string_lossy().into_owned(),
            remote: remote.to_string(),
        };
        let (abs, mut state) = self.begin(call, remote)?;
        let data = std::fs::read(local).map_err(|e| {
            RemoteError::other(format!("Failed to read '{}': {}", local.display(), e))
        })?;

        match parent_dir(&abs) {
            Some(parent) if state.dirs.contains(parent) => {
                state.files.insert(abs, data);
                Ok(())
            }
            _ => Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("No such directory for '{}'", remote),
            )),
        }
    }

    fn close(&mut self) -> RemoteResult<()> {
        let cwd = self.cwd.clone();
        let (_, _state) = self.begin(Call::Close, &cwd)?;
        Ok(())
    }

    fn disconnect(&mut self) -> RemoteResult<()> {
        let cwd = self.cwd.clone();
        let was_connected = std::mem::replace(&mut self.connected, false);
        let (_, mut state) = self.begin(Call::Disconnect, &cwd)?;
        if was_connected {
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
        Ok(())
    }
}
