//! SSH/SFTP backend built on `ssh2`.
//!
//! libssh2's SFTP subsystem has no notion of a working directory, so
//! [`SshChannel`] keeps one itself and resolves every relative path against
//! it, the way an interactive `sftp` client does.

use super::{resolve, Connector, RemoteChannel, RemoteEntry, RemoteResult, RemoteStat};
use crate::config::{ConnectionParameters, HostKeyPolicy};
use crate::error::{RemoteError, RemoteErrorKind, Result, TransferError};
use crate::logging::log_debug;
use ssh2::{CheckResult, ErrorCode, KnownHostFileKind, Session, Sftp};
use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

// libssh2 SFTP status codes
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;

fn remote_error(context: &str, err: ssh2::Error) -> RemoteError {
    let kind = match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE) => RemoteErrorKind::NotFound,
        ErrorCode::SFTP(FX_PERMISSION_DENIED) => RemoteErrorKind::PermissionDenied,
        _ => RemoteErrorKind::Other,
    };
    RemoteError::new(kind, format!("{}: {}", context, err.message()))
}

/// Connects over TCP, authenticates and opens an SFTP channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }

    fn verify_host_key(session: &Session, params: &ConnectionParameters) -> Result<()> {
        let fail = |msg: String| TransferError::connect(params.host(), params.port(), msg);

        match params.host_key_policy() {
            HostKeyPolicy::TrustAll => {
                log_debug!("Skipping host key verification for {}", params.host());
                Ok(())
            }
            HostKeyPolicy::KnownHosts => {
                let (key, _) = session
                    .host_key()
                    .ok_or_else(|| fail("server sent no host key".to_string()))?;

                let path = dirs::home_dir()
                    .map(|h| h.join(".ssh").join("known_hosts"))
                    .ok_or_else(|| fail("cannot locate ~/.ssh/known_hosts".to_string()))?;

                let mut known_hosts = session
                    .known_hosts()
                    .map_err(|e| fail(format!("known_hosts init failed: {}", e)))?;
                known_hosts
                    .read_file(&path, KnownHostFileKind::OpenSSH)
                    .map_err(|e| fail(format!("reading {} failed: {}", path.display(), e)))?;

                match known_hosts.check_port(params.host(), params.port(), key) {
                    CheckResult::Match => Ok(()),
                    CheckResult::Mismatch => Err(fail("host key mismatch".to_string())),
                    CheckResult::NotFound => Err(fail(
                        "host key not in known_hosts (opt in with trust_unknown_hosts)"
                            .to_string(),
                    )),
                    CheckResult::Failure => Err(fail("host key check failed".to_string())),
                }
            }
        }
    }

    fn authenticate(session: &Session, params: &ConnectionParameters) -> Result<()> {
        let fail = |msg: String| TransferError::connect(params.host(), params.port(), msg);

        let username = params
            .username()
            .map(str::to_string)
            .unwrap_or_else(whoami::username);

        match params.password() {
            Some(password) => {
                let password = std::str::from_utf8(password)
                    .map_err(|_| fail("password is not valid UTF-8".to_string()))?;
                session
                    .userauth_password(&username, password)
                    .map_err(|e| fail(format!("password auth failed: {}", e)))?;
            }
            None => {
                session
                    .userauth_agent(&username)
                    .map_err(|e| fail(format!("agent auth failed: {}", e)))?;
            }
        }

        if !session.authenticated() {
            return Err(fail(format!("not authenticated as '{}'", username)));
        }
        Ok(())
    }
}

impl Connector for SshConnector {
    fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn RemoteChannel>> {
        let fail = |msg: String| TransferError::connect(params.host(), params.port(), msg);

        let addr = (params.host(), params.port())
            .to_socket_addrs()
            .map_err(|e| fail(format!("address lookup failed: {}", e)))?
            .next()
            .ok_or_else(|| fail("address lookup returned nothing".to_string()))?;

        log_debug!("Attempting to create SFTP session...");
        let tcp = TcpStream::connect_timeout(&addr, params.connect_timeout())
            .map_err(|e| fail(format!("TCP connection failed: {}", e)))?;

        let mut session =
            Session::new().map_err(|e| fail(format!("session init failed: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| fail(format!("SSH handshake failed: {}", e)))?;

        Self::verify_host_key(&session, params)?;
        Self::authenticate(&session, params)?;
        log_debug!("SFTP session established");

        log_debug!("Attempting to create SFTP channel...");
        let sftp = session
            .sftp()
            .map_err(|e| fail(format!("SFTP channel failed: {}", e)))?;
        let cwd = sftp
            .realpath(Path::new("."))
            .map_err(|e| fail(format!("cannot resolve home directory: {}", e)))?
            .to_string_lossy()
            .into_owned();
        log_debug!("SFTP channel established");

        Ok(Box::new(SshChannel {
            session,
            sftp: Some(sftp),
            cwd,
        }))
    }
}

/// An SFTP channel plus the session that carries it.
pub struct SshChannel {
    session: Session,
    sftp: Option<Sftp>,
    cwd: String,
}

impl SshChannel {
    fn sftp(&self) -> RemoteResult<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| RemoteError::other("SFTP channel is closed"))
    }

    fn abs(&self, path: &str) -> String {
        resolve(&self.cwd, path)
    }
}

impl RemoteChannel for SshChannel {
    fn list(&mut self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let abs = self.abs(path);
        let sftp = self.sftp()?;
        let stat = sftp
            .stat(Path::new(&abs))
            .map_err(|e| remote_error(&format!("ls '{}'", path), e))?;

        if !stat.is_dir() {
            let name = abs.rsplit('/').next().unwrap_or_default().to_string();
            return Ok(vec![RemoteEntry {
                name,
                is_dir: false,
            }]);
        }

        let entries = sftp
            .readdir(Path::new(&abs))
            .map_err(|e| remote_error(&format!("ls '{}'", path), e))?;

        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry {
                    name,
                    is_dir: stat.is_dir(),
                })
            })
            .collect())
    }

    fn stat(&mut self, path: &str) -> RemoteResult<RemoteStat> {
        let abs = self.abs(path);
        let stat = self
            .sftp()?
            .stat(Path::new(&abs))
            .map_err(|e| remote_error(&format!("stat '{}'", path), e))?;
        Ok(RemoteStat {
            is_dir: stat.is_dir(),
        })
    }

    fn change_dir(&mut self, path: &str) -> RemoteResult<()> {
        let abs = self.abs(path);
        let stat = self
            .sftp()?
            .stat(Path::new(&abs))
            .map_err(|e| remote_error(&format!("cd '{}'", path), e))?;
        if !stat.is_dir() {
            return Err(RemoteError::other(format!("cd '{}': not a directory", path)));
        }
        self.cwd = abs;
        Ok(())
    }

    fn current_dir(&mut self) -> RemoteResult<String> {
        Ok(self.cwd.clone())
    }

    fn make_dir(&mut self, path: &str) -> RemoteResult<()> {
        let abs = self.abs(path);
        self.sftp()?
            .mkdir(Path::new(&abs), 0o755)
            .map_err(|e| remote_error(&format!("mkdir '{}'", path), e))
    }

    fn remove_file(&mut self, path: &str) -> RemoteResult<()> {
        let abs = self.abs(path);
        self.sftp()?
            .unlink(Path::new(&abs))
            .map_err(|e| remote_error(&format!("rm '{}'", path), e))
    }

    fn remove_dir(&mut self, path: &str) -> RemoteResult<()> {
        let abs = self.abs(path);
        self.sftp()?
            .rmdir(Path::new(&abs))
            .map_err(|e| remote_error(&format!("rmdir '{}'", path), e))
    }

    fn put(&mut self, local: &Path, remote: &str) -> RemoteResult<()> {
        let abs = self.abs(remote);
        let mut source = File::open(local).map_err(|e| {
            RemoteError::other(format!("put: cannot open '{}': {}", local.display(), e))
        })?;
        let mut target = self
            .sftp()?
            .create(Path::new(&abs))
            .map_err(|e| remote_error(&format!("put '{}'", remote), e))?;

        io::copy(&mut source, &mut target)
            .map_err(|e| RemoteError::other(format!("put '{}': {}", remote, e)))?;
        Ok(())
    }

    fn close(&mut self) -> RemoteResult<()> {
        // Dropping the handle shuts the SFTP subsystem down
        self.sftp.take();
        Ok(())
    }

    fn disconnect(&mut self) -> RemoteResult<()> {
        self.session
            .disconnect(None, "closing", None)
            .map_err(|e| remote_error("disconnect", e))
    }
}
