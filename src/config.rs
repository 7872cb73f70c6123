//! Connection parameters and their builder.
//!
//! Every field can be set directly or sourced from a named environment
//! variable. Missing or empty variables leave the field untouched.

use crate::error::{Result, TransferError};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the remote host key is verified during session setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Require a matching entry in `~/.ssh/known_hosts`
    #[default]
    KnownHosts,
    /// Accept any host key, including unknown hosts
    TrustAll,
}

/// Immutable description of how to reach a remote endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<Vec<u8>>,
    host_key_policy: HostKeyPolicy,
    connect_timeout: Duration,
}

impl ConnectionParameters {
    pub fn builder() -> ConnectionParametersBuilder {
        ConnectionParametersBuilder::new()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        self.host_key_policy
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host_key_policy", &self.host_key_policy)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Fluent builder for [`ConnectionParameters`].
#[derive(Debug, Clone)]
pub struct ConnectionParametersBuilder {
    host: Option<String>,
    port: u16,
    username: Option<String>,
    password: Option<Vec<u8>>,
    host_key_policy: HostKeyPolicy,
    connect_timeout: Duration,
    // First env-sourced value that failed to parse, reported by `create`
    invalid: Option<String>,
}

impl Default for ConnectionParametersBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Value of the named environment variable, or None when unset or empty.
fn env_value(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl ConnectionParametersBuilder {
    pub fn new() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            username: None,
            password: None,
            host_key_policy: HostKeyPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            invalid: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn host_from_env(mut self, var: &str) -> Self {
        if let Some(value) = env_value(var) {
            self.host = Some(value);
        }
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port_from_env(mut self, var: &str) -> Self {
        if let Some(value) = env_value(var) {
            match value.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => {
                    if self.invalid.is_none() {
                        self.invalid =
                            Some(format!("port from ${} is not a valid port: '{}'", var, value));
                    }
                }
            }
        }
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn username_from_env(mut self, var: &str) -> Self {
        if let Some(value) = env_value(var) {
            self.username = Some(value);
        }
        self
    }

    /// Set the password; the bytes are copied.
    pub fn password(mut self, password: &[u8]) -> Self {
        self.password = Some(password.to_vec());
        self
    }

    pub fn password_from_env(mut self, var: &str) -> Self {
        if let Some(value) = env_value(var) {
            self.password = Some(value.into_bytes());
        }
        self
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Opt in to accepting unknown host keys.
    pub fn trust_unknown_hosts(self) -> Self {
        self.host_key_policy(HostKeyPolicy::TrustAll)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validate and build the parameters.
    pub fn create(self) -> Result<ConnectionParameters> {
        if let Some(reason) = self.invalid {
            return Err(TransferError::InvalidConfiguration(reason));
        }

        let host = match self.host {
            Some(host) if !host.is_empty() => host,
            _ => {
                return Err(TransferError::InvalidConfiguration(
                    "host cannot be blank".to_string(),
                ))
            }
        };

        Ok(ConnectionParameters {
            host,
            port: self.port,
            username: self.username,
            password: self.password,
            host_key_policy: self.host_key_policy,
            connect_timeout: self.connect_timeout,
        })
    }
}

// =============================================================================
// Profile files
// =============================================================================

/// Connection settings read from a TOML profile.
///
/// Each field has a direct form and an `*_env` form naming an environment
/// variable. The env form is applied after the direct one, so a set variable
/// wins.
///
/// ```toml
/// host = "sftp.example.com"
/// port_env = "SFTP_PORT"
/// username = "deploy"
/// password_env = "SFTP_PASSWORD"
/// trust_unknown_hosts = false
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionProfile {
    pub host: Option<String>,
    pub host_env: Option<String>,
    pub port: Option<u16>,
    pub port_env: Option<String>,
    pub username: Option<String>,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
    pub trust_unknown_hosts: bool,
    pub connect_timeout_secs: Option<u64>,
}

impl ConnectionProfile {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| TransferError::InvalidConfiguration(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Apply this profile on top of an existing builder.
    pub fn apply(&self, mut builder: ConnectionParametersBuilder) -> ConnectionParametersBuilder {
        if let Some(ref host) = self.host {
            builder = builder.host(host.clone());
        }
        if let Some(ref var) = self.host_env {
            builder = builder.host_from_env(var);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(ref var) = self.port_env {
            builder = builder.port_from_env(var);
        }
        if let Some(ref username) = self.username {
            builder = builder.username(username.clone());
        }
        if let Some(ref var) = self.username_env {
            builder = builder.username_from_env(var);
        }
        if let Some(ref var) = self.password_env {
            builder = builder.password_from_env(var);
        }
        if self.trust_unknown_hosts {
            builder = builder.trust_unknown_hosts();
        }
        if let Some(secs) = self.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_blank_host_rejected() {
        let err = ConnectionParametersBuilder::new().create().unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfiguration(_)));

        let err = ConnectionParametersBuilder::new().host("").create().unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_defaults() {
        let params = ConnectionParametersBuilder::new()
            .host("example.com")
            .create()
            .unwrap();

        assert_eq!(params.host(), "example.com");
        assert_eq!(params.port(), 22);
        assert_eq!(params.username(), None);
        assert_eq!(params.password(), None);
        assert_eq!(params.host_key_policy(), HostKeyPolicy::KnownHosts);
    }

    #[test]
    fn test_direct_values() {
        let params = ConnectionParameters::builder()
            .host("example.com")
            .port(2222)
            .username("deploy")
            .password(b"hunter2")
            .trust_unknown_hosts()
            .create()
            .unwrap();

        assert_eq!(params.port(), 2222);
        assert_eq!(params.username(), Some("deploy"));
        assert_eq!(params.password(), Some(&b"hunter2"[..]));
        assert_eq!(params.host_key_policy(), HostKeyPolicy::TrustAll);
    }

    #[test]
    fn test_debug_redacts_password() {
        let params = ConnectionParameters::builder()
            .host("example.com")
            .password(b"hunter2")
            .create()
            .unwrap();

        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_env_values() {
        std::env::set_var("SFTP_BATCH_TEST_HOST", "env.example.com");
        std::env::set_var("SFTP_BATCH_TEST_PORT", "2200");
        std::env::set_var("SFTP_BATCH_TEST_USER", "alice");
        std::env::set_var("SFTP_BATCH_TEST_PASS", "s3cret");

        let params = ConnectionParameters::builder()
            .host_from_env("SFTP_BATCH_TEST_HOST")
            .port_from_env("SFTP_BATCH_TEST_PORT")
            .username_from_env("SFTP_BATCH_TEST_USER")
            .password_from_env("SFTP_BATCH_TEST_PASS")
            .create()
            .unwrap();

        assert_eq!(params.host(), "env.example.com");
        assert_eq!(params.port(), 2200);
        assert_eq!(params.username(), Some("alice"));
        assert_eq!(params.password(), Some(&b"s3cret"[..]));

        for var in [
            "SFTP_BATCH_TEST_HOST",
            "SFTP_BATCH_TEST_PORT",
            "SFTP_BATCH_TEST_USER",
            "SFTP_BATCH_TEST_PASS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_missing_or_empty_env_is_ignored() {
        std::env::remove_var("SFTP_BATCH_TEST_MISSING");
        std::env::set_var("SFTP_BATCH_TEST_EMPTY", "");

        let params = ConnectionParameters::builder()
            .host("direct.example.com")
            .host_from_env("SFTP_BATCH_TEST_MISSING")
            .port(2022)
            .port_from_env("SFTP_BATCH_TEST_EMPTY")
            .username("bob")
            .username_from_env("")
            .password(b"pw")
            .password_from_env("SFTP_BATCH_TEST_MISSING")
            .create()
            .unwrap();

        assert_eq!(params.host(), "direct.example.com");
        assert_eq!(params.port(), 2022);
        assert_eq!(params.username(), Some("bob"));
        assert_eq!(params.password(), Some(&b"pw"[..]));

        // Host only from a missing variable is still blank
        let err = ConnectionParameters::builder()
            .host_from_env("SFTP_BATCH_TEST_MISSING")
            .create()
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfiguration(_)));

        std::env::remove_var("SFTP_BATCH_TEST_EMPTY");
    }

    #[test]
    #[serial]
    fn test_unparsable_env_port() {
        std::env::set_var("SFTP_BATCH_TEST_BAD_PORT", "twenty-two");

        let err = ConnectionParameters::builder()
            .host("example.com")
            .port_from_env("SFTP_BATCH_TEST_BAD_PORT")
            .create()
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfiguration(_)));

        std::env::remove_var("SFTP_BATCH_TEST_BAD_PORT");
    }

    #[test]
    #[serial]
    fn test_profile_applies_direct_then_env() {
        std::env::set_var("SFTP_BATCH_TEST_PROFILE_PASS", "from-env");

        let profile = ConnectionProfile::from_toml(
            r#"
            host = "profile.example.com"
            port = 2022
            username = "deploy"
            password_env = "SFTP_BATCH_TEST_PROFILE_PASS"
            trust_unknown_hosts = true
            connect_timeout_secs = 5
            "#,
        )
        .unwrap();

        let params = profile
            .apply(ConnectionParameters::builder())
            .create()
            .unwrap();

        assert_eq!(params.host(), "profile.example.com");
        assert_eq!(params.port(), 2022);
        assert_eq!(params.username(), Some("deploy"));
        assert_eq!(params.password(), Some(&b"from-env"[..]));
        assert_eq!(params.host_key_policy(), HostKeyPolicy::TrustAll);
        assert_eq!(params.connect_timeout(), Duration::from_secs(5));

        std::env::remove_var("SFTP_BATCH_TEST_PROFILE_PASS");
    }

    #[test]
    fn test_profile_rejects_unknown_keys() {
        let err = ConnectionProfile::from_toml("hostname = \"x\"").unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfiguration(_)));
    }
}
