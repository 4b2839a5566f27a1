//! Connection settings.

use std::fmt;
use std::time::Duration;

/// Transport security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain TCP.
    None,
    /// TLS from the first byte.
    #[default]
    Implicit,
}

impl Security {
    /// Well-known port for the mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 143,
            Self::Implicit => 993,
        }
    }
}

/// LOGIN user name and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Pairs a user name with a password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security.
    pub security: Security,
    /// Limit on one TCP/TLS connect attempt.
    pub connect_timeout: Duration,
    /// Limit on waiting for any single server response.
    pub io_timeout: Duration,
    /// Connect attempts before giving up on transient failures.
    pub connect_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n` times this.
    pub retry_delay: Duration,
    /// Session-default LOGIN credentials.
    pub credentials: Option<Credentials>,
}

impl Config {
    /// Implicit TLS on port 993 with default limits.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    io_timeout: Duration,
    connect_attempts: u32,
    retry_delay: Duration,
    credentials: Option<Credentials>,
}

impl ConfigBuilder {
    /// Defaults: implicit TLS, 30 s connect, 60 s I/O, 5 attempts.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            connect_attempts: 5,
            retry_delay: Duration::from_millis(500),
            credentials: None,
        }
    }

    /// Overrides the port implied by the security mode.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the response timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the number of connect attempts (at least one is always made).
    #[must_use]
    pub const fn connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets session-default credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            host: self.host,
            security: self.security,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            connect_attempts: self.connect_attempts.max(1),
            retry_delay: self.retry_delay,
            credentials: self.credentials,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_port_follows_security() {
        assert_eq!(Config::new("imap.example.com").port, 993);
        let plain = Config::builder("localhost").security(Security::None).build();
        assert_eq!(plain.port, 143);
        let custom = Config::builder("localhost")
            .security(Security::None)
            .port(1143)
            .build();
        assert_eq!(custom.port, 1143);
    }

    #[test]
    fn test_attempts_floor() {
        let config = Config::builder("h").connect_attempts(0).build();
        assert_eq!(config.connect_attempts, 1);
        assert_eq!(Config::new("h").connect_attempts, 5);
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let config = Config::builder("h").credentials("me", "hunter2").build();
        let shown = format!("{config:?}");
        assert!(shown.contains("me"));
        assert!(!shown.contains("hunter2"));
    }
}
