//! Account configuration.
//!
//! One JSON file describes one account:
//!
//! ```json
//! { "name": "work",
//!   "backend": { "type": "imap", "host": "imap.example.com", "security": "Tls",
//!                "username": "me@example.com", "password": "secret" } }
//! ```
//!
//! or `{ "name": "local", "backend": { "type": "mbox", "root": "/home/me/Mail" } }`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
}

impl From<Security> for mailsync_imap::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::Tls => Self::Implicit,
        }
    }
}

/// IMAP server account.
#[derive(Clone, Serialize, Deserialize)]
pub struct ImapAccount {
    /// Server hostname.
    pub host: String,
    /// Server port; defaults to the port for `security`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Username for authentication.
    pub username: String,
    /// Password; may instead be supplied at runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// How long `CheckRecent` waits in IDLE.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

const fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

impl ImapAccount {
    /// Creates an account with default port, TLS and no password.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::default(),
            username: username.into(),
            password: None,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }

    /// Effective port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or_else(|| mailsync_imap::Security::from(self.security).default_port())
    }

    /// IDLE wait for `CheckRecent`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Connection settings for one session with `password`.
    #[must_use]
    pub fn connection(&self, password: &str) -> mailsync_imap::Config {
        mailsync_imap::Config::builder(&self.host)
            .port(self.port())
            .security(self.security.into())
            .credentials(&self.username, password)
            .build()
    }
}

impl fmt::Debug for ImapAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapAccount")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .finish()
    }
}

/// Local mbox tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MboxAccount {
    /// Directory holding mbox files; subdirectories are parent folders.
    pub root: PathBuf,
}

/// Which backend serves the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Remote IMAP server.
    Imap(ImapAccount),
    /// Local mbox files.
    Mbox(MboxAccount),
}

/// A configured account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Display name.
    pub name: String,
    /// Backend settings.
    pub backend: BackendConfig,
}

impl AccountConfig {
    /// Reads and validates a JSON account file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), account = %config.name, "loaded account");
        Ok(config)
    }

    /// Parses and validates JSON account text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config_dir>/mailsync/account.json`, if the platform has a config dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mailsync").join("account.json"))
    }

    /// Checks required fields.
    pub fn validate(&self) -> Result<()> {
        match &self.backend {
            BackendConfig::Imap(imap) => {
                if imap.host.trim().is_empty() {
                    return Err(Error::Config("IMAP host is required".to_string()));
                }
                if imap.username.trim().is_empty() {
                    return Err(Error::Config("IMAP username is required".to_string()));
                }
                if imap.port == Some(0) {
                    return Err(Error::Config("IMAP port must not be 0".to_string()));
                }
            }
            BackendConfig::Mbox(mbox) => {
                if mbox.root.as_os_str().is_empty() {
                    return Err(Error::Config("mbox root is required".to_string()));
                }
            }
        }
        Ok(())
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
    fn test_imap_defaults() {
        let config = AccountConfig::from_json(
            r#"{ "name": "work",
                 "backend": { "type": "imap", "host": "imap.example.com", "username": "me" } }"#,
        )
        .unwrap();
        let BackendConfig::Imap(imap) = config.backend else {
            panic!("expected imap backend");
        };
        assert_eq!(imap.security, Security::Tls);
        assert_eq!(imap.port(), 993);
        assert_eq!(imap.idle_timeout(), Duration::from_secs(30));
        assert!(imap.password.is_none());
    }

    #[test]
    fn test_imap_connection() {
        let mut imap = ImapAccount::new("localhost", "me");
        imap.security = Security::None;
        imap.password = Some("hunter2".to_string());
        let connection = imap.connection("hunter2");
        assert_eq!(connection.port, 143);
        assert_eq!(connection.security, mailsync_imap::Security::None);
        assert_eq!(connection.credentials.unwrap().password, "hunter2");
        assert!(!format!("{imap:?}").contains("hunter2"));
    }

    #[test]
    fn test_mbox() {
        let config =
            AccountConfig::from_json(r#"{ "name": "local", "backend": { "type": "mbox", "root": "/tmp/mail" } }"#)
                .unwrap();
        assert!(matches!(
            config.backend,
            BackendConfig::Mbox(MboxAccount { ref root }) if root == Path::new("/tmp/mail")
        ));
    }

    #[test]
    fn test_invalid() {
        let missing_host = r#"{ "name": "x", "backend": { "type": "imap", "host": " ", "username": "me" } }"#;
        assert!(matches!(
            AccountConfig::from_json(missing_host),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            AccountConfig::from_json(r#"{ "name": "x", "backend": { "type": "pop3" } }"#),
            Err(Error::Serde(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AccountConfig::load("/nonexistent/mailsync.json").unwrap_err();
        assert!(matches!(err, Error::File { .. }));
    }

    #[test]
    fn test_default_path() {
        if let Some(path) = AccountConfig::default_path() {
            assert!(path.ends_with("mailsync/account.json"));
        }
    }
}
