//! Mailbox backends.
//!
//! Both backends answer the same [`RequestKind`](crate::RequestKind)
//! vocabulary; [`Backend`] picks one from an account configuration.

mod cache;
mod imap;
mod mbox;

pub use cache::FolderCache;
pub use imap::ImapBackend;
pub use mbox::MboxBackend;

use crate::Result;
use crate::config::{AccountConfig, BackendConfig};
use crate::request::{Indices, Request};
use crate::servent::{RequestHandler, Responder};

/// Messages per FETCH, and per progress report.
pub const BATCH: usize = 50;

/// Either backend, chosen at runtime.
#[derive(Debug)]
pub enum Backend {
    /// Remote IMAP server.
    Imap(ImapBackend),
    /// Local mbox tree.
    Mbox(MboxBackend),
}

impl Backend {
    /// Builds the backend an account describes.
    #[must_use]
    pub fn from_config(config: &AccountConfig) -> Self {
        match &config.backend {
            BackendConfig::Imap(account) => Self::Imap(ImapBackend::new(account.clone())),
            BackendConfig::Mbox(account) => Self::Mbox(MboxBackend::new(&account.root)),
        }
    }

    /// The folder cache, for local backends.
    #[must_use]
    pub fn cache(&self) -> Option<FolderCache> {
        match self {
            Self::Imap(_) => None,
            Self::Mbox(backend) => Some(backend.cache()),
        }
    }
}

impl RequestHandler for Backend {
    async fn handle(&mut self, request: Request, responses: &Responder) -> Result<()> {
        match self {
            Self::Imap(backend) => backend.handle(request, responses).await,
            Self::Mbox(backend) => backend.handle(request, responses).await,
        }
    }
}

/// Requested indices below `len`, or every index when none were given.
pub(crate) fn targets(indices: &Indices, len: usize) -> Vec<usize> {
    if indices.is_empty() {
        (0..len).collect()
    } else {
        indices.iter().copied().filter(|&i| i < len).collect()
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
    fn test_targets() {
        assert_eq!(targets(&Indices::new(), 3), [0, 1, 2]);
        assert_eq!(targets(&Indices::from([4, 1, 9]), 5), [1, 4]);
        assert!(targets(&Indices::new(), 0).is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = AccountConfig::from_json(
            r#"{ "name": "local", "backend": { "type": "mbox", "root": "/tmp/mail" } }"#,
        )
        .unwrap();
        let backend = Backend::from_config(&config);
        assert!(matches!(backend, Backend::Mbox(_)));
        assert!(backend.cache().is_some());

        let config = AccountConfig::from_json(
            r#"{ "name": "work", "backend": { "type": "imap", "host": "h", "username": "u" } }"#,
        )
        .unwrap();
        assert!(Backend::from_config(&config).cache().is_none());
    }
}
