//! IMAP backend.
//!
//! Every request opens its own session: connect, LOGIN, the operation,
//! LOGOUT. Nothing survives between requests except the password and the
//! server's hierarchy delimiter.

use std::fmt;

use mailsync_imap::{Client, FetchMode, ImapStream, SequenceSet, SessionState, StoreOp};
use mailsync_mime::Email;
use tracing::{debug, info};

use super::{BATCH, targets};
use crate::config::ImapAccount;
use crate::folder::{FolderAttributes, FolderPath, SEPARATOR};
use crate::request::{Indices, Request, RequestKind};
use crate::response::Response;
use crate::servent::{RequestHandler, Responder};
use crate::{Error, Result};

type Session = Client<ImapStream>;

/// Serves requests from an IMAP server.
pub struct ImapBackend {
    account: ImapAccount,
    password: Option<String>,
    delimiter: char,
}

impl fmt::Debug for ImapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapBackend")
            .field("account", &self.account)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

impl ImapBackend {
    /// Creates a backend. The account's password, if any, is the initial
    /// session password.
    #[must_use]
    pub fn new(account: ImapAccount) -> Self {
        let password = account.password.clone();
        Self {
            account,
            password,
            delimiter: SEPARATOR,
        }
    }

    /// The configured account.
    #[must_use]
    pub const fn account(&self) -> &ImapAccount {
        &self.account
    }

    /// Connects and logs in.
    async fn session(&self) -> Result<Session> {
        let password = self.password.as_deref().ok_or_else(|| {
            Error::Config(format!("no password set for {}", self.account.username))
        })?;
        let mut client = Client::connect(&self.account.connection(password)).await?;
        if client.state() == SessionState::NonAuthenticated {
            client.login(None).await?;
        }
        Ok(client)
    }

    fn mailbox(&self, path: &FolderPath) -> String {
        path.join(self.delimiter)
    }

    async fn dispatch(
        &mut self,
        client: &mut Session,
        kind: RequestKind,
        responses: &Responder,
    ) -> Result<()> {
        match kind {
            RequestKind::Initialize => {
                info!(
                    host = %self.account.host,
                    capabilities = ?client.capabilities(),
                    "logged in"
                );
                responses.send(Response::Initialized);
            }
            RequestKind::SetPassword { .. } => {
                return Err(Error::InvalidState(
                    "password changes do not need a session".to_string(),
                ));
            }
            RequestKind::ListFolders => self.list_folders(client, responses).await?,
            RequestKind::CreateFolder { path } => {
                client.create(&self.mailbox(&path)).await?;
                responses.send(Response::FolderCreated { path });
            }
            RequestKind::DeleteFolder { path } => {
                client.delete(&self.mailbox(&path)).await?;
                responses.send(Response::FolderDeleted { path });
            }
            RequestKind::RenameFolder { from, to } => {
                client
                    .rename(&self.mailbox(&from), &self.mailbox(&to))
                    .await?;
                responses.send(Response::FolderRenamed { from, to });
            }
            RequestKind::ExpungeFolder { path } => {
                client.select(&self.mailbox(&path)).await?;
                let removed = client.expunge().await?;
                client.close().await?;
                info!(folder = %path, removed = removed.len(), "expunged folder");
                responses.send(Response::status(format!(
                    "Removed {} messages from {path}",
                    removed.len()
                )));
                responses.send(Response::FolderExpunged { path });
            }
            RequestKind::CheckRecent { path } => {
                self.check_recent(client, path, responses).await?;
            }
            RequestKind::ListMessages { path, indices } => {
                let status = client.select(&self.mailbox(&path)).await?;
                let wanted = targets(&indices, status.exists as usize);
                fetch_batches(client, &path, &wanted, FetchMode::Headers, responses).await?;
            }
            RequestKind::LoadMessages { path, indices } => {
                let status = client.select(&self.mailbox(&path)).await?;
                let wanted = targets(&indices, status.exists as usize);
                fetch_batches(client, &path, &wanted, FetchMode::Full, responses).await?;
            }
            RequestKind::CopyMessages { from, to, indices } => {
                let status = client.select(&self.mailbox(&from)).await?;
                let wanted = targets(&indices, status.exists as usize);
                if !wanted.is_empty() {
                    client
                        .copy(&SequenceSet::from_indices(wanted), &self.mailbox(&to))
                        .await?;
                }
                responses.send(Response::MessagesCopied { from, to, indices });
            }
            RequestKind::AppendMessage { path, email } => {
                if !email.is_complete() {
                    return Err(Error::InvalidState(
                        "cannot append a message without its body".to_string(),
                    ));
                }
                client
                    .append(&self.mailbox(&path), email.flags, email.message())
                    .await?;
                responses.send(Response::MessageAppended { path });
            }
            RequestKind::SetFlags {
                path,
                indices,
                flags,
            } => {
                self.store(client, &path, &indices, StoreOp::Add, flags)
                    .await?;
                responses.send(Response::FlagsSet {
                    path,
                    indices,
                    flags,
                });
            }
            RequestKind::UnsetFlags {
                path,
                indices,
                flags,
            } => {
                self.store(client, &path, &indices, StoreOp::Remove, flags)
                    .await?;
                responses.send(Response::FlagsUnset {
                    path,
                    indices,
                    flags,
                });
            }
        }
        Ok(())
    }

    async fn list_folders(&mut self, client: &mut Session, responses: &Responder) -> Result<()> {
        let folders = client.list("", "*").await?;
        let count = folders.len();
        for folder in folders {
            if let Some(delimiter) = folder.delimiter {
                self.delimiter = delimiter;
            }
            let path = FolderPath::new(folder.segments()).with_attributes(FolderAttributes {
                is_parent: folder.may_have_children(),
                is_select: folder.is_selectable(),
                mtime: None,
            });
            responses.send(Response::FolderListed { path });
        }
        responses.send(Response::status(format!("{count} folders")));
        Ok(())
    }

    async fn check_recent(
        &self,
        client: &mut Session,
        path: FolderPath,
        responses: &Responder,
    ) -> Result<()> {
        client.select(&self.mailbox(&path)).await?;
        if client.supports_idle() {
            let mut idle = client.idle().await?;
            let event = idle.wait(self.account.idle_timeout()).await?;
            debug!(folder = %path, ?event, "idle finished");
            idle.done().await?;
        } else {
            client.noop().await?;
        }

        let status = client.status();
        responses.send(Response::RecentChecked {
            path,
            exists: status.exists,
            recent: status.recent,
            unseen: status.unseen,
        });
        Ok(())
    }

    async fn store(
        &self,
        client: &mut Session,
        path: &FolderPath,
        indices: &Indices,
        op: StoreOp,
        flags: mailsync_mime::MessageFlags,
    ) -> Result<()> {
        let status = client.select(&self.mailbox(path)).await?;
        let wanted = targets(indices, status.exists as usize);
        if !wanted.is_empty() {
            client
                .store(&SequenceSet::from_indices(wanted), op, flags)
                .await?;
        }
        Ok(())
    }
}

impl RequestHandler for ImapBackend {
    async fn handle(&mut self, request: Request, responses: &Responder) -> Result<()> {
        let kind = request.into_kind();
        if let RequestKind::SetPassword { password } = kind {
            self.password = Some(password);
            responses.send(Response::PasswordSet);
            return Ok(());
        }

        let mut client = self.session().await?;
        let result = self.dispatch(&mut client, kind, responses).await;
        if let Err(e) = client.logout().await {
            debug!(error = %e, "logout failed");
        }
        result
    }
}

/// FETCHes `wanted` in batches, reporting each message and the progress
/// after every batch.
async fn fetch_batches(
    client: &mut Session,
    path: &FolderPath,
    wanted: &[usize],
    mode: FetchMode,
    responses: &Responder,
) -> Result<()> {
    let total = wanted.len();
    let mut done = 0;
    for batch in wanted.chunks(BATCH) {
        let emails: Vec<Email> = client
            .fetch(&SequenceSet::from_indices(batch.iter().copied()), mode)
            .await?;
        for email in emails {
            let path = path.clone();
            let email = Box::new(email);
            responses.send(match mode {
                FetchMode::Headers => Response::MessageListed { path, email },
                FetchMode::Full => Response::MessageLoaded { path, email },
            });
        }
        done += batch.len();
        responses.send(Response::Progress { done, total });
    }
    responses.send(Response::status(format!("{total} messages in {path}")));
    Ok(())
}
