//! `mailsync` - browse and tidy IMAP and mbox mailboxes from the terminal.
//!
//! Each invocation starts the engine, initializes the account, runs one
//! command and prints the responses as they arrive.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::fs;

use anyhow::{Context, bail};
use clap::Parser;
use mailsync_core::{
    AccountConfig, AsyncServent, Backend, BackendConfig, Email, FolderPath, MessageFlags,
    RequestKind, Response,
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, is_final};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailsync=info,mailsync_core=info,mailsync_imap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => AccountConfig::default_path().context("no config directory on this system")?,
    };
    let config = AccountConfig::load(&path)
        .with_context(|| format!("loading account from {}", path.display()))?;
    info!(account = %config.name, "starting mailsync");

    let request = match &cli.command {
        Command::Append { folder, file } => {
            let raw = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
            RequestKind::AppendMessage {
                path: FolderPath::parse(folder),
                email: Box::new(Email::parse(raw)?),
            }
        }
        command => command
            .request()
            .context("command has no engine request")?,
    };

    let mut session = Session::start(&config)?;
    if let BackendConfig::Imap(account) = &config.backend
        && account.password.is_none()
        && let Ok(password) = std::env::var(&cli.password_env)
    {
        session.run(RequestKind::SetPassword { password }).await?;
    }
    session.run(RequestKind::Initialize).await?;
    for response in session.run(request).await? {
        print(&response);
    }
    session.engine.shutdown();
    Ok(())
}

struct Session {
    engine: AsyncServent<Backend>,
    signal: mpsc::Receiver<()>,
}

impl Session {
    fn start(config: &AccountConfig) -> anyhow::Result<Self> {
        let mut engine = AsyncServent::new(Backend::from_config(config));
        let signal = engine
            .take_response_signal()
            .context("response signal already taken")?;
        engine.run()?;
        Ok(Self { engine, signal })
    }

    /// Pushes one request and collects responses until it completes.
    async fn run(&mut self, kind: RequestKind) -> anyhow::Result<Vec<Response>> {
        debug!(request = kind.name(), "pushing request");
        self.engine.push(kind.clone());
        let mut out = Vec::new();
        loop {
            if self.signal.recv().await.is_none() {
                bail!("engine stopped before {} finished", kind.name());
            }
            let mut finished = false;
            self.engine.drain_responses(&mut |response: Response| {
                finished |= is_final(&kind, &response);
                out.push(response);
            });
            if let Some(Response::Error { message } | Response::LoginError { message }) =
                out.iter().find(|r| r.is_error())
            {
                bail!("{message}");
            }
            if finished {
                return Ok(out);
            }
        }
    }
}

fn flag_letters(flags: MessageFlags) -> String {
    [
        (MessageFlags::SEEN, 'S'),
        (MessageFlags::ANSWERED, 'A'),
        (MessageFlags::DELETED, 'D'),
    ]
    .into_iter()
    .map(|(flag, letter)| if flags.contains(flag) { letter } else { '-' })
    .collect()
}

fn print(response: &Response) {
    match response {
        Response::FolderListed { path } => {
            let marker = if path.attributes.is_select { ' ' } else { '/' };
            println!("{path}{marker}");
        }
        Response::MessageListed { email, .. } => {
            println!(
                "{:>5} {} {:<30.30} {}",
                email.index,
                flag_letters(email.flags),
                email.from().unwrap_or_default(),
                email.subject().unwrap_or_default()
            );
        }
        Response::MessageLoaded { email, .. } => {
            for (name, value) in email.headers.iter() {
                println!("{name}: {value}");
            }
            println!();
            for part in email.walk().filter(|p| p.attachments().is_empty()) {
                if part.content_type().mime_type() == "text/plain" {
                    println!("{}", part.text());
                } else {
                    println!(
                        "[{} part, {} bytes]",
                        part.content_type().mime_type(),
                        part.data().len()
                    );
                }
            }
        }
        Response::RecentChecked {
            path,
            exists,
            recent,
            unseen,
        } => println!("{path}: {exists} messages, {recent} recent, {unseen} unseen"),
        Response::Status { message } => info!("{message}"),
        Response::Progress { done, total } => debug!(done, total, "progress"),
        Response::FolderCreated { path } => println!("created {path}"),
        Response::FolderDeleted { path } => println!("deleted {path}"),
        Response::FolderRenamed { from, to } => println!("renamed {from} to {to}"),
        Response::FolderExpunged { path } => println!("expunged {path}"),
        Response::MessagesCopied { from, to, indices } => {
            println!("copied {} messages from {from} to {to}", indices.len());
        }
        Response::MessageAppended { path } => println!("appended to {path}"),
        Response::FlagsSet { indices, .. } | Response::FlagsUnset { indices, .. } => {
            println!("updated {} messages", indices.len());
        }
        Response::Initialized
        | Response::PasswordSet
        | Response::Error { .. }
        | Response::LoginError { .. } => {}
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
    fn test_flag_letters() {
        assert_eq!(flag_letters(MessageFlags::empty()), "---");
        assert_eq!(
            flag_letters(MessageFlags::SEEN | MessageFlags::DELETED),
            "S-D"
        );
    }
}
