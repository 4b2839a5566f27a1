//! The engine over a directory of mbox files.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use mailsync_core::{
    AccountConfig, AsyncServent, Backend, Email, FolderCache, FolderPath, Headers, Indices,
    MessageFlags, RequestKind, Response,
};

const INBOX: &str = "From alice@example.com Mon Jan  1 10:00:00 2024\n\
                     From: alice@example.com\n\
                     Subject: =?UTF-8?B?SGVsbG8=?=\n\
                     \n\
                     Hi there.\n\
                     \n\
                     From bob@example.com Mon Jan  1 11:00:00 2024\n\
                     From: bob@example.com\n\
                     Subject: Report\n\
                     Content-Type: multipart/mixed; boundary=X\n\
                     \n\
                     --X\n\
                     Content-Type: text/plain\n\
                     \n\
                     See attached.\n\
                     --X\n\
                     Content-Type: text/csv\n\
                     \n\
                     a,b\n\
                     --X--\n";

struct Harness {
    _dir: TempDir,
    root: std::path::PathBuf,
    engine: AsyncServent<Backend>,
    signal: mpsc::Receiver<()>,
    cache: FolderCache,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("INBOX"), INBOX).unwrap();
        fs::write(root.join("Archive"), "").unwrap();

        let config = AccountConfig::from_json(&format!(
            r#"{{ "name": "local", "backend": {{ "type": "mbox", "root": {:?} }} }}"#,
            root.display().to_string()
        ))
        .unwrap();
        let backend = Backend::from_config(&config);
        let cache = backend.cache().unwrap();
        let mut engine = AsyncServent::new(backend);
        let signal = engine.take_response_signal().unwrap();
        engine.run().unwrap();
        Self {
            _dir: dir,
            root,
            engine,
            signal,
            cache,
        }
    }

    /// Pushes a request and drains until `done` matches a response.
    async fn request(
        &mut self,
        kind: RequestKind,
        done: impl Fn(&Response) -> bool,
    ) -> Vec<Response> {
        self.engine.push(kind);
        let mut out = Vec::new();
        loop {
            tokio::time::timeout(Duration::from_secs(10), self.signal.recv())
                .await
                .unwrap()
                .unwrap();
            let mut finished = false;
            self.engine.drain_responses(&mut |r: Response| {
                finished |= done(&r) || r.is_error();
                out.push(r);
            });
            if finished {
                return out;
            }
        }
    }
}

fn is_status(r: &Response) -> bool {
    matches!(r, Response::Status { .. })
}

#[tokio::test]
async fn test_browse_and_expunge() {
    let mut h = Harness::new();
    let inbox = FolderPath::parse("INBOX");
    let responses = h
        .request(RequestKind::Initialize, |r| *r == Response::Initialized)
        .await;
    assert_eq!(responses, [Response::Initialized]);

    let responses = h.request(RequestKind::ListFolders, is_status).await;
    let names: Vec<String> = responses
        .iter()
        .filter_map(|r| match r {
            Response::FolderListed { path } => Some(path.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(names, ["Archive", "INBOX"]);

    let responses = h
        .request(
            RequestKind::ListMessages {
                path: inbox.clone(),
                indices: Indices::new(),
            },
            is_status,
        )
        .await;
    let subjects: Vec<String> = responses
        .iter()
        .filter_map(|r| match r {
            Response::MessageListed { email, .. } => email.subject().map(str::to_string),
            _ => None,
        })
        .collect();
    assert_eq!(subjects, ["Hello", "Report"]);
    assert_eq!(h.cache.len(&inbox), Some(2));
    assert_eq!(
        h.cache.message(&inbox, 1).unwrap().subject(),
        Some("Report")
    );

    let responses = h
        .request(
            RequestKind::LoadMessages {
                path: inbox.clone(),
                indices: Indices::from([1]),
            },
            is_status,
        )
        .await;
    let Some(Response::MessageLoaded { email, .. }) = responses.first() else {
        panic!("expected a loaded message, got {responses:?}");
    };
    assert_eq!(email.attachments().len(), 2);
    assert_eq!(email.grep(b"a,b", true).unwrap().text(), "a,b");
    assert!(email.flags.contains(MessageFlags::SEEN));

    h.request(
        RequestKind::CopyMessages {
            from: inbox.clone(),
            to: FolderPath::parse("Archive"),
            indices: Indices::from([0]),
        },
        |r| matches!(r, Response::MessagesCopied { .. }),
    )
    .await;

    h.request(
        RequestKind::SetFlags {
            path: inbox.clone(),
            indices: Indices::from([0]),
            flags: MessageFlags::DELETED,
        },
        |r| matches!(r, Response::FlagsSet { .. }),
    )
    .await;
    assert!(
        h.cache
            .message(&inbox, 0)
            .unwrap()
            .flags
            .contains(MessageFlags::DELETED)
    );
    h.request(RequestKind::ExpungeFolder { path: inbox.clone() }, |r| {
        matches!(r, Response::FolderExpunged { .. })
    })
    .await;

    let inbox_text = fs::read_to_string(h.root.join("INBOX")).unwrap();
    assert!(inbox_text.starts_with("From bob@example.com"));
    let archive_text = fs::read_to_string(h.root.join("Archive")).unwrap();
    assert!(archive_text.starts_with("From alice@example.com"));
    assert!(archive_text.contains("Hi there."));
    assert_eq!(h.cache.len(&inbox), Some(0));

    h.engine.shutdown();
}

#[tokio::test]
async fn test_append_composed_message() {
    let mut h = Harness::new();
    let archive = FolderPath::parse("Archive");

    let mut headers = Headers::new();
    headers.add("From", "me@example.com");
    headers.add("Subject", "Grüße");
    let email = Email::compose(&headers, b"Hallo.\n").unwrap();

    h.request(
        RequestKind::AppendMessage {
            path: archive.clone(),
            email: Box::new(email),
        },
        |r| matches!(r, Response::MessageAppended { .. }),
    )
    .await;

    let responses = h
        .request(RequestKind::CheckRecent { path: archive.clone() }, |r| {
            matches!(r, Response::RecentChecked { .. })
        })
        .await;
    assert!(matches!(
        responses.last(),
        Some(Response::RecentChecked { exists: 1, unseen: 1, .. })
    ));

    let responses = h
        .request(
            RequestKind::ListMessages {
                path: archive,
                indices: Indices::new(),
            },
            is_status,
        )
        .await;
    let Some(Response::MessageListed { email, .. }) = responses.first() else {
        panic!("expected a listed message, got {responses:?}");
    };
    assert_eq!(email.subject(), Some("Grüße"));

    h.engine.shutdown();
}

#[tokio::test]
async fn test_missing_folder_is_an_error_response() {
    let mut h = Harness::new();
    let responses = h
        .request(
            RequestKind::DeleteFolder {
                path: FolderPath::parse("Nope"),
            },
            |_| false,
        )
        .await;
    assert_eq!(
        responses,
        [Response::Error {
            message: "Folder not found: Nope".to_string(),
        }]
    );

    let responses = h.request(RequestKind::ListFolders, is_status).await;
    assert_eq!(responses.len(), 3);
    assert_eq!(h.cache.folders().len(), 2);
    h.engine.shutdown();
}
