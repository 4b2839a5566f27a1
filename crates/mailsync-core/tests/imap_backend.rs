//! The engine against a scripted IMAP server on loopback.
//!
//! Each request opens its own connection, so the server accepts one
//! scripted session per request and checks every line the client sends.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mailsync_core::{
    AsyncServent, Backend, Email, FolderPath, ImapAccount, ImapBackend, Indices, MessageFlags,
    RequestKind, Response, Security,
};

const GREETING: &str = "* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n";
const LOGOUT: (&str, &str) = ("LOGOUT\r\n", "* BYE bye\r\nOK\r\n");

/// One session: pairs of (command sent without its tag, reply without the
/// completion tag). The tag is filled in from the command's position.
///
/// A command starting with `=` is an untagged line continuing the previous
/// command (IDLE's DONE, literal data). Its reply, if any, completes that
/// command's tag.
type Script = Vec<(&'static str, &'static str)>;

fn login() -> (&'static str, &'static str) {
    ("LOGIN me secret\r\n", "OK LOGIN completed\r\n")
}

/// Prefixes the tag onto the command and onto the last reply line.
fn tagged(n: usize, command: &str, reply: &str) -> (String, String) {
    let tag = format!("A{n:05}");
    let (untagged, completion) = match reply.trim_end().rfind("\r\n") {
        Some(split) => reply.split_at(split + 2),
        None => ("", reply),
    };
    let reply = if reply.starts_with('+') {
        reply.to_string()
    } else {
        format!("{untagged}{tag} {completion}")
    };
    (format!("{tag} {command}"), reply)
}

async fn server(sessions: Vec<Script>) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        for script in sessions {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(GREETING.as_bytes()).await.unwrap();

            let mut tag = 0;
            for (command, reply) in script {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                if let Some(continued) = command.strip_prefix('=') {
                    assert_eq!(line, continued);
                    if !reply.is_empty() {
                        write
                            .write_all(format!("A{tag:05} {reply}").as_bytes())
                            .await
                            .unwrap();
                    }
                    continue;
                }
                tag += 1;
                let (expected, reply) = tagged(tag, command, reply);
                assert_eq!(line, expected);
                write.write_all(reply.as_bytes()).await.unwrap();
            }
        }
    });
    (port, handle)
}

fn account(port: u16, password: Option<&str>) -> ImapAccount {
    let mut account = ImapAccount::new("127.0.0.1", "me");
    account.port = Some(port);
    account.security = Security::None;
    account.password = password.map(str::to_string);
    account.idle_timeout_secs = 5;
    account
}

/// Drains responses until one satisfies `done`.
async fn until(
    engine: &AsyncServent<Backend>,
    signal: &mut mpsc::Receiver<()>,
    done: impl Fn(&Response) -> bool,
) -> Vec<Response> {
    let mut out = Vec::new();
    loop {
        tokio::time::timeout(Duration::from_secs(10), signal.recv())
            .await
            .unwrap()
            .unwrap();
        let mut finished = false;
        engine.drain_responses(&mut |r: Response| {
            finished |= done(&r);
            out.push(r);
        });
        if finished {
            return out;
        }
    }
}

fn is_status(r: &Response) -> bool {
    matches!(r, Response::Status { .. })
}

#[tokio::test]
async fn test_session_per_request() {
    let inbox = FolderPath::parse("INBOX");
    let sessions = vec![
        vec![login(), LOGOUT],
        vec![
            login(),
            (
                "LIST \"\" \"*\"\r\n",
                "* LIST (\\HasNoChildren) \"/\" INBOX\r\n\
                 * LIST (\\Noselect \\HasChildren) \"/\" Work\r\n\
                 * LIST (\\Noinferiors) \"/\" Work/2024\r\n\
                 OK LIST completed\r\n",
            ),
            LOGOUT,
        ],
        vec![
            login(),
            (
                "SELECT INBOX\r\n",
                "* 2 EXISTS\r\n* 0 RECENT\r\nOK [READ-WRITE] SELECT completed\r\n",
            ),
            (
                "FETCH 1:2 (FLAGS RFC822.SIZE RFC822.HEADER)\r\n",
                "* 1 FETCH (FLAGS (\\Seen) RFC822.SIZE 120 RFC822.HEADER {18}\r\n\
                 Subject: hello\r\n\r\n)\r\n\
                 * 2 FETCH (FLAGS () RFC822.SIZE 80 RFC822.HEADER {16}\r\n\
                 Subject: bye\r\n\r\n)\r\n\
                 OK FETCH completed\r\n",
            ),
            LOGOUT,
        ],
        vec![
            login(),
            ("SELECT Work/2024\r\n", "* 7 EXISTS\r\nOK SELECT completed\r\n"),
            ("STORE 1 +FLAGS.SILENT (\\Deleted)\r\n", "OK STORE completed\r\n"),
            ("STORE 3:4 +FLAGS.SILENT (\\Deleted)\r\n", "OK STORE completed\r\n"),
            LOGOUT,
        ],
        vec![
            login(),
            (
                "SELECT INBOX\r\n",
                "* 2 EXISTS\r\n* 0 RECENT\r\nOK SELECT completed\r\n",
            ),
            ("IDLE\r\n", "+ idling\r\n* 3 EXISTS\r\n"),
            ("=DONE\r\n", "OK IDLE terminated\r\n"),
            LOGOUT,
        ],
    ];
    let (port, server) = server(sessions).await;

    let mut engine = AsyncServent::new(Backend::Imap(ImapBackend::new(account(port, Some("secret")))));
    let mut signal = engine.take_response_signal().unwrap();
    engine.run().unwrap();

    engine.push(RequestKind::Initialize);
    let responses = until(&engine, &mut signal, |r| *r == Response::Initialized).await;
    assert_eq!(responses, [Response::Initialized]);

    engine.push(RequestKind::ListFolders);
    let responses = until(&engine, &mut signal, is_status).await;
    let folders: Vec<(String, bool, bool)> = responses
        .iter()
        .filter_map(|r| match r {
            Response::FolderListed { path } => Some((
                path.to_string(),
                path.attributes.is_select,
                path.attributes.is_parent,
            )),
            _ => None,
        })
        .collect();
    assert_eq!(
        folders,
        [
            ("INBOX".to_string(), true, true),
            ("Work".to_string(), false, true),
            ("Work/2024".to_string(), true, false),
        ]
    );

    engine.push(RequestKind::ListMessages {
        path: inbox.clone(),
        indices: Indices::new(),
    });
    let responses = until(&engine, &mut signal, is_status).await;
    let listed: Vec<_> = responses
        .iter()
        .filter_map(|r| match r {
            Response::MessageListed { email, .. } => {
                Some((email.index, email.subject().map(str::to_string), email.flags))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        listed,
        [
            (0, Some("hello".to_string()), MessageFlags::SEEN),
            (1, Some("bye".to_string()), MessageFlags::empty()),
        ]
    );
    assert!(responses.contains(&Response::Progress { done: 2, total: 2 }));

    engine.push(RequestKind::SetFlags {
        path: FolderPath::parse("Work/2024"),
        indices: Indices::from([0, 2, 3]),
        flags: MessageFlags::DELETED,
    });
    let responses = until(&engine, &mut signal, |r| {
        matches!(r, Response::FlagsSet { .. })
    })
    .await;
    assert_eq!(responses.len(), 1);

    engine.push(RequestKind::CheckRecent {
        path: inbox.clone(),
    });
    let responses = until(&engine, &mut signal, |r| {
        matches!(r, Response::RecentChecked { .. })
    })
    .await;
    assert_eq!(
        responses,
        [Response::RecentChecked {
            path: inbox,
            exists: 3,
            recent: 0,
            unseen: 0,
        }]
    );

    engine.shutdown();
    server.await.unwrap();
}

#[tokio::test]
async fn test_login_errors() {
    let sessions = vec![
        vec![("LOGIN me wrong\r\n", "NO [AUTHENTICATIONFAILED] bad credentials\r\n")],
        vec![login(), LOGOUT],
    ];
    let (port, server) = server(sessions).await;

    let mut engine = AsyncServent::new(Backend::Imap(ImapBackend::new(account(port, None))));
    let mut signal = engine.take_response_signal().unwrap();
    engine.run().unwrap();

    engine.push(RequestKind::Initialize);
    let responses = until(&engine, &mut signal, Response::is_error).await;
    assert_eq!(
        responses,
        [Response::LoginError {
            message: "Configuration error: no password set for me".to_string(),
        }]
    );

    engine.push(RequestKind::SetPassword {
        password: "wrong".to_string(),
    });
    until(&engine, &mut signal, |r| *r == Response::PasswordSet).await;
    engine.push(RequestKind::Initialize);
    let responses = until(&engine, &mut signal, Response::is_error).await;
    assert_eq!(
        responses,
        [Response::LoginError {
            message: "IMAP error: Server returned NO: bad credentials".to_string(),
        }]
    );

    engine.push(RequestKind::SetPassword {
        password: "secret".to_string(),
    });
    until(&engine, &mut signal, |r| *r == Response::PasswordSet).await;
    engine.push(RequestKind::Initialize);
    let responses = until(&engine, &mut signal, |r| *r == Response::Initialized).await;
    assert_eq!(responses, [Response::Initialized]);

    engine.shutdown();
    server.await.unwrap();
}

#[tokio::test]
async fn test_append_mbox_message() {
    let sessions = vec![vec![
        login(),
        ("APPEND Archive (\\Seen) {17}\r\n", "+ go ahead\r\n"),
        ("=Subject: s\r\n", ""),
        ("=\r\n", ""),
        ("=b\r\n", ""),
        ("=\r\n", "OK APPEND completed\r\n"),
        LOGOUT,
    ]];
    let (port, server) = server(sessions).await;

    let mut engine = AsyncServent::new(Backend::Imap(ImapBackend::new(account(port, Some("secret")))));
    let mut signal = engine.take_response_signal().unwrap();
    engine.run().unwrap();

    let mut email = Email::parse("From a@b Mon Jan  1 00:00:00 2024\nSubject: s\n\nb\n").unwrap();
    email.flags = MessageFlags::SEEN;
    engine.push(RequestKind::AppendMessage {
        path: FolderPath::parse("Archive"),
        email: Box::new(email),
    });
    let responses = until(&engine, &mut signal, |r| {
        matches!(r, Response::MessageAppended { .. }) || r.is_error()
    })
    .await;
    assert_eq!(
        responses,
        [Response::MessageAppended {
            path: FolderPath::parse("Archive"),
        }]
    );

    engine.shutdown();
    server.await.unwrap();
}
