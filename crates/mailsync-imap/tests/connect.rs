//! Connection retries against a loopback listener.
//!
//! The listener hangs up on the first connections without a greeting,
//! which the client sees as a transport failure.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use mailsync_imap::{Client, Config, Error, Security, SessionState};

/// Accepts forever. The first `drops` connections are closed at once; later
/// ones get `greeting`. Returns the port and the accept counter.
async fn listener(drops: usize, greeting: &'static str) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n > drops {
                socket.write_all(greeting.as_bytes()).await.unwrap();
                // Keep the connection open until the client is done.
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    drop(socket);
                });
            }
        }
    });
    (port, accepted)
}

fn config(port: u16, attempts: u32) -> Config {
    Config::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .connect_attempts(attempts)
        .retry_delay(Duration::from_millis(1))
        .io_timeout(Duration::from_secs(5))
        .build()
}

#[tokio::test]
async fn test_retries_until_greeted() {
    let (port, accepted) = listener(4, "* OK ready\r\n").await;
    let Ok(client) = Client::connect(&config(port, 5)).await else {
        panic!("connect failed");
    };
    assert_eq!(client.state(), SessionState::NonAuthenticated);
    assert_eq!(accepted.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_gives_up_after_all_attempts() {
    let (port, accepted) = listener(usize::MAX, "").await;
    let Err(err) = Client::connect(&config(port, 5)).await else {
        panic!("connected");
    };
    assert!(matches!(err, Error::Io(_)), "{err:?}");
    assert!(err.is_transient());
    assert_eq!(accepted.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_default_is_five_attempts() {
    let (port, accepted) = listener(usize::MAX, "").await;
    let config = Config::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .retry_delay(Duration::from_millis(1))
        .build();
    assert_eq!(config.connect_attempts, 5);
    assert!(Client::connect(&config).await.is_err());
    assert_eq!(accepted.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_zero_attempts_still_tries_once() {
    let (port, accepted) = listener(usize::MAX, "").await;
    let config = config(port, 0);
    assert_eq!(config.connect_attempts, 1);
    assert!(Client::connect(&config).await.is_err());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bad_greeting_is_not_retried() {
    let (port, accepted) = listener(0, "* BAD go away\r\n").await;
    let Err(err) = Client::connect(&config(port, 5)).await else {
        panic!("connected");
    };
    assert!(matches!(err, Error::Protocol(_)), "{err:?}");
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}
