//! Transport, framing and the session state machine.

mod client;
mod config;
mod framed;
mod idle;
mod stream;

pub use client::{Client, SessionState};
pub use config::{Config, ConfigBuilder, Credentials, Security};
pub use framed::{FramedStream, MAX_LINE, MAX_LITERAL, parse_literal_length};
pub use idle::{IdleEvent, IdleHandle};
pub use stream::{ImapStream, connect, create_tls_connector};
