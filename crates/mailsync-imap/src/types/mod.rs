//! Core IMAP types.

mod mailbox;
mod sequence;

pub use mailbox::{ListResponse, MailboxAttribute, MailboxCounters, MailboxStatus};
pub use sequence::{SeqRange, SequenceSet};

/// Completion status carried by a tagged or untagged condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Ok,
    /// Operational failure.
    No,
    /// Protocol or syntax error.
    Bad,
    /// Already authenticated (greeting only).
    PreAuth,
    /// Server is closing the connection.
    Bye,
}
