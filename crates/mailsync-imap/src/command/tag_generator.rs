//! Command tags.

use std::sync::atomic::{AtomicU32, Ordering};

/// Issues `A00001`, `A00002`, ... for one session.
///
/// The counter wraps instead of failing; five digits is a minimum width,
/// not a cap.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
}

impl TagGenerator {
    /// Creates a generator whose first tag is `A00001`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(1),
        }
    }

    /// Returns the next tag.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("A{n:05}")
    }

    /// Number of the tag that [`next`](Self::next) will return.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
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
    fn test_sequence() {
        let tags = TagGenerator::new();
        assert_eq!(tags.next(), "A00001");
        assert_eq!(tags.next(), "A00002");
        assert_eq!(tags.peek(), 3);
    }

    #[test]
    fn test_width_grows() {
        let tags = TagGenerator {
            counter: AtomicU32::new(123_456),
        };
        assert_eq!(tags.next(), "A123456");
    }
}
