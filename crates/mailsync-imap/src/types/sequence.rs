//! Message sequence sets.
//!
//! The engine addresses messages by 0-based index; IMAP sequence numbers
//! are `index + 1`. Indices are coalesced into the fewest inclusive ranges
//! so STORE and COPY need one round trip per contiguous run.

use std::fmt;

/// Inclusive range of 1-based sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    /// First sequence number.
    pub start: u32,
    /// Last sequence number (inclusive).
    pub end: u32,
}

impl SeqRange {
    /// Number of messages in the range.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.end - self.start + 1
    }

    /// Ranges are never empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        false
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Sorted, non-overlapping, non-adjacent sequence ranges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceSet {
    ranges: Vec<SeqRange>,
}

impl SequenceSet {
    /// Builds a set from 0-based message indices, coalescing runs.
    ///
    /// Duplicates are ignored; indices beyond the protocol's range are
    /// dropped.
    pub fn from_indices<I>(indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut numbers: Vec<u32> = indices
            .into_iter()
            .filter_map(|i| u32::try_from(i).ok()?.checked_add(1))
            .collect();
        numbers.sort_unstable();
        numbers.dedup();

        let mut ranges: Vec<SeqRange> = Vec::new();
        for n in numbers {
            match ranges.last_mut() {
                Some(last) if last.end + 1 == n => last.end = n,
                _ => ranges.push(SeqRange { start: n, end: n }),
            }
        }

        Self { ranges }
    }

    /// Builds a set covering `start..=end` (1-based).
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        (start >= 1 && start <= end).then(|| Self {
            ranges: vec![SeqRange { start, end }],
        })
    }

    /// The coalesced ranges, ascending.
    #[must_use]
    pub fn ranges(&self) -> &[SeqRange] {
        &self.ranges
    }

    /// True if the set addresses no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of messages addressed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.iter().map(|r| r.len() as usize).sum()
    }

    /// The 0-based indices in the set, ascending.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges
            .iter()
            .flat_map(|r| r.start..=r.end)
            .map(|n| (n - 1) as usize)
    }
}

impl From<SeqRange> for SequenceSet {
    fn from(range: SeqRange) -> Self {
        Self {
            ranges: vec![range],
        }
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
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
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_coalesce_runs() {
        let set = SequenceSet::from_indices([0, 1, 2, 4, 6, 7]);
        assert_eq!(set.to_string(), "1:3,5,7:8");
        assert_eq!(set.ranges().len(), 3);
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn test_unsorted_with_duplicates() {
        let set = SequenceSet::from_indices([9, 3, 3, 2, 10]);
        assert_eq!(set.to_string(), "3:4,10:11");
    }

    #[test]
    fn test_empty() {
        let set = SequenceSet::from_indices(std::iter::empty());
        assert!(set.is_empty());
        assert_eq!(set.to_string(), "");
    }

    #[test]
    fn test_range() {
        assert_eq!(SequenceSet::range(1, 50).unwrap().to_string(), "1:50");
        assert_eq!(SequenceSet::range(7, 7).unwrap().to_string(), "7");
        assert!(SequenceSet::range(0, 3).is_none());
        assert!(SequenceSet::range(5, 3).is_none());
    }

    proptest! {
        #[test]
        fn prop_coalescing_covers_exactly(indices in proptest::collection::btree_set(0usize..500, 0..80)) {
            let set = SequenceSet::from_indices(indices.iter().copied());
            let covered: BTreeSet<usize> = set.indices().collect();
            prop_assert_eq!(&covered, &indices);

            for pair in set.ranges().windows(2) {
                prop_assert!(pair[0].end + 1 < pair[1].start);
            }
        }
    }
}
