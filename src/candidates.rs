//! Candidate pair generation over a [`BlockingIndex`].
//!
//! Pairs are produced lazily, block by block. Block members are sorted, so
//! every emitted pair is already in canonical `(low, high)` order; a seen-set
//! keyed by that canonical pair drops repeats from later blocks. Cost is
//! `O(Σ |block|²)`, which stays near-linear as long as block sizes are
//! bounded by the blocking caps and most keys are selective (long-tail
//! token/prefix distributions, a few large blocks).

use ahash::AHashSet;

use crate::blocking::{Block, BlockingIndex};
use crate::record::RecordId;

/// Unordered record pair with `a < b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidatePair {
    a: RecordId,
    b: RecordId,
}

impl CandidatePair {
    /// Canonicalize two distinct ids into a pair; `None` if they are equal
    pub fn new(x: RecordId, y: RecordId) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { a: x, b: y }),
            std::cmp::Ordering::Greater => Some(Self { a: y, b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn a(&self) -> RecordId {
        self.a
    }

    pub fn b(&self) -> RecordId {
        self.b
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.a == id || self.b == id
    }

    /// The other end of the pair, if `id` is one of its ends
    pub fn other(&self, id: RecordId) -> Option<RecordId> {
        if id == self.a {
            Some(self.b)
        } else if id == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Lazy, finite, duplicate-free sequence of candidate pairs.
///
/// Consuming the iterator drains it; rebuild from the index to start over.
pub struct CandidatePairs<'a> {
    blocks: std::slice::Iter<'a, Block>,
    current: &'a [RecordId],
    i: usize,
    j: usize,
    seen: AHashSet<CandidatePair>,
    limit: Option<usize>,
    /// First unseen pair held back once the limit is reached
    withheld: Option<CandidatePair>,
    emitted: usize,
    duplicates: usize,
}

impl<'a> CandidatePairs<'a> {
    pub fn new(index: &'a BlockingIndex) -> Self {
        Self {
            blocks: index.blocks().iter(),
            current: &[],
            i: 0,
            j: 1,
            seen: AHashSet::new(),
            limit: None,
            withheld: None,
            emitted: 0,
            duplicates: 0,
        }
    }

    /// Stop after `limit` distinct pairs
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Distinct pairs emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Repeats suppressed so far
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Whether the limit held back at least one distinct pair
    pub fn truncated(&self) -> bool {
        self.withheld.is_some()
    }

    fn at_limit(&self) -> bool {
        self.limit.is_some_and(|limit| self.emitted >= limit)
    }

    /// Next pair not emitted before, counting repeats skipped on the way
    fn next_unseen(&mut self) -> Option<CandidatePair> {
        while let Some(pair) = self.next_raw() {
            if self.seen.insert(pair) {
                return Some(pair);
            }
            self.duplicates += 1;
        }
        None
    }

    /// Next raw pair in block order, including repeats
    fn next_raw(&mut self) -> Option<CandidatePair> {
        loop {
            if self.j < self.current.len() {
                let pair = CandidatePair {
                    a: self.current[self.i],
                    b: self.current[self.j],
                };
                self.j += 1;
                return Some(pair);
            }
            self.i += 1;
            self.j = self.i + 1;
            if self.j < self.current.len() {
                continue;
            }
            let block = self.blocks.next()?;
            self.current = block.members();
            self.i = 0;
            self.j = 1;
        }
    }
}

impl Iterator for CandidatePairs<'_> {
    type Item = CandidatePair;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_limit() {
            return None;
        }
        let pair = self.next_unseen()?;
        self.emitted += 1;
        if self.at_limit() {
            // Hold back the next distinct pair, if any; it marks truncation
            self.withheld = self.next_unseen();
        }
        Some(pair)
    }
}

/// Enumerate candidate pairs of `index`
pub fn generate(index: &BlockingIndex) -> CandidatePairs<'_> {
    CandidatePairs::new(index)
}
