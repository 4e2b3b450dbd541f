//! Source coverage bookkeeping and the reordering constraint checker.

use std::fmt;

use smallvec::SmallVec;

/// Half-open source span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

/// Bitset over source positions `[0, len)`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Coverage {
    bits: SmallVec<[u64; 2]>,
    len: usize,
}

impl Coverage {
    pub fn new(len: usize) -> Self {
        Self {
            bits: SmallVec::from_elem(0, len.div_ceil(64)),
            len,
        }
    }

    /// Source length this coverage is defined over.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_set(&self, pos: usize) -> bool {
        pos < self.len && self.bits[pos / 64] & (1 << (pos % 64)) != 0
    }

    /// True when no position of `span` is covered.
    pub fn is_free(&self, span: Span) -> bool {
        span.end <= self.len && (span.start..span.end).all(|p| !self.is_set(p))
    }

    /// Copy with `span` marked as covered. Bits are never cleared.
    pub fn with_span(&self, span: Span) -> Coverage {
        let mut next = self.clone();
        for p in span.start..span.end.min(self.len) {
            next.bits[p / 64] |= 1 << (p % 64);
        }
        next
    }

    /// Number of covered positions.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == self.len
    }

    pub fn first_uncovered(&self) -> Option<usize> {
        (0..self.len).find(|&p| !self.is_set(p))
    }

    /// Maximal uncovered runs, left to right.
    pub fn uncovered_runs(&self) -> Vec<Span> {
        let mut runs = Vec::new();
        let mut start = None;
        for p in 0..self.len {
            match (self.is_set(p), start) {
                (false, None) => start = Some(p),
                (true, Some(s)) => {
                    runs.push(Span::new(s, p));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(Span::new(s, self.len));
        }
        runs
    }

    /// Uncovered runs lying left of `boundary`: the gaps a derivation has
    /// skipped over and must come back to.
    pub fn pending_gaps(&self, boundary: usize) -> usize {
        self.uncovered_runs()
            .iter()
            .filter(|r| r.end <= boundary)
            .count()
    }
}

impl fmt::Debug for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = (0..self.len)
            .map(|p| if self.is_set(p) { '1' } else { '0' })
            .collect();
        write!(f, "Coverage({s})")
    }
}

/// Stack of contiguous covered blocks for ITG-constrained reordering.
///
/// Pushing a span merges it with the top block while the two are adjacent,
/// shift-reduce style. A derivation satisfies the ITG constraint iff it can
/// always be reduced to a single block once coverage is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ItgStack {
    blocks: SmallVec<[Span; 4]>,
}

impl ItgStack {
    pub fn blocks(&self) -> &[Span] {
        &self.blocks
    }

    pub fn pushed(&self, span: Span) -> ItgStack {
        let mut blocks = self.blocks.clone();
        let mut cur = span;
        while let Some(&top) = blocks.last() {
            if top.end == cur.start {
                cur = Span::new(top.start, cur.end);
            } else if cur.end == top.start {
                cur = Span::new(cur.start, top.end);
            } else {
                break;
            }
            blocks.pop();
        }
        blocks.push(cur);
        ItgStack { blocks }
    }

    /// A new span must sit in the uncovered stretch directly next to the top
    /// block; jumping over any other covered block would create an
    /// inside-out (2-4-1-3) pattern.
    pub fn admits(&self, coverage: &Coverage, span: Span) -> bool {
        let Some(&top) = self.blocks.last() else {
            return true;
        };
        if span.start >= top.end {
            coverage.is_free(Span::new(top.end, span.end))
        } else if span.end <= top.start {
            coverage.is_free(Span::new(span.start, top.start))
        } else {
            false
        }
    }
}

/// Decides which source spans may be translated next.
///
/// A pure predicate over the state passed in: coverage, the right boundary
/// of the most recently translated phrase, and (for ITG) the block stack.
#[derive(Debug, Clone)]
pub struct ConstraintChecker {
    distortion_limit: Option<usize>,
    itg: bool,
    max_pending_gaps: Option<usize>,
}

impl ConstraintChecker {
    pub fn new(distortion_limit: Option<usize>, itg: bool, max_pending_gaps: Option<usize>) -> Self {
        Self {
            distortion_limit,
            itg,
            max_pending_gaps,
        }
    }

    pub fn distortion_limit(&self) -> Option<usize> {
        self.distortion_limit
    }

    pub fn uses_itg(&self) -> bool {
        self.itg
    }

    /// With a distortion limit, `span` is also rejected when the first gap
    /// left behind would be more than the limit away from `span.end`. This is
    /// stricter than the jump limit alone: it prunes some orders whose jumps
    /// are all within the limit, so even `recombination = none` does not
    /// enumerate every limit-respecting order.
    pub fn is_eligible(&self, coverage: &Coverage, boundary: usize, itg: &ItgStack, span: Span) -> bool {
        if span.is_empty() || !coverage.is_free(span) {
            return false;
        }
        let mut next = None;
        if let Some(limit) = self.distortion_limit {
            if boundary.abs_diff(span.start) > limit {
                return false;
            }
            // Reject jumps that would leave the first gap out of reach.
            let covered = coverage.with_span(span);
            if let Some(gap) = covered.first_uncovered() {
                if span.end.abs_diff(gap) > limit {
                    return false;
                }
            }
            next = Some(covered);
        }
        if self.itg && !itg.admits(coverage, span) {
            return false;
        }
        if let Some(max) = self.max_pending_gaps {
            let covered = next.unwrap_or_else(|| coverage.with_span(span));
            if covered.pending_gaps(span.end) > max {
                return false;
            }
        }
        true
    }
}
