//! Bounded top-N selection over candidate scores.
//!
//! Ranking is by descending score, equal scores rank the lower candidate
//! index first. Slots left over when there are fewer candidates than `n`
//! are filled with [`PADDING`].

use std::cmp::{
    Ordering,
    Reverse,
};
use std::collections::BinaryHeap;

use crate::scoring::arithmetic::ScoreValue;

/// Index written to result slots that have no candidate.
pub const PADDING: i32 = -1;

#[derive(Debug, Clone, Copy)]
struct Ranked<S> {
    score: S,
    index: u32,
}

impl<S: ScoreValue> PartialEq for Ranked<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<S: ScoreValue> Eq for Ranked<S> {}

impl<S: ScoreValue> PartialOrd for Ranked<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: ScoreValue> Ord for Ranked<S> {
    // Greater means ranked better.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .score_cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Keeps the best `n` (score, index) pairs pushed into it.
///
/// The heap is a min-heap on rank so the current worst entry is the one
/// compared against, giving `O(C log n)` for `C` pushes.
#[derive(Debug, Clone)]
pub struct TopN<S: ScoreValue> {
    n: usize,
    // Heap slots reserved up front, never more than can be pushed.
    reserve: usize,
    heap: BinaryHeap<Reverse<Ranked<S>>>,
}

impl<S: ScoreValue> TopN<S> {
    /// Selector that grows its heap on demand.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            reserve: 0,
            heap: BinaryHeap::new(),
        }
    }

    /// Selector over at most `num_candidates` distinct indices.
    ///
    /// Reserves `min(n, num_candidates)` slots, `n` may be far larger than
    /// what is ever kept.
    pub fn for_candidates(n: usize, num_candidates: usize) -> Self {
        let reserve = n.min(num_candidates).saturating_add(1);
        Self {
            n,
            reserve,
            heap: BinaryHeap::with_capacity(reserve),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.n
    }

    #[inline]
    pub fn push(&mut self, score: S, index: usize) {
        let item = Ranked {
            score,
            index: index as u32,
        };
        if self.heap.len() < self.n {
            self.heap.push(Reverse(item));
            return;
        }
        if let Some(mut worst) = self.heap.peek_mut() {
            if item > worst.0 {
                *worst = Reverse(item);
            }
        }
    }

    /// Writes the kept indices best-first into `out` and empties the
    /// selector. Slots beyond the number of kept entries get [`PADDING`].
    pub fn drain_into(&mut self, out: &mut [i32]) {
        let sorted = std::mem::take(&mut self.heap).into_sorted_vec();
        let mut written = 0;
        for (slot, Reverse(item)) in out.iter_mut().zip(sorted.iter()) {
            *slot = item.index as i32;
            written += 1;
        }
        out[written..].fill(PADDING);
        self.heap = BinaryHeap::with_capacity(self.reserve);
    }

    /// Same as [`Self::drain_into`] but also returns the kept scores.
    pub fn drain_scored(&mut self) -> Vec<(usize, S)> {
        let sorted = std::mem::take(&mut self.heap).into_sorted_vec();
        self.heap = BinaryHeap::with_capacity(self.reserve);
        sorted
            .into_iter()
            .map(|Reverse(x)| (x.index as usize, x.score))
            .collect()
    }
}

/// Top-N over a full score vector.
pub fn select_dense<S: ScoreValue>(scores: &[S], selector: &mut TopN<S>, out: &mut [i32]) {
    for (i, &s) in scores.iter().enumerate() {
        selector.push(s, i);
    }
    selector.drain_into(out);
}

/// Top-N when only `touched` entries of `scores` can be non-zero.
///
/// Non-positive scores are all exactly zero in that case, so after the
/// positive touched entries the remaining slots go to the lowest indices
/// with a zero score.
pub fn select_sparse<S: ScoreValue>(
    scores: &[S],
    touched: &[u32],
    selector: &mut TopN<S>,
    out: &mut [i32],
) {
    for &c in touched {
        let s = scores[c as usize];
        if s.is_positive() {
            selector.push(s, c as usize);
        }
    }
    if !selector.is_full() {
        for (i, s) in scores.iter().enumerate() {
            if selector.is_full() {
                break;
            }
            if !s.is_positive() {
                selector.push(*s, i);
            }
        }
    }
    selector.drain_into(out);
}
