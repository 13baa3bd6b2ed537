//! The four CPU formulations of the spectrum x candidate product.
//!
//! Every strategy visits the peaks of a candidate in ascending bin order and
//! accumulates `weight * value` one term at a time, adding exact zeros for
//! unmatched peaks at most. Scores are therefore identical across
//! strategies, not just close.

use std::ops::Range;

use tracing::debug;

use super::arithmetic::Arithmetic;
use super::expanded::ExpandedSpectrum;
use super::kernel::MatchKernel;
use super::prepared::{
    InvertedIndex,
    PreparedCandidates,
};
use crate::errors::{
    try_zeroed,
    Result,
};
use crate::models::config::{
    SearchConfig,
    Strategy,
};
use crate::models::sparse::{
    CandidateMatrix,
    SpectrumBatch,
};
use crate::selection::{
    select_dense,
    select_sparse,
    TopN,
};

/// Upper bound for the dense block of one worker in the batched dense
/// strategy. The effective block width shrinks to fit it.
pub const DENSE_BLOCK_BYTES: usize = 64 * 1024 * 1024;

/// Per-worker buffers, reused across every spectrum the worker scores.
#[derive(Debug)]
pub struct Scratch<A: Arithmetic> {
    expanded: Vec<ExpandedSpectrum<A>>,
    scores: Vec<A::Score>,
    touched: Vec<u32>,
    marks: Vec<bool>,
    dense: Vec<A::Value>,
    accs: Vec<A::Score>,
    selectors: Vec<TopN<A::Score>>,
}

/// Everything shared by the workers of one search.
#[derive(Debug)]
pub struct SearchContext<'c, A: Arithmetic> {
    candidates: PreparedCandidates<'c, A>,
    kernel: MatchKernel,
    strategy: Strategy,
    top_n: usize,
    normalize: bool,
    encoding_size: usize,
    batch_size: usize,
    block_width: usize,
}

impl<'c, A: Arithmetic> SearchContext<'c, A> {
    pub fn new(candidates: &'c CandidateMatrix<'c>, config: &SearchConfig) -> Result<Self> {
        let strategy = config.strategy();
        let encoding_size = config.encoding.encoding_size();
        let prepared = PreparedCandidates::new(
            candidates,
            strategy == Strategy::BatchedSparse,
            encoding_size,
        )?;
        let batch_size = config.batch_size_usize();
        let per_spectrum = encoding_size.max(1) * std::mem::size_of::<A::Value>();
        let block_width = batch_size.min((DENSE_BLOCK_BYTES / per_spectrum).max(1));
        if strategy == Strategy::BatchedDense && block_width < batch_size {
            debug!(
                "Dense block capped at {} spectra (requested batch of {})",
                block_width, batch_size
            );
        }

        Ok(Self {
            candidates: prepared,
            kernel: config.kernel(),
            strategy,
            top_n: config.top_n_usize(),
            normalize: config.normalize,
            encoding_size,
            batch_size,
            block_width,
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn kernel(&self) -> &MatchKernel {
        &self.kernel
    }

    pub fn num_candidates(&self) -> usize {
        self.candidates.num_candidates()
    }

    /// Spectra handed to a worker at once.
    pub fn spectra_per_task(&self) -> usize {
        if self.strategy.is_batched() {
            self.batch_size
        } else {
            1
        }
    }

    pub fn new_scratch(&self) -> Result<Scratch<A>> {
        let num_candidates = self.num_candidates();
        // Only the dense block keeps one selector per spectrum, batched
        // sparse grows its expanded spectra to the batch it is handed.
        let (width, dense_len, score_len) = match self.strategy {
            Strategy::SparseVector => (1, 0, num_candidates),
            Strategy::DenseVector => (1, self.encoding_size, num_candidates),
            Strategy::BatchedSparse => (1, 0, num_candidates),
            Strategy::BatchedDense => (
                self.block_width,
                self.encoding_size * self.block_width,
                0,
            ),
        };
        let marks = if self.strategy == Strategy::BatchedSparse {
            try_zeroed(num_candidates, "touched candidate marks")?
        } else {
            Vec::new()
        };

        Ok(Scratch {
            expanded: (0..width).map(|_| ExpandedSpectrum::default()).collect(),
            scores: try_zeroed(score_len, "candidate scores")?,
            touched: Vec::new(),
            marks,
            dense: try_zeroed(dense_len, "dense spectrum buffer")?,
            accs: vec![A::Score::default(); width],
            selectors: (0..width)
                .map(|_| TopN::for_candidates(self.top_n, num_candidates))
                .collect(),
        })
    }

    /// Scores the spectra in `range` and writes their top-N rows to `out`.
    ///
    /// `out` holds `range.len() * top_n` slots, spectrum-major.
    pub fn search_range(
        &self,
        spectra: &SpectrumBatch<'_>,
        range: Range<usize>,
        out: &mut [i32],
        scratch: &mut Scratch<A>,
    ) {
        debug_assert_eq!(out.len(), range.len() * self.top_n);
        match self.strategy {
            Strategy::SparseVector => {
                for (spec, out) in range.zip(out.chunks_mut(self.top_n)) {
                    self.sparse_vector(spectra.peaks(spec), out, scratch);
                }
            }
            Strategy::DenseVector => {
                for (spec, out) in range.zip(out.chunks_mut(self.top_n)) {
                    self.dense_vector(spectra.peaks(spec), out, scratch);
                }
            }
            Strategy::BatchedSparse => match self.candidates.inverted() {
                Some(inv) => self.batched_sparse(inv, spectra, range, out, scratch),
                None => {
                    debug_assert!(false, "inverted index missing for batched sparse");
                    for (spec, out) in range.zip(out.chunks_mut(self.top_n)) {
                        self.sparse_vector(spectra.peaks(spec), out, scratch);
                    }
                }
            },
            Strategy::BatchedDense => {
                let step = self.block_width;
                let mut start = range.start;
                for block_out in out.chunks_mut(step * self.top_n) {
                    let end = (start + step).min(range.end);
                    self.batched_dense(spectra, start..end, block_out, scratch);
                    start = end;
                }
            }
        }
    }

    /// Full score vector of one spectrum, in candidate order.
    pub fn score_all(&self, peaks: &[i32], scratch: &mut Scratch<A>) -> Vec<A::Score> {
        let expanded = &mut scratch.expanded[0];
        expanded.rebuild(peaks, &self.kernel, self.encoding_size);
        (0..self.num_candidates())
            .map(|c| {
                let acc = self
                    .candidates
                    .dot_sparse(c, expanded.bins(), expanded.values());
                A::finish(acc, self.candidates.row_len(c), self.normalize)
            })
            .collect()
    }

    fn sparse_vector(&self, peaks: &[i32], out: &mut [i32], scratch: &mut Scratch<A>) {
        let expanded = &mut scratch.expanded[0];
        expanded.rebuild(peaks, &self.kernel, self.encoding_size);
        for (c, score) in scratch.scores.iter_mut().enumerate() {
            let acc = self
                .candidates
                .dot_sparse(c, expanded.bins(), expanded.values());
            *score = A::finish(acc, self.candidates.row_len(c), self.normalize);
        }
        select_dense(&scratch.scores, &mut scratch.selectors[0], out);
    }

    fn dense_vector(&self, peaks: &[i32], out: &mut [i32], scratch: &mut Scratch<A>) {
        let expanded = &mut scratch.expanded[0];
        expanded.rebuild(peaks, &self.kernel, self.encoding_size);
        expanded.scatter_into(&mut scratch.dense);
        for (c, score) in scratch.scores.iter_mut().enumerate() {
            let acc = self.candidates.dot_dense(c, &scratch.dense);
            *score = A::finish(acc, self.candidates.row_len(c), self.normalize);
        }
        expanded.clear_from(&mut scratch.dense);
        select_dense(&scratch.scores, &mut scratch.selectors[0], out);
    }

    /// Gustavson-style product of the expanded spectrum block with the
    /// inverted candidate index, one output row at a time.
    fn batched_sparse(
        &self,
        inv: &InvertedIndex<A>,
        spectra: &SpectrumBatch<'_>,
        range: Range<usize>,
        out: &mut [i32],
        scratch: &mut Scratch<A>,
    ) {
        let rows = range.len();
        if scratch.expanded.len() < rows {
            scratch
                .expanded
                .resize_with(rows, ExpandedSpectrum::default);
        }
        for (expanded, spec) in scratch.expanded.iter_mut().zip(range) {
            expanded.rebuild(spectra.peaks(spec), &self.kernel, self.encoding_size);
        }

        for (expanded, out) in scratch.expanded[..rows]
            .iter()
            .zip(out.chunks_mut(self.top_n))
        {
            for (&bin, &value) in expanded.bins().iter().zip(expanded.values()) {
                let (cands, weights) = inv.postings(bin);
                for (&c, &w) in cands.iter().zip(weights) {
                    let c = c as usize;
                    if !scratch.marks[c] {
                        scratch.marks[c] = true;
                        scratch.touched.push(c as u32);
                    }
                    scratch.scores[c] = A::mul_add(scratch.scores[c], w, value);
                }
            }

            for &c in scratch.touched.iter() {
                let c = c as usize;
                scratch.scores[c] =
                    A::finish(scratch.scores[c], self.candidates.row_len(c), self.normalize);
            }
            select_sparse(
                &scratch.scores,
                &scratch.touched,
                &mut scratch.selectors[0],
                out,
            );

            for &c in scratch.touched.iter() {
                scratch.scores[c as usize] = A::Score::default();
                scratch.marks[c as usize] = false;
            }
            scratch.touched.clear();
        }
    }

    /// Candidate rows against a dense bin-major block of spectra, so that
    /// every candidate peak reads one contiguous run of values.
    fn batched_dense(
        &self,
        spectra: &SpectrumBatch<'_>,
        range: Range<usize>,
        out: &mut [i32],
        scratch: &mut Scratch<A>,
    ) {
        let stride = self.block_width;
        let width = range.len();
        for (j, spec) in range.enumerate() {
            let expanded = &mut scratch.expanded[j];
            expanded.rebuild(spectra.peaks(spec), &self.kernel, self.encoding_size);
            for (&bin, &value) in expanded.bins().iter().zip(expanded.values()) {
                scratch.dense[bin as usize * stride + j] = value;
            }
        }

        let accs = &mut scratch.accs[..width];
        for c in 0..self.num_candidates() {
            accs.fill(A::Score::default());
            let peaks = self.candidates.row(c);
            let weights = self.candidates.row_weights(c);
            for (k, &bin) in peaks.iter().enumerate() {
                let w = weights.map_or(A::UNIT_WEIGHT, |w| w[k]);
                let start = bin as usize * stride;
                let block_row = &scratch.dense[start..start + width];
                for (acc, &value) in accs.iter_mut().zip(block_row) {
                    *acc = A::mul_add(*acc, w, value);
                }
            }
            let len = self.candidates.row_len(c);
            for (selector, &acc) in scratch.selectors.iter_mut().zip(accs.iter()) {
                selector.push(A::finish(acc, len, self.normalize), c);
            }
        }

        for ((j, selector), out) in scratch.selectors[..width]
            .iter_mut()
            .enumerate()
            .zip(out.chunks_mut(self.top_n))
        {
            selector.drain_into(out);
            for &bin in scratch.expanded[j].bins() {
                scratch.dense[bin as usize * stride + j] = A::Value::default();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::encoding::EncodingConfig;
    use crate::scoring::arithmetic::FloatArithmetic;

    fn config(strategy: Strategy) -> SearchConfig {
        SearchConfig {
            top_n: 3,
            tolerance: 1.0,
            batch_size: 2,
            encoding: EncodingConfig::new(20, 1),
            ..Default::default()
        }
        .with_strategy(strategy)
    }

    #[test]
    fn test_strategies_agree_on_small_input() {
        let enc = EncodingConfig::new(20, 1);
        let cand_values = [1, 5, 9, 2, 3, 4, 10, 11, 12, 13, 19];
        let cand_starts = [0, 3, 6, 10];
        let spec_values = [4, 11, 0, 19, 3, 9, 12];
        let spec_starts = [0, 2, 2, 4];
        let cands = CandidateMatrix::from_row_starts(&cand_values, &cand_starts, &enc).unwrap();
        let spectra = SpectrumBatch::from_row_starts(&spec_values, &spec_starts, &enc).unwrap();

        let mut reference: Option<Vec<i32>> = None;
        for strategy in Strategy::ALL {
            let ctx = SearchContext::<FloatArithmetic>::new(&cands, &config(strategy)).unwrap();
            let mut scratch = ctx.new_scratch().unwrap();
            let mut out = vec![0i32; 4 * 3];
            let per_task = ctx.spectra_per_task();
            let mut start = 0;
            for chunk in out.chunks_mut(per_task * 3) {
                let end = start + chunk.len() / 3;
                ctx.search_range(&spectra, start..end, chunk, &mut scratch);
                start = end;
            }
            match &reference {
                None => reference = Some(out),
                Some(r) => assert_eq!(r, &out, "{:?}", strategy),
            }
        }
    }

    #[test]
    fn test_no_candidates_pads() {
        let enc = EncodingConfig::new(20, 1);
        let cands = CandidateMatrix::from_row_starts(&[], &[], &enc).unwrap();
        let spectra = SpectrumBatch::from_row_starts(&[1, 2], &[0], &enc).unwrap();
        for strategy in Strategy::ALL {
            let ctx = SearchContext::<FloatArithmetic>::new(&cands, &config(strategy)).unwrap();
            let mut scratch = ctx.new_scratch().unwrap();
            let mut out = vec![0i32; 3];
            ctx.search_range(&spectra, 0..1, &mut out, &mut scratch);
            assert_eq!(out, vec![-1, -1, -1]);
        }
    }
}
