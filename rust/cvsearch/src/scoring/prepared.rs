use tracing::debug;

use super::arithmetic::Arithmetic;
use crate::errors::{
    try_zeroed,
    Result,
    SearchError,
};
use crate::models::sparse::CandidateMatrix;

/// Candidate matrix plus whatever a strategy needs precomputed.
///
/// Built once per search and shared read-only by every worker.
#[derive(Debug)]
pub struct PreparedCandidates<'c, A: Arithmetic> {
    matrix: &'c CandidateMatrix<'c>,
    // Quantized weights, indexed like the candidate values array.
    weights: Option<Vec<A::Weight>>,
    inverted: Option<InvertedIndex<A>>,
}

/// Column-major copy of the candidate matrix: for every bin, the candidates
/// that have a peak there, in ascending candidate order.
#[derive(Debug)]
pub struct InvertedIndex<A: Arithmetic> {
    offsets: Vec<u32>,
    candidates: Vec<u32>,
    weights: Vec<A::Weight>,
}

impl<A: Arithmetic> InvertedIndex<A> {
    fn build(
        matrix: &CandidateMatrix<'_>,
        weights: Option<&[A::Weight]>,
        encoding_size: usize,
    ) -> Result<Self> {
        let rows = matrix.rows();
        let nnz = rows.nnz();
        let mut offsets: Vec<u32> = try_zeroed(encoding_size + 1, "inverted index offsets")?;
        for peaks in rows.iter_rows() {
            for &bin in peaks {
                offsets[bin as usize + 1] += 1;
            }
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }

        let mut candidates: Vec<u32> = try_zeroed(nnz, "inverted index candidates")?;
        let mut inv_weights: Vec<A::Weight> = Vec::new();
        inv_weights
            .try_reserve_exact(nnz)
            .map_err(|_| SearchError::AllocationFailure {
                bytes: nnz * std::mem::size_of::<A::Weight>(),
                context: "inverted index weights",
            })?;
        inv_weights.resize(nnz, A::UNIT_WEIGHT);

        let mut cursor: Vec<u32> = offsets[..encoding_size].to_vec();
        for cand in 0..matrix.num_candidates() {
            for (pos, &bin) in rows.row_range(cand).zip(rows.row(cand).iter()) {
                let slot = &mut cursor[bin as usize];
                candidates[*slot as usize] = cand as u32;
                if let Some(w) = weights {
                    inv_weights[*slot as usize] = w[pos];
                }
                *slot += 1;
            }
        }

        debug!(
            "Built inverted candidate index over {} bins with {} entries",
            encoding_size, nnz
        );
        Ok(Self {
            offsets,
            candidates,
            weights: inv_weights,
        })
    }

    /// Candidates with a peak at `bin`, and their weights.
    #[inline]
    pub fn postings(&self, bin: u32) -> (&[u32], &[A::Weight]) {
        let lo = self.offsets[bin as usize] as usize;
        let hi = self.offsets[bin as usize + 1] as usize;
        (&self.candidates[lo..hi], &self.weights[lo..hi])
    }
}

impl<'c, A: Arithmetic> PreparedCandidates<'c, A> {
    pub fn new(
        matrix: &'c CandidateMatrix<'c>,
        with_inverted_index: bool,
        encoding_size: usize,
    ) -> Result<Self> {
        let weights = matrix
            .weights()
            .map(|w| w.iter().map(|&x| A::weight(x)).collect::<Vec<_>>());
        let inverted = if with_inverted_index {
            Some(InvertedIndex::build(
                matrix,
                weights.as_deref(),
                encoding_size,
            )?)
        } else {
            None
        };
        Ok(Self {
            matrix,
            weights,
            inverted,
        })
    }

    pub fn num_candidates(&self) -> usize {
        self.matrix.num_candidates()
    }

    #[inline]
    pub fn row(&self, cand: usize) -> &'c [i32] {
        self.matrix.rows().row(cand)
    }

    #[inline]
    pub fn row_len(&self, cand: usize) -> usize {
        self.matrix.rows().row_len(cand)
    }

    /// Quantized weights of a candidate row, `None` when all are unit.
    #[inline]
    pub fn row_weights(&self, cand: usize) -> Option<&[A::Weight]> {
        self.weights
            .as_ref()
            .map(|w| &w[self.matrix.rows().row_range(cand)])
    }

    pub fn inverted(&self) -> Option<&InvertedIndex<A>> {
        self.inverted.as_ref()
    }

    /// Unnormalized score of one candidate against a dense spectrum vector.
    #[inline]
    pub fn dot_dense(&self, cand: usize, dense: &[A::Value]) -> A::Score {
        let peaks = self.row(cand);
        let mut acc = A::Score::default();
        match self.row_weights(cand) {
            Some(w) => {
                for (&bin, &w) in peaks.iter().zip(w.iter()) {
                    acc = A::mul_add(acc, w, dense[bin as usize]);
                }
            }
            None => {
                for &bin in peaks {
                    acc = A::mul_add(acc, A::UNIT_WEIGHT, dense[bin as usize]);
                }
            }
        }
        acc
    }

    /// Unnormalized score of one candidate against a sorted sparse vector.
    #[inline]
    pub fn dot_sparse(&self, cand: usize, bins: &[u32], values: &[A::Value]) -> A::Score {
        let peaks = self.row(cand);
        let weights = self.row_weights(cand);
        let mut acc = A::Score::default();
        let (mut i, mut j) = (0, 0);
        while i < peaks.len() && j < bins.len() {
            let p = peaks[i] as u32;
            let b = bins[j];
            if p < b {
                i += 1;
            } else if p > b {
                j += 1;
            } else {
                let w = weights.map_or(A::UNIT_WEIGHT, |w| w[i]);
                acc = A::mul_add(acc, w, values[j]);
                i += 1;
                j += 1;
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::encoding::EncodingConfig;
    use crate::scoring::arithmetic::FloatArithmetic;

    #[test]
    fn test_inverted_index_postings() {
        let enc = EncodingConfig::new(5, 1);
        let values = [1, 4, 0, 1, 2, 3, 1, 2, 3];
        let weights = [0.5, 1.0, 1.0, 2.0, 1.0, 1.0, 3.0, 1.0, 1.0];
        let matrix = CandidateMatrix::from_csr(&[0, 2, 6, 9], &values, Some(&weights[..]), &enc).unwrap();
        let prepared = PreparedCandidates::<FloatArithmetic>::new(&matrix, true, 5).unwrap();
        let inv = prepared.inverted().unwrap();
        let (cands, w) = inv.postings(1);
        assert_eq!(cands, &[0, 1, 2]);
        assert_eq!(w, &[0.5, 2.0, 3.0]);
        let (cands, _) = inv.postings(4);
        assert_eq!(cands, &[0]);
    }

    #[test]
    fn test_dense_and_sparse_dot_agree() {
        let enc = EncodingConfig::new(10, 1);
        let values = [1, 4, 7, 2, 3];
        let matrix = CandidateMatrix::from_row_starts(&values, &[0, 3], &enc).unwrap();
        let prepared = PreparedCandidates::<FloatArithmetic>::new(&matrix, false, 10).unwrap();
        let bins = [1u32, 2, 7, 8];
        let vals = [0.5f32, 0.25, 1.0, 1.0];
        let mut dense = vec![0.0f32; 10];
        for (&b, &v) in bins.iter().zip(vals.iter()) {
            dense[b as usize] = v;
        }
        for cand in 0..2 {
            assert_eq!(
                prepared.dot_dense(cand, &dense),
                prepared.dot_sparse(cand, &bins, &vals)
            );
        }
        assert_eq!(prepared.dot_sparse(0, &bins, &vals), 1.5);
    }
}
