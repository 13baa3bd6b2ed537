//! Borrowed CSR views over the caller's flattened peak arrays.
//!
//! Callers hand over one flat array of encoded bins plus an index array.
//! Two index layouts are accepted:
//!
//! - **Row starts**: one entry per row, the end of the last row is implied
//!   by the length of the values array.
//! - **CSR row offsets**: `rows + 1` entries, the trailing one must equal
//!   the number of stored values.
//!
//! Both are normalized into `rows + 1` offsets. The values themselves are
//! only borrowed, nothing outlives the search call.

use crate::errors::{
    InputError,
    InputKind,
    Result,
};
use crate::models::encoding::EncodingConfig;

#[derive(Debug, Clone)]
pub struct SparseRows<'a> {
    values: &'a [i32],
    offsets: Vec<usize>,
    kind: InputKind,
}

impl<'a> SparseRows<'a> {
    /// Builds the view from per-row start indices.
    pub fn from_row_starts(
        values: &'a [i32],
        starts: &[i32],
        kind: InputKind,
        encoding: &EncodingConfig,
    ) -> Result<Self> {
        let mut offsets = Vec::with_capacity(starts.len() + 1);
        for &start in starts {
            offsets.push(check_offset(start as i64, values.len(), kind)?);
        }
        offsets.push(values.len());
        let out = Self {
            values,
            offsets,
            kind,
        };
        out.validate(encoding)?;
        Ok(out)
    }

    /// Builds the view from CSR row offsets (`rows + 1` entries).
    pub fn from_csr(
        row_offsets: &[i32],
        values: &'a [i32],
        kind: InputKind,
        encoding: &EncodingConfig,
    ) -> Result<Self> {
        let last = match row_offsets.last() {
            Some(&x) => x as i64,
            None => {
                return Err(InputError::MissingTrailingOffset {
                    expected: values.len(),
                    found: -1,
                }
                .into());
            }
        };
        if last != values.len() as i64 {
            return Err(InputError::MissingTrailingOffset {
                expected: values.len(),
                found: last,
            }
            .into());
        }
        let offsets = row_offsets
            .iter()
            .map(|&x| check_offset(x as i64, values.len(), kind))
            .collect::<Result<Vec<usize>>>()?;
        let out = Self {
            values,
            offsets,
            kind,
        };
        out.validate(encoding)?;
        Ok(out)
    }

    fn validate(&self, encoding: &EncodingConfig) -> Result<()> {
        for (row, w) in self.offsets.windows(2).enumerate() {
            if w[1] < w[0] {
                return Err(InputError::NonMonotonicOffsets {
                    kind: self.kind,
                    row: row + 1,
                }
                .into());
            }
        }

        for row in 0..self.num_rows() {
            let peaks = self.row(row);
            if let Some(&bad) = peaks.iter().find(|&&b| !encoding.contains(b as i64)) {
                return Err(InputError::BinOutOfRange {
                    kind: self.kind,
                    row,
                    bin: bad as i64,
                    encoding_size: encoding.encoding_size(),
                }
                .into());
            }
            if peaks.windows(2).any(|w| w[1] <= w[0]) {
                return Err(InputError::UnsortedRow {
                    kind: self.kind,
                    row,
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn nnz(&self) -> usize {
        self.offsets[self.num_rows()] - self.offsets[0]
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    #[inline]
    pub fn row(&self, row: usize) -> &'a [i32] {
        &self.values[self.offsets[row]..self.offsets[row + 1]]
    }

    #[inline]
    pub fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        self.offsets[row]..self.offsets[row + 1]
    }

    pub fn row_len(&self, row: usize) -> usize {
        self.offsets[row + 1] - self.offsets[row]
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn values(&self) -> &'a [i32] {
        self.values
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn iter_rows(&self) -> impl ExactSizeIterator<Item = &'a [i32]> + '_ {
        (0..self.num_rows()).map(move |i| self.row(i))
    }
}

fn check_offset(offset: i64, len: usize, kind: InputKind) -> Result<usize> {
    if offset < 0 || offset as u64 > len as u64 {
        return Err(InputError::OffsetOutOfBounds { kind, offset, len }.into());
    }
    Ok(offset as usize)
}

/// The theoretical side of the search: one row per candidate.
///
/// Rows may carry explicit per-peak weights (the `values` array of a CSR
/// matrix); without them every matched peak counts as one.
#[derive(Debug, Clone)]
pub struct CandidateMatrix<'a> {
    rows: SparseRows<'a>,
    weights: Option<&'a [f32]>,
}

impl<'a> CandidateMatrix<'a> {
    pub fn from_row_starts(
        values: &'a [i32],
        starts: &[i32],
        encoding: &EncodingConfig,
    ) -> Result<Self> {
        Ok(Self {
            rows: SparseRows::from_row_starts(values, starts, InputKind::Candidates, encoding)?,
            weights: None,
        })
    }

    pub fn from_csr(
        row_offsets: &[i32],
        col_index: &'a [i32],
        weights: Option<&'a [f32]>,
        encoding: &EncodingConfig,
    ) -> Result<Self> {
        let rows = SparseRows::from_csr(row_offsets, col_index, InputKind::Candidates, encoding)?;
        if let Some(w) = weights {
            if w.len() != col_index.len() {
                return Err(InputError::WeightLengthMismatch {
                    expected: col_index.len(),
                    other: w.len(),
                }
                .into());
            }
            // Negative weights would break the zero floor the sparse top-N relies on.
            if let Some((index, &value)) = w
                .iter()
                .enumerate()
                .find(|(_, x)| !x.is_finite() || **x < 0.0)
            {
                return Err(InputError::InvalidWeight { index, value }.into());
            }
        }
        Ok(Self { rows, weights })
    }

    pub fn rows(&self) -> &SparseRows<'a> {
        &self.rows
    }

    pub fn num_candidates(&self) -> usize {
        self.rows.num_rows()
    }

    /// Weights aligned with [`SparseRows::row`] for the given candidate.
    #[inline]
    pub fn row_weights(&self, row: usize) -> Option<&'a [f32]> {
        self.weights.map(|w| &w[self.rows.row_range(row)])
    }

    pub fn weights(&self) -> Option<&'a [f32]> {
        self.weights
    }
}

/// The experimental side of the search: one row per spectrum.
#[derive(Debug, Clone)]
pub struct SpectrumBatch<'a> {
    rows: SparseRows<'a>,
}

impl<'a> SpectrumBatch<'a> {
    pub fn from_row_starts(
        values: &'a [i32],
        starts: &[i32],
        encoding: &EncodingConfig,
    ) -> Result<Self> {
        Ok(Self {
            rows: SparseRows::from_row_starts(values, starts, InputKind::Spectra, encoding)?,
        })
    }

    pub fn rows(&self) -> &SparseRows<'a> {
        &self.rows
    }

    pub fn num_spectra(&self) -> usize {
        self.rows.num_rows()
    }

    #[inline]
    pub fn peaks(&self, spectrum: usize) -> &'a [i32] {
        self.rows.row(spectrum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SearchError;

    fn enc() -> EncodingConfig {
        EncodingConfig::new(5, 1)
    }

    #[test]
    fn test_row_starts_and_csr_agree() {
        let values = [1, 4, 0, 1, 2, 3, 1, 2, 3];
        let starts = [0, 2, 6];
        let csr = [0, 2, 6, 9];
        let a = SparseRows::from_row_starts(&values, &starts, InputKind::Candidates, &enc()).unwrap();
        let b = SparseRows::from_csr(&csr, &values, InputKind::Candidates, &enc()).unwrap();
        assert_eq!(a.offsets(), b.offsets());
        assert_eq!(a.num_rows(), 3);
        assert_eq!(a.row(1), &[0, 1, 2, 3]);
        assert_eq!(a.row_len(2), 3);
        assert_eq!(a.nnz(), 9);
    }

    #[test]
    fn test_empty_rows_are_allowed() {
        let values = [1, 2];
        let starts = [0, 0, 2];
        let rows = SparseRows::from_row_starts(&values, &starts, InputKind::Spectra, &enc()).unwrap();
        assert_eq!(rows.row(0), &[] as &[i32]);
        assert_eq!(rows.row(1), &[1, 2]);
        assert_eq!(rows.row(2), &[] as &[i32]);
    }

    #[test]
    fn test_non_monotonic_offsets_rejected() {
        let values = [1, 2, 3];
        let starts = [0, 2, 1];
        let out = SparseRows::from_row_starts(&values, &starts, InputKind::Spectra, &enc());
        assert!(matches!(
            out,
            Err(SearchError::InvalidInput(InputError::NonMonotonicOffsets { row: 2, .. }))
        ));
    }

    #[test]
    fn test_unsorted_and_out_of_range_rows_rejected() {
        let out = SparseRows::from_row_starts(&[2, 1], &[0], InputKind::Spectra, &enc());
        assert!(matches!(
            out,
            Err(SearchError::InvalidInput(InputError::UnsortedRow { row: 0, .. }))
        ));
        let out = SparseRows::from_row_starts(&[1, 5], &[0], InputKind::Spectra, &enc());
        assert!(matches!(
            out,
            Err(SearchError::InvalidInput(InputError::BinOutOfRange { bin: 5, .. }))
        ));
    }

    #[test]
    fn test_csr_requires_trailing_nnz() {
        let values = [1, 2, 3];
        let out = SparseRows::from_csr(&[0, 2], &values, InputKind::Candidates, &enc());
        assert!(matches!(
            out,
            Err(SearchError::InvalidInput(InputError::MissingTrailingOffset { expected: 3, found: 2 }))
        ));
    }

    #[test]
    fn test_weight_length_checked() {
        let values = [1, 2, 3];
        let weights = [1.0, 1.0];
        let out = CandidateMatrix::from_csr(&[0, 3], &values, Some(&weights[..]), &enc());
        assert!(matches!(
            out,
            Err(SearchError::InvalidInput(InputError::WeightLengthMismatch { .. }))
        ));
        let weights = [1.0, -0.5, 1.0];
        let out = CandidateMatrix::from_csr(&[0, 3], &values, Some(&weights[..]), &enc());
        assert!(matches!(
            out,
            Err(SearchError::InvalidInput(InputError::InvalidWeight { index: 1, .. }))
        ));
    }
}
