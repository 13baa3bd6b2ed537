use serde::{
    Deserialize,
    Serialize,
};

use super::encoding::EncodingConfig;
use super::sparse::{
    CandidateMatrix,
    SpectrumBatch,
};
use crate::errors::Result;

/// Owned, already-encoded search input as read from a JSON file.
///
/// `candidate_offsets` and `spectrum_offsets` hold row starts. When
/// `candidate_weights` is present the candidate offsets are read as full
/// CSR row offsets instead (`rows + 1` entries).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EncodedInput {
    pub candidate_values: Vec<i32>,
    pub candidate_offsets: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_weights: Option<Vec<f32>>,
    pub spectrum_values: Vec<i32>,
    pub spectrum_offsets: Vec<i32>,
}

impl EncodedInput {
    pub fn candidates(&self, encoding: &EncodingConfig) -> Result<CandidateMatrix<'_>> {
        match &self.candidate_weights {
            Some(weights) => CandidateMatrix::from_csr(
                &self.candidate_offsets,
                &self.candidate_values,
                Some(weights.as_slice()),
                encoding,
            ),
            None => CandidateMatrix::from_row_starts(
                &self.candidate_values,
                &self.candidate_offsets,
                encoding,
            ),
        }
    }

    pub fn spectra(&self, encoding: &EncodingConfig) -> Result<SpectrumBatch<'_>> {
        SpectrumBatch::from_row_starts(&self.spectrum_values, &self.spectrum_offsets, encoding)
    }

    /// Candidate row offsets in CSR form, as the GPU entry point wants them.
    pub fn candidate_csr_offsets(&self) -> Vec<i32> {
        if self.candidate_weights.is_some() {
            return self.candidate_offsets.clone();
        }
        let mut out = self.candidate_offsets.clone();
        out.push(self.candidate_values.len() as i32);
        out
    }

    pub fn num_spectra(&self) -> usize {
        self.spectrum_offsets.len()
    }

    pub fn num_candidates(&self) -> usize {
        if self.candidate_weights.is_some() {
            self.candidate_offsets.len().saturating_sub(1)
        } else {
            self.candidate_offsets.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_input() {
        let text = r#"{
            "candidate_values": [1, 4, 0, 1, 2, 3],
            "candidate_offsets": [0, 2],
            "spectrum_values": [1, 2],
            "spectrum_offsets": [0]
        }"#;
        let input: EncodedInput = serde_json::from_str(text).unwrap();
        let enc = EncodingConfig::new(5, 1);
        assert_eq!(input.num_candidates(), 2);
        assert_eq!(input.candidates(&enc).unwrap().num_candidates(), 2);
        assert_eq!(input.spectra(&enc).unwrap().num_spectra(), 1);
        assert_eq!(input.candidate_csr_offsets(), vec![0, 2, 6]);
    }

    #[test]
    fn test_weighted_input_is_csr() {
        let input = EncodedInput {
            candidate_values: vec![1, 4, 0],
            candidate_offsets: vec![0, 2, 3],
            candidate_weights: Some(vec![0.5, 1.0, 2.0]),
            spectrum_values: vec![],
            spectrum_offsets: vec![],
        };
        let enc = EncodingConfig::new(5, 1);
        let cands = input.candidates(&enc).unwrap();
        assert_eq!(cands.num_candidates(), 2);
        assert_eq!(cands.row_weights(0), Some(&[0.5f32, 1.0][..]));
        assert_eq!(input.candidate_csr_offsets(), vec![0, 2, 3]);
    }
}
