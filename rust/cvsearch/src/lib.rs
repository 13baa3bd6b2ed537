#![doc = include_str!("../README.md")]

// Declare modules
pub mod backend;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod scoring;
pub mod selection;

// Re-export main structures
pub use crate::models::{
    Backend,
    CandidateMatrix,
    CpuMethod,
    EncodedInput,
    EncodingConfig,
    GpuMethod,
    NumericMode,
    SearchConfig,
    SparseRows,
    SpectrumBatch,
    Strategy,
};
pub use crate::scoring::score_spectrum;
pub use crate::selection::PADDING;

// Re-export errors
pub use crate::errors::{
    InputError,
    ReleaseError,
    Result,
    SearchError,
};

/// Ranked candidate indices of a whole search, `top_n` per spectrum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TopCandidates {
    top_n: usize,
    indices: Vec<i32>,
}

impl TopCandidates {
    pub fn new(indices: Vec<i32>, top_n: usize) -> Self {
        debug_assert!(top_n > 0 && indices.len() % top_n == 0);
        Self { top_n, indices }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn num_spectra(&self) -> usize {
        self.indices.len() / self.top_n.max(1)
    }

    /// Candidates of one spectrum, best first, padded with [`PADDING`].
    pub fn row(&self, spectrum: usize) -> &[i32] {
        &self.indices[spectrum * self.top_n..(spectrum + 1) * self.top_n]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[i32]> + '_ {
        self.indices.chunks(self.top_n.max(1))
    }

    /// The flat spectrum-major buffer.
    pub fn as_slice(&self) -> &[i32] {
        &self.indices
    }

    pub fn into_inner(self) -> Vec<i32> {
        self.indices
    }
}

/// Searches every spectrum against every candidate on the CPU.
pub fn search(
    candidates: &CandidateMatrix<'_>,
    spectra: &SpectrumBatch<'_>,
    config: &SearchConfig,
) -> Result<TopCandidates> {
    search_on(Backend::Cpu, candidates, spectra, config)
}

/// Same as [`search`] on an explicit backend.
pub fn search_on(
    backend: Backend,
    candidates: &CandidateMatrix<'_>,
    spectra: &SpectrumBatch<'_>,
    config: &SearchConfig,
) -> Result<TopCandidates> {
    let indices = backend::search(backend, candidates, spectra, config)?;
    Ok(TopCandidates::new(indices, config.top_n_usize()))
}

/// Validates an owned input against the config encoding and searches it.
pub fn search_encoded(
    input: &EncodedInput,
    config: &SearchConfig,
    backend: Backend,
) -> Result<TopCandidates> {
    config.validate()?;
    let candidates = input.candidates(&config.encoding)?;
    let spectra = input.spectra(&config.encoding)?;
    search_on(backend, &candidates, &spectra, config)
}
