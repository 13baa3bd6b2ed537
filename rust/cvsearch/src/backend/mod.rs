pub mod cpu;
#[cfg(feature = "webgpu")]
pub mod webgpu;

use crate::errors::Result;
use crate::models::config::{
    Backend,
    SearchConfig,
};
use crate::models::sparse::{
    CandidateMatrix,
    SpectrumBatch,
};

/// Runs the search on the requested backend.
pub fn search(
    backend: Backend,
    candidates: &CandidateMatrix<'_>,
    spectra: &SpectrumBatch<'_>,
    config: &SearchConfig,
) -> Result<Vec<i32>> {
    match backend {
        Backend::Cpu => cpu::search(candidates, spectra, config),
        Backend::Gpu => gpu_search(candidates, spectra, config),
    }
}

#[cfg(feature = "webgpu")]
fn gpu_search(
    candidates: &CandidateMatrix<'_>,
    spectra: &SpectrumBatch<'_>,
    config: &SearchConfig,
) -> Result<Vec<i32>> {
    webgpu::shared_engine()?.search(candidates, spectra, config)
}

#[cfg(not(feature = "webgpu"))]
fn gpu_search(
    _candidates: &CandidateMatrix<'_>,
    _spectra: &SpectrumBatch<'_>,
    config: &SearchConfig,
) -> Result<Vec<i32>> {
    config.validate()?;
    Err(crate::errors::SearchError::device(
        "cvsearch was built without the `webgpu` feature",
    ))
}

/// Whether a GPU search can run in this process.
pub fn gpu_available() -> bool {
    #[cfg(feature = "webgpu")]
    {
        webgpu::shared_engine().is_ok()
    }
    #[cfg(not(feature = "webgpu"))]
    {
        false
    }
}
