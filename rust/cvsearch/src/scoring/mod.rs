pub mod arithmetic;
pub mod expanded;
pub mod kernel;
pub mod prepared;
pub mod strategies;

pub use arithmetic::{
    Arithmetic,
    FloatArithmetic,
    IntegerArithmetic,
    ScoreValue,
};
pub use expanded::ExpandedSpectrum;
pub use kernel::MatchKernel;
pub use strategies::{
    Scratch,
    SearchContext,
};

use crate::errors::Result;
use crate::models::config::{
    NumericMode,
    SearchConfig,
    Strategy,
};
use crate::models::sparse::{
    CandidateMatrix,
    SpectrumBatch,
};

/// Scores of every candidate against one spectrum, as f64 regardless of
/// the numeric mode (integer scores keep their thousandths scale).
pub fn score_spectrum(
    candidates: &CandidateMatrix<'_>,
    peaks: &[i32],
    config: &SearchConfig,
) -> Result<Vec<f64>> {
    config.validate()?;
    SpectrumBatch::from_row_starts(peaks, &[0], &config.encoding)?;
    match config.numeric {
        NumericMode::Float => score_with::<FloatArithmetic>(candidates, peaks, config),
        NumericMode::Integer => score_with::<IntegerArithmetic>(candidates, peaks, config),
    }
}

fn score_with<A: Arithmetic>(
    candidates: &CandidateMatrix<'_>,
    peaks: &[i32],
    config: &SearchConfig,
) -> Result<Vec<f64>> {
    // Only the single-vector buffers are needed here.
    let conf = config.clone().with_strategy(Strategy::SparseVector);
    let ctx = SearchContext::<A>::new(candidates, &conf)?;
    let mut scratch = ctx.new_scratch()?;
    Ok(ctx
        .score_all(peaks, &mut scratch)
        .iter()
        .map(|s| s.as_f64())
        .collect())
}
