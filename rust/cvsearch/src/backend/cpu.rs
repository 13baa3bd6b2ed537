use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{
    debug,
    info,
};

use crate::errors::{
    try_zeroed,
    Result,
    SearchError,
};
use crate::models::config::{
    NumericMode,
    SearchConfig,
};
use crate::models::sparse::{
    CandidateMatrix,
    SpectrumBatch,
};
use crate::scoring::{
    Arithmetic,
    FloatArithmetic,
    IntegerArithmetic,
    SearchContext,
};

/// Logs how many spectra are done every `interval` spectra.
#[derive(Debug)]
struct Progress {
    interval: Option<usize>,
    total: usize,
    done: AtomicUsize,
    start: Instant,
}

impl Progress {
    fn new(interval: Option<usize>, total: usize) -> Self {
        Self {
            interval,
            total,
            done: AtomicUsize::new(0),
            start: Instant::now(),
        }
    }

    fn advance(&self, count: usize) {
        let Some(interval) = self.interval else {
            return;
        };
        let before = self.done.fetch_add(count, Ordering::Relaxed);
        let after = before + count;
        if after / interval > before / interval {
            info!(
                "Searched {}/{} spectra ({:?} elapsed)",
                after,
                self.total,
                self.start.elapsed()
            );
        }
    }
}

fn build_pool(cores: i32) -> Result<rayon::ThreadPool> {
    let threads = if cores <= 0 { 0 } else { cores as usize };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("cvsearch-cpu-{}", i))
        .build()
        .map_err(|_| SearchError::AllocationFailure {
            bytes: 0,
            context: "worker pool",
        })
}

/// Runs the search on a dedicated pool of `config.cores` threads.
///
/// Returns `num_spectra * top_n` candidate indices, spectrum-major.
#[tracing::instrument(level = "debug", skip_all)]
pub fn search(
    candidates: &CandidateMatrix<'_>,
    spectra: &SpectrumBatch<'_>,
    config: &SearchConfig,
) -> Result<Vec<i32>> {
    config.validate()?;
    match config.numeric {
        NumericMode::Float => search_with::<FloatArithmetic>(candidates, spectra, config),
        NumericMode::Integer => search_with::<IntegerArithmetic>(candidates, spectra, config),
    }
}

fn search_with<A: Arithmetic>(
    candidates: &CandidateMatrix<'_>,
    spectra: &SpectrumBatch<'_>,
    config: &SearchConfig,
) -> Result<Vec<i32>> {
    let num_spectra = spectra.num_spectra();
    let top_n = config.top_n_usize();
    let out_len = num_spectra
        .checked_mul(top_n)
        .ok_or(SearchError::AllocationFailure {
            bytes: usize::MAX,
            context: "result buffer",
        })?;
    let mut out: Vec<i32> = try_zeroed(out_len, "result buffer")?;
    if num_spectra == 0 {
        return Ok(out);
    }

    let st = Instant::now();
    let ctx = SearchContext::<A>::new(candidates, config)?;
    debug!(
        "Prepared {} candidates for {:?} in {:?}",
        ctx.num_candidates(),
        ctx.strategy(),
        st.elapsed()
    );

    let pool = build_pool(config.cores)?;
    let per_task = ctx.spectra_per_task();
    let progress = Progress::new(config.progress_interval(), num_spectra);

    let st = Instant::now();
    pool.install(|| {
        out.par_chunks_mut(per_task * top_n)
            .enumerate()
            .try_for_each_init(
                || ctx.new_scratch(),
                |scratch, (task, chunk)| {
                    let scratch = scratch.as_mut().map_err(|e| e.clone())?;
                    let start = task * per_task;
                    let count = chunk.len() / top_n;
                    ctx.search_range(spectra, start..start + count, chunk, scratch);
                    progress.advance(count);
                    Ok::<(), SearchError>(())
                },
            )
    })?;

    let elapsed = st.elapsed();
    let throughput = num_spectra as f64 / elapsed.as_secs_f64().max(1e-9);
    info!(
        "Searched {} spectra against {} candidates with {:?}/{:?} on {} threads in {:?} ({:.1} spectra/s)",
        num_spectra,
        ctx.num_candidates(),
        ctx.strategy(),
        A::MODE,
        pool.current_num_threads(),
        elapsed,
        throughput
    );
    Ok(out)
}
