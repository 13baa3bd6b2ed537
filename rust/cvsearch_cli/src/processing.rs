use std::time::{
    Duration,
    Instant,
};

use cvsearch::{
    CandidateMatrix,
    EncodedInput,
    EncodingConfig,
    NumericMode,
    SearchConfig,
    SpectrumBatch,
    TopCandidates,
};
use indicatif::{
    ProgressBar,
    ProgressIterator,
    ProgressStyle,
};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{
    info,
    warn,
};

use crate::config::{
    Config,
    Method,
};
use crate::errors::CliError;

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Random sorted rows of `peaks` distinct bins each.
///
/// Every row draws from its own generator seeded by `(seed, row)`, so the
/// data does not depend on how rayon splits the work.
fn random_rows(seed: u64, rows: usize, peaks: usize, encoding: &EncodingConfig) -> (Vec<i32>, Vec<i32>) {
    let size = encoding.encoding_size();
    let peaks = peaks.min(size);
    let rows: Vec<Vec<i32>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9).wrapping_add(row as u64));
            let mut bins: Vec<i32> = sample(&mut rng, size, peaks)
                .into_iter()
                .map(|x| x as i32)
                .collect();
            bins.sort_unstable();
            bins
        })
        .collect();

    let mut starts = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len() * peaks);
    for row in rows {
        starts.push(values.len() as i32);
        values.extend(row);
    }
    (values, starts)
}

/// Seeded synthetic search input.
pub fn synthetic_input(
    seed: u64,
    num_candidates: usize,
    num_spectra: usize,
    candidate_peaks: usize,
    spectrum_peaks: usize,
    encoding: &EncodingConfig,
) -> EncodedInput {
    let st = Instant::now();
    let (candidate_values, candidate_offsets) =
        random_rows(seed, num_candidates, candidate_peaks, encoding);
    let (spectrum_values, spectrum_offsets) =
        random_rows(seed.wrapping_add(1), num_spectra, spectrum_peaks, encoding);
    info!(
        "Generated {} candidates and {} spectra in {:?}",
        num_candidates,
        num_spectra,
        st.elapsed()
    );
    EncodedInput {
        candidate_values,
        candidate_offsets,
        candidate_weights: None,
        spectrum_values,
        spectrum_offsets,
    }
}

pub fn run_method(
    method: Method,
    input: &EncodedInput,
    search: &SearchConfig,
) -> Result<(TopCandidates, Duration), CliError> {
    let conf = method.apply(search.clone());
    let st = Instant::now();
    let res = cvsearch::search_encoded(input, &conf, method.backend())?;
    Ok((res, st.elapsed()))
}

#[derive(Debug, Clone)]
pub struct MethodReport {
    pub method: Method,
    pub elapsed: Duration,
    /// Share of spectra whose top-N rows equal the reference ones.
    pub agreement: f64,
}

fn row_agreement(a: &TopCandidates, b: &TopCandidates) -> f64 {
    let total = a.num_spectra().max(1);
    let same = a.rows().zip(b.rows()).filter(|(x, y)| x == y).count();
    same as f64 / total as f64
}

/// Runs every available method on `input`.
///
/// Each method is compared to the first method run in its numeric mode,
/// the dense vector CPU one. GPU methods are skipped when no device is
/// usable.
pub fn compare(input: &EncodedInput, search: &SearchConfig) -> Result<Vec<MethodReport>, CliError> {
    let gpu = cvsearch::backend::gpu_available();
    if !gpu {
        warn!("No usable GPU, comparing CPU methods only");
    }
    let methods: Vec<Method> = Method::all()
        .filter(|m| gpu || matches!(m, Method::Cpu(_)))
        .collect();

    let mut float_ref: Option<TopCandidates> = None;
    let mut int_ref: Option<TopCandidates> = None;
    let mut out = Vec::with_capacity(methods.len());
    for method in methods.into_iter().progress_with_style(progress_style()) {
        let (res, elapsed) = run_method(method, input, search)?;
        let slot = match method.apply(search.clone()).numeric {
            NumericMode::Float => &mut float_ref,
            NumericMode::Integer => &mut int_ref,
        };
        let agreement = slot.as_ref().map(|reference| row_agreement(reference, &res));
        if slot.is_none() {
            *slot = Some(res);
        }
        let agreement = agreement.unwrap_or(1.0);
        info!("{:<10} {:>12.3?} agreement {:.3}", method.to_string(), elapsed, agreement);
        out.push(MethodReport {
            method,
            elapsed,
            agreement,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct BenchReport {
    pub method: Method,
    pub runs: usize,
    pub mean: Duration,
    pub min: Duration,
}

/// Times `repeats` runs of one method.
pub fn bench(
    method: Method,
    input: &EncodedInput,
    search: &SearchConfig,
    repeats: usize,
) -> Result<BenchReport, CliError> {
    let repeats = repeats.max(1);
    let pb = ProgressBar::new(repeats as u64).with_style(progress_style());
    pb.set_message(method.to_string());
    let mut times = Vec::with_capacity(repeats);
    for _ in 0..repeats {
        let (_, elapsed) = run_method(method, input, search)?;
        times.push(elapsed);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let total: Duration = times.iter().sum();
    let min = times.iter().min().copied().unwrap_or_default();
    Ok(BenchReport {
        method,
        runs: repeats,
        mean: total / repeats as u32,
        min,
    })
}

const WORKED_CANDIDATE_VALUES: [i32; 16] = [1, 4, 0, 1, 2, 3, 1, 2, 3, 1, 4, 0, 1, 2, 3, 4];
const WORKED_CANDIDATE_STARTS: [i32; 5] = [0, 2, 6, 9, 11];
const WORKED_SPECTRUM_VALUES: [i32; 6] = [1, 2, 0, 1, 2, 4];
const WORKED_SPECTRUM_STARTS: [i32; 2] = [0, 2];
const WORKED_EXPECTED: [[i32; 5]; 2] = [[2, 0, 1, 3, 4], [0, 3, 4, 1, 2]];

/// Checks every available method on the hand-computed five candidate
/// example and returns the methods that passed.
pub fn deterministic(config: &Config) -> Result<Vec<Method>, CliError> {
    let encoding = EncodingConfig::new(5, 1);
    let candidates =
        CandidateMatrix::from_row_starts(&WORKED_CANDIDATE_VALUES, &WORKED_CANDIDATE_STARTS, &encoding)?;
    let spectra =
        SpectrumBatch::from_row_starts(&WORKED_SPECTRUM_VALUES, &WORKED_SPECTRUM_STARTS, &encoding)?;
    let search = SearchConfig {
        top_n: 5,
        tolerance: 0.0,
        normalize: true,
        use_gaussian: true,
        encoding,
        ..config.search.clone()
    };

    let gpu = cvsearch::backend::gpu_available();
    let mut passed = Vec::new();
    for method in Method::all().filter(|m| gpu || matches!(m, Method::Cpu(_))) {
        let conf = method.apply(search.clone());
        let res = cvsearch::search_on(method.backend(), &candidates, &spectra, &conf)?;
        for (spectrum, expected) in WORKED_EXPECTED.iter().enumerate() {
            if res.row(spectrum) != expected {
                return Err(CliError::Mismatch {
                    method: method.to_string(),
                    detail: format!(
                        "spectrum {} ranked {:?}, expected {:?}",
                        spectrum,
                        res.row(spectrum),
                        expected
                    ),
                });
            }
        }
        info!("{} ranks the worked example correctly", method);
        passed.push(method);
    }
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_input_is_seeded() {
        let enc = EncodingConfig::new(100, 10);
        let a = synthetic_input(1, 20, 5, 10, 30, &enc);
        let b = synthetic_input(1, 20, 5, 10, 30, &enc);
        assert_eq!(a, b);
        assert_eq!(a.num_candidates(), 20);
        assert_eq!(a.num_spectra(), 5);
        assert_eq!(a.candidate_values.len(), 200);
        assert!(a.candidates(&enc).is_ok());
        assert!(a.spectra(&enc).is_ok());
    }

    #[test]
    fn test_deterministic_passes_on_cpu() {
        let passed = deterministic(&Config::default()).unwrap();
        assert!(passed.len() >= 8);
    }

    #[test]
    fn test_compare_cpu_methods_agree() {
        let enc = EncodingConfig::new(100, 10);
        let input = synthetic_input(3, 50, 12, 20, 60, &enc);
        let search = SearchConfig {
            top_n: 5,
            batch_size: 5,
            encoding: enc,
            ..Default::default()
        };
        let reports = compare(&input, &search).unwrap();
        for r in reports.iter().filter(|r| matches!(r.method, Method::Cpu(_))) {
            assert_eq!(r.agreement, 1.0, "{}", r.method);
        }
    }
}
