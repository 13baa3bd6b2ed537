//! C ABI for cvsearch.
//!
//! Every compute call returns a pointer to `num_spectra * top_n` candidate
//! indices (spectrum-major, `-1` padded) that stays valid until it is handed
//! back to the release function of the same backend. A failed compute call
//! returns null, the reason is available from [`cvs_last_status`] on the
//! same thread.

use std::cell::Cell;
use std::slice;

use cvsearch::backend;
use cvsearch::errors::{
    InputError,
    Result,
    STATUS_OK,
};
use cvsearch::lifecycle::{
    ResultRegistry,
    CPU_RESULTS,
    GPU_RESULTS,
};
use cvsearch::{
    Backend,
    CandidateMatrix,
    EncodingConfig,
    NumericMode,
    SearchConfig,
    SpectrumBatch,
};
use tracing::warn;

thread_local! {
    static LAST_STATUS: Cell<i32> = const { Cell::new(STATUS_OK) };
}

/// Search options, mirrored from [`SearchConfig`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CvsOptions {
    pub top_n: i32,
    /// Matching tolerance in daltons.
    pub tolerance: f32,
    pub normalize: bool,
    pub use_gaussian: bool,
    pub batched: bool,
    pub sparse: bool,
    /// Integer arithmetic, CPU only.
    pub use_int: bool,
    /// Worker threads, `<= 0` for all cores.
    pub cores: i32,
    pub batch_size: i32,
    /// Progress log interval in spectra, `0` is silent.
    pub verbose: i32,
    pub mass_range: u32,
    pub mass_multiplier: u32,
}

impl From<&SearchConfig> for CvsOptions {
    fn from(conf: &SearchConfig) -> Self {
        Self {
            top_n: conf.top_n,
            tolerance: conf.tolerance,
            normalize: conf.normalize,
            use_gaussian: conf.use_gaussian,
            batched: conf.batched,
            sparse: conf.sparse,
            use_int: conf.numeric == NumericMode::Integer,
            cores: conf.cores,
            batch_size: conf.batch_size,
            verbose: conf.verbose,
            mass_range: conf.encoding.mass_range,
            mass_multiplier: conf.encoding.mass_multiplier,
        }
    }
}

impl From<&CvsOptions> for SearchConfig {
    fn from(opts: &CvsOptions) -> Self {
        Self {
            top_n: opts.top_n,
            tolerance: opts.tolerance,
            normalize: opts.normalize,
            use_gaussian: opts.use_gaussian,
            batched: opts.batched,
            sparse: opts.sparse,
            numeric: if opts.use_int {
                NumericMode::Integer
            } else {
                NumericMode::Float
            },
            cores: opts.cores,
            batch_size: opts.batch_size,
            verbose: opts.verbose,
            encoding: EncodingConfig::new(opts.mass_range, opts.mass_multiplier),
        }
    }
}

/// Default options (top 20, 0.02 Da, normalized Gaussian, 5000 Da x 100).
#[no_mangle]
pub extern "C" fn cvs_default_options() -> CvsOptions {
    CvsOptions::from(&SearchConfig::default())
}

/// Status of the last compute or release call made on this thread.
///
/// `0` ok, `1` invalid input, `2` allocation failure, `3` device failure,
/// `4` release failure.
#[no_mangle]
pub extern "C" fn cvs_last_status() -> i32 {
    LAST_STATUS.with(|s| s.get())
}

fn set_status(status: i32) {
    LAST_STATUS.with(|s| s.set(status));
}

/// Borrows a caller array, a null pointer is only accepted for length 0.
///
/// # Safety
///
/// A non-null `ptr` must point to `len` initialized values that outlive
/// the returned slice.
unsafe fn borrow<'a, T>(ptr: *const T, len: usize, argument: &'static str) -> Result<&'a [T]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(InputError::NullPointer { argument }.into());
    }
    Ok(slice::from_raw_parts(ptr, len))
}

fn finish(result: Result<Vec<i32>>, registry: &ResultRegistry) -> *mut i32 {
    match result {
        Ok(data) => {
            set_status(STATUS_OK);
            registry.register(data)
        }
        Err(e) => {
            warn!("{} compute failed: {}", registry.name(), e);
            set_status(e.status_code());
            std::ptr::null_mut()
        }
    }
}

fn release(registry: &ResultRegistry, ptr: *const i32) -> i32 {
    let status = match registry.release(ptr) {
        Ok(()) => STATUS_OK,
        Err(e) => e.status_code(),
    };
    set_status(status);
    status
}

/// Searches on the CPU.
///
/// Candidates and spectra are flattened sorted bin arrays, each with one
/// start index per row (`num_candidates` and `num_spectra` entries).
///
/// # Safety
///
/// Every non-null pointer must reference the number of elements given by
/// its length argument, and `options` must point to a valid [`CvsOptions`].
#[no_mangle]
pub unsafe extern "C" fn cvs_compute(
    candidate_values: *const i32,
    candidate_values_len: usize,
    candidate_starts: *const i32,
    num_candidates: usize,
    spectrum_values: *const i32,
    spectrum_values_len: usize,
    spectrum_starts: *const i32,
    num_spectra: usize,
    options: *const CvsOptions,
) -> *mut i32 {
    let result = (|| -> Result<Vec<i32>> {
        let conf = options_arg(options)?;
        let candidates = CandidateMatrix::from_row_starts(
            borrow(candidate_values, candidate_values_len, "candidate_values")?,
            borrow(candidate_starts, num_candidates, "candidate_starts")?,
            &conf.encoding,
        )?;
        let spectra = spectra_arg(
            spectrum_values,
            spectrum_values_len,
            spectrum_starts,
            num_spectra,
            &conf,
        )?;
        backend::search(Backend::Cpu, &candidates, &spectra, &conf)
    })();
    finish(result, &CPU_RESULTS)
}

/// Searches on the GPU with the candidates as a CSR matrix.
///
/// `row_offsets` holds `num_candidates + 1` entries into `col_index`.
/// `weights` may be null for unit weights, otherwise it holds one weight
/// per `col_index` entry.
///
/// # Safety
///
/// Same requirements as [`cvs_compute`].
#[no_mangle]
pub unsafe extern "C" fn cvs_compute_gpu(
    row_offsets: *const i32,
    num_candidates: usize,
    col_index: *const i32,
    nnz: usize,
    weights: *const f32,
    spectrum_values: *const i32,
    spectrum_values_len: usize,
    spectrum_starts: *const i32,
    num_spectra: usize,
    options: *const CvsOptions,
) -> *mut i32 {
    let result = (|| -> Result<Vec<i32>> {
        let conf = options_arg(options)?;
        let weights = if weights.is_null() {
            None
        } else {
            Some(borrow(weights, nnz, "weights")?)
        };
        let candidates = CandidateMatrix::from_csr(
            borrow(row_offsets, num_candidates.saturating_add(1), "row_offsets")?,
            borrow(col_index, nnz, "col_index")?,
            weights,
            &conf.encoding,
        )?;
        let spectra = spectra_arg(
            spectrum_values,
            spectrum_values_len,
            spectrum_starts,
            num_spectra,
            &conf,
        )?;
        backend::search(Backend::Gpu, &candidates, &spectra, &conf)
    })();
    finish(result, &GPU_RESULTS)
}

unsafe fn options_arg(options: *const CvsOptions) -> Result<SearchConfig> {
    match options.as_ref() {
        Some(opts) => {
            let conf = SearchConfig::from(opts);
            conf.validate()?;
            Ok(conf)
        }
        None => Err(InputError::NullPointer {
            argument: "options",
        }
        .into()),
    }
}

unsafe fn spectra_arg<'a>(
    values: *const i32,
    values_len: usize,
    starts: *const i32,
    num_spectra: usize,
    conf: &SearchConfig,
) -> Result<SpectrumBatch<'a>> {
    SpectrumBatch::from_row_starts(
        borrow(values, values_len, "spectrum_values")?,
        borrow(starts, num_spectra, "spectrum_starts")?,
        &conf.encoding,
    )
}

/// Frees a result of [`cvs_compute`]. Returns `0`, or `4` for a null,
/// unknown or already released pointer.
#[no_mangle]
pub extern "C" fn cvs_release(result: *const i32) -> i32 {
    release(&CPU_RESULTS, result)
}

/// Frees a result of [`cvs_compute_gpu`].
#[no_mangle]
pub extern "C" fn cvs_release_gpu(result: *const i32) -> i32 {
    release(&GPU_RESULTS, result)
}

/// Number of results of one backend not released yet.
#[no_mangle]
pub extern "C" fn cvs_live_results(gpu: bool) -> usize {
    if gpu {
        GPU_RESULTS.live_count()
    } else {
        CPU_RESULTS.live_count()
    }
}

#[no_mangle]
pub extern "C" fn cvs_gpu_available() -> bool {
    backend::gpu_available()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_round_trip_through_config() {
        let opts = CvsOptions {
            use_int: true,
            batched: true,
            top_n: 3,
            ..cvs_default_options()
        };
        let conf = SearchConfig::from(&opts);
        assert_eq!(conf.numeric, NumericMode::Integer);
        assert_eq!(conf.strategy(), cvsearch::Strategy::BatchedSparse);
        assert_eq!(conf.top_n, 3);
        assert_eq!(conf.encoding, EncodingConfig::default());
    }

    #[test]
    fn test_borrow_null() {
        let empty: &[i32] = unsafe { borrow(std::ptr::null(), 0, "x") }.unwrap();
        assert!(empty.is_empty());
        assert!(unsafe { borrow::<i32>(std::ptr::null(), 2, "x") }.is_err());
    }
}
