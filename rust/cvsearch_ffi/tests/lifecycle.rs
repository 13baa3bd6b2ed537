use std::ptr;
use std::sync::Mutex;

use cvsearch::errors::{
    STATUS_DEVICE_FAILURE,
    STATUS_INVALID_INPUT,
    STATUS_OK,
    STATUS_RELEASE_FAILURE,
};
use cvsearch_ffi::*;

// Registries are process wide, live counts are only meaningful serially.
static SERIAL: Mutex<()> = Mutex::new(());

const CANDIDATE_VALUES: [i32; 16] = [1, 4, 0, 1, 2, 3, 1, 2, 3, 1, 4, 0, 1, 2, 3, 4];
const CANDIDATE_STARTS: [i32; 5] = [0, 2, 6, 9, 11];
const SPECTRUM_VALUES: [i32; 6] = [1, 2, 0, 1, 2, 4];
const SPECTRUM_STARTS: [i32; 2] = [0, 2];

fn options() -> CvsOptions {
    CvsOptions {
        top_n: 5,
        tolerance: 0.0,
        mass_range: 5,
        mass_multiplier: 1,
        ..cvs_default_options()
    }
}

unsafe fn compute(opts: &CvsOptions) -> *mut i32 {
    cvs_compute(
        CANDIDATE_VALUES.as_ptr(),
        CANDIDATE_VALUES.len(),
        CANDIDATE_STARTS.as_ptr(),
        CANDIDATE_STARTS.len(),
        SPECTRUM_VALUES.as_ptr(),
        SPECTRUM_VALUES.len(),
        SPECTRUM_STARTS.as_ptr(),
        SPECTRUM_STARTS.len(),
        opts,
    )
}

#[test]
fn test_compute_release_cycles_leak_nothing() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let before = cvs_live_results(false);

    let mut handles = Vec::new();
    for (batched, sparse, use_int) in [
        (false, true, false),
        (false, false, true),
        (true, true, false),
        (true, false, true),
    ] {
        let opts = CvsOptions {
            batched,
            sparse,
            use_int,
            ..options()
        };
        let res = unsafe { compute(&opts) };
        assert!(!res.is_null());
        assert_eq!(cvs_last_status(), STATUS_OK);
        let rows = unsafe { std::slice::from_raw_parts(res, 10) };
        assert_eq!(rows, &[2, 0, 1, 3, 4, 0, 3, 4, 1, 2]);
        handles.push(res);
    }
    assert_eq!(cvs_live_results(false), before + 4);

    for res in handles {
        assert_eq!(cvs_release(res), STATUS_OK);
    }
    assert_eq!(cvs_live_results(false), before);
}

#[test]
fn test_bad_release_has_its_own_status() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let res = unsafe { compute(&options()) };
    assert!(!res.is_null());

    // Wrong backend first, the buffer must survive it.
    assert_eq!(cvs_release_gpu(res), STATUS_RELEASE_FAILURE);
    assert_eq!(cvs_release(res), STATUS_OK);
    assert_eq!(cvs_release(res), STATUS_RELEASE_FAILURE);
    assert_eq!(cvs_last_status(), STATUS_RELEASE_FAILURE);
    assert_eq!(cvs_release(ptr::null()), STATUS_RELEASE_FAILURE);
}

#[test]
fn test_invalid_input_returns_null() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let before = cvs_live_results(false);

    let opts = CvsOptions {
        top_n: 0,
        ..options()
    };
    let res = unsafe { compute(&opts) };
    assert!(res.is_null());
    assert_eq!(cvs_last_status(), STATUS_INVALID_INPUT);

    let bad_starts = [2, 0];
    let res = unsafe {
        cvs_compute(
            CANDIDATE_VALUES.as_ptr(),
            CANDIDATE_VALUES.len(),
            CANDIDATE_STARTS.as_ptr(),
            CANDIDATE_STARTS.len(),
            SPECTRUM_VALUES.as_ptr(),
            SPECTRUM_VALUES.len(),
            bad_starts.as_ptr(),
            bad_starts.len(),
            &options(),
        )
    };
    assert!(res.is_null());
    assert_eq!(cvs_last_status(), STATUS_INVALID_INPUT);

    let res = unsafe {
        cvs_compute(
            ptr::null(),
            3,
            CANDIDATE_STARTS.as_ptr(),
            CANDIDATE_STARTS.len(),
            SPECTRUM_VALUES.as_ptr(),
            SPECTRUM_VALUES.len(),
            SPECTRUM_STARTS.as_ptr(),
            SPECTRUM_STARTS.len(),
            &options(),
        )
    };
    assert!(res.is_null());
    assert_eq!(cvs_last_status(), STATUS_INVALID_INPUT);

    let res = unsafe {
        cvs_compute(
            CANDIDATE_VALUES.as_ptr(),
            CANDIDATE_VALUES.len(),
            CANDIDATE_STARTS.as_ptr(),
            CANDIDATE_STARTS.len(),
            SPECTRUM_VALUES.as_ptr(),
            SPECTRUM_VALUES.len(),
            SPECTRUM_STARTS.as_ptr(),
            SPECTRUM_STARTS.len(),
            ptr::null(),
        )
    };
    assert!(res.is_null());
    assert_eq!(cvs_last_status(), STATUS_INVALID_INPUT);
    assert_eq!(cvs_live_results(false), before);
}

#[test]
fn test_no_candidates_gives_sentinels() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let res = unsafe {
        cvs_compute(
            ptr::null(),
            0,
            ptr::null(),
            0,
            SPECTRUM_VALUES.as_ptr(),
            SPECTRUM_VALUES.len(),
            SPECTRUM_STARTS.as_ptr(),
            SPECTRUM_STARTS.len(),
            &options(),
        )
    };
    assert!(!res.is_null());
    let rows = unsafe { std::slice::from_raw_parts(res, 10) };
    assert!(rows.iter().all(|&x| x == -1));
    assert_eq!(cvs_release(res), STATUS_OK);
}

#[test]
fn test_gpu_csr_entry_point() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let row_offsets = [0, 2, 6, 9, 11, 16];
    let res = unsafe {
        cvs_compute_gpu(
            row_offsets.as_ptr(),
            5,
            CANDIDATE_VALUES.as_ptr(),
            CANDIDATE_VALUES.len(),
            ptr::null(),
            SPECTRUM_VALUES.as_ptr(),
            SPECTRUM_VALUES.len(),
            SPECTRUM_STARTS.as_ptr(),
            SPECTRUM_STARTS.len(),
            &options(),
        )
    };
    if !cvs_gpu_available() {
        assert!(res.is_null());
        assert_eq!(cvs_last_status(), STATUS_DEVICE_FAILURE);
        return;
    }
    assert!(!res.is_null());
    let rows = unsafe { std::slice::from_raw_parts(res, 10) };
    assert_eq!(rows, &[2, 0, 1, 3, 4, 0, 3, 4, 1, 2]);
    assert_eq!(cvs_release(res), STATUS_RELEASE_FAILURE);
    assert_eq!(cvs_release_gpu(res), STATUS_OK);
    assert_eq!(cvs_live_results(true), 0);
}
