use cvsearch::{
    score_spectrum,
    CandidateMatrix,
    CpuMethod,
    EncodingConfig,
    NumericMode,
    SearchConfig,
    SpectrumBatch,
};

const CANDIDATE_VALUES: [i32; 16] = [1, 4, 0, 1, 2, 3, 1, 2, 3, 1, 4, 0, 1, 2, 3, 4];
const CANDIDATE_STARTS: [i32; 5] = [0, 2, 6, 9, 11];
const SPECTRUM_VALUES: [i32; 6] = [1, 2, 0, 1, 2, 4];
const SPECTRUM_STARTS: [i32; 2] = [0, 2];

fn config() -> SearchConfig {
    SearchConfig {
        top_n: 5,
        tolerance: 0.0,
        normalize: true,
        use_gaussian: true,
        encoding: EncodingConfig::new(5, 1),
        ..Default::default()
    }
}

#[test]
fn test_rankings_for_every_cpu_method() {
    let conf = config();
    let cands =
        CandidateMatrix::from_row_starts(&CANDIDATE_VALUES, &CANDIDATE_STARTS, &conf.encoding)
            .unwrap();
    let spectra =
        SpectrumBatch::from_row_starts(&SPECTRUM_VALUES, &SPECTRUM_STARTS, &conf.encoding)
            .unwrap();

    for method in CpuMethod::ALL {
        for batch_size in [1, 2, 100] {
            let conf = SearchConfig {
                batch_size,
                ..config().with_cpu_method(method)
            };
            let res = cvsearch::search(&cands, &spectra, &conf).unwrap();
            assert_eq!(res.num_spectra(), 2);
            assert_eq!(res.row(0), &[2, 0, 1, 3, 4], "{} batch {}", method, batch_size);
            assert_eq!(res.row(1), &[0, 3, 4, 1, 2], "{} batch {}", method, batch_size);
        }
    }
}

#[test]
fn test_float_scores() {
    let conf = config();
    let cands =
        CandidateMatrix::from_row_starts(&CANDIDATE_VALUES, &CANDIDATE_STARTS, &conf.encoding)
            .unwrap();

    let expected = [
        [0.5, 0.5, 2.0 / 3.0, 0.5, 0.4],
        [1.0, 0.75, 2.0 / 3.0, 1.0, 0.8],
    ];
    for (peaks, expected) in [&SPECTRUM_VALUES[..2], &SPECTRUM_VALUES[2..]]
        .iter()
        .zip(expected)
    {
        let scores = score_spectrum(&cands, peaks, &conf).unwrap();
        assert_eq!(scores.len(), 5);
        for (got, want) in scores.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{} vs {}", got, want);
        }
    }
}

#[test]
fn test_integer_scores() {
    let conf = SearchConfig {
        numeric: NumericMode::Integer,
        ..config()
    };
    let cands =
        CandidateMatrix::from_row_starts(&CANDIDATE_VALUES, &CANDIDATE_STARTS, &conf.encoding)
            .unwrap();
    let scores = score_spectrum(&cands, &SPECTRUM_VALUES[2..], &conf).unwrap();
    assert_eq!(scores, vec![1_000_000.0, 750_000.0, 666_666.0, 1_000_000.0, 800_000.0]);
}

#[test]
fn test_unnormalized_counts_matches() {
    let conf = SearchConfig {
        normalize: false,
        ..config()
    };
    let cands =
        CandidateMatrix::from_row_starts(&CANDIDATE_VALUES, &CANDIDATE_STARTS, &conf.encoding)
            .unwrap();
    let spectra =
        SpectrumBatch::from_row_starts(&SPECTRUM_VALUES, &SPECTRUM_STARTS, &conf.encoding)
            .unwrap();

    let scores = score_spectrum(&cands, &SPECTRUM_VALUES[2..], &conf).unwrap();
    assert_eq!(scores, vec![2.0, 3.0, 2.0, 2.0, 4.0]);

    let res = cvsearch::search(&cands, &spectra, &conf).unwrap();
    assert_eq!(res.row(0), &[1, 2, 4, 0, 3]);
    assert_eq!(res.row(1), &[4, 1, 0, 2, 3]);
}
