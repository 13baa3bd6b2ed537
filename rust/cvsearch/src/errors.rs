use std::fmt::Display;

/// Status code reported across the C ABI for a successful call.
pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_INPUT: i32 = 1;
pub const STATUS_ALLOCATION_FAILURE: i32 = 2;
pub const STATUS_DEVICE_FAILURE: i32 = 3;
pub const STATUS_RELEASE_FAILURE: i32 = 4;

/// Which input buffer an [`InputError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Candidates,
    Spectra,
}

impl Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::Candidates => write!(f, "candidates"),
            InputKind::Spectra => write!(f, "spectra"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    InvalidTopN {
        top_n: i64,
    },
    NegativeTolerance {
        tolerance: f32,
    },
    NonMonotonicOffsets {
        kind: InputKind,
        row: usize,
    },
    OffsetOutOfBounds {
        kind: InputKind,
        offset: i64,
        len: usize,
    },
    MissingTrailingOffset {
        expected: usize,
        found: i64,
    },
    UnsortedRow {
        kind: InputKind,
        row: usize,
    },
    BinOutOfRange {
        kind: InputKind,
        row: usize,
        bin: i64,
        encoding_size: usize,
    },
    WeightLengthMismatch {
        expected: usize,
        other: usize,
    },
    InvalidWeight {
        index: usize,
        value: f32,
    },
    InvalidBatchSize {
        batch_size: i64,
    },
    UnsupportedOnDevice {
        context: &'static str,
    },
    NullPointer {
        argument: &'static str,
    },
}

impl Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTopN { top_n } => write!(f, "top_n must be positive, got {}", top_n),
            Self::NegativeTolerance { tolerance } => {
                write!(f, "tolerance must be non-negative, got {}", tolerance)
            }
            Self::NonMonotonicOffsets { kind, row } => {
                write!(f, "{} offsets decrease at row {}", kind, row)
            }
            Self::OffsetOutOfBounds { kind, offset, len } => write!(
                f,
                "{} offset {} is outside of the values array (len {})",
                kind, offset, len
            ),
            Self::MissingTrailingOffset { expected, found } => write!(
                f,
                "last CSR row offset should equal nnz ({}), found {}",
                expected, found
            ),
            Self::UnsortedRow { kind, row } => {
                write!(f, "{} row {} is not strictly increasing", kind, row)
            }
            Self::BinOutOfRange {
                kind,
                row,
                bin,
                encoding_size,
            } => write!(
                f,
                "{} row {} holds bin {} outside of [0, {})",
                kind, row, bin, encoding_size
            ),
            Self::WeightLengthMismatch { expected, other } => write!(
                f,
                "expected {} candidate weights (one per nnz), got {}",
                expected, other
            ),
            Self::InvalidWeight { index, value } => write!(
                f,
                "candidate weight {} must be finite and non-negative, got {}",
                index, value
            ),
            Self::InvalidBatchSize { batch_size } => {
                write!(f, "batch size must be positive, got {}", batch_size)
            }
            Self::UnsupportedOnDevice { context } => {
                write!(f, "not supported by the selected backend: {}", context)
            }
            Self::NullPointer { argument } => {
                write!(f, "{} is null but its length is not zero", argument)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseError {
    NullHandle,
    UnknownHandle { address: usize },
}

impl Display for ReleaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NullHandle => write!(f, "cannot release a null result handle"),
            Self::UnknownHandle { address } => write!(
                f,
                "result handle {:#x} is not live (already released or owned by another backend)",
                address
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SearchError {
    InvalidInput(InputError),
    AllocationFailure { bytes: usize, context: &'static str },
    DeviceFailure(String),
    ReleaseFailure(ReleaseError),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            Self::AllocationFailure { bytes, context } => {
                write!(f, "Failed to allocate {} bytes for {}", bytes, context)
            }
            Self::DeviceFailure(msg) => write!(f, "Device failure: {}", msg),
            Self::ReleaseFailure(e) => write!(f, "Release failure: {}", e),
        }
    }
}

impl std::error::Error for SearchError {}

impl SearchError {
    /// Status code used on the C ABI status channel.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) => STATUS_INVALID_INPUT,
            Self::AllocationFailure { .. } => STATUS_ALLOCATION_FAILURE,
            Self::DeviceFailure(_) => STATUS_DEVICE_FAILURE,
            Self::ReleaseFailure(_) => STATUS_RELEASE_FAILURE,
        }
    }

    pub fn device(msg: impl Display) -> Self {
        Self::DeviceFailure(msg.to_string())
    }
}

impl From<InputError> for SearchError {
    fn from(x: InputError) -> Self {
        Self::InvalidInput(x)
    }
}

impl From<ReleaseError> for SearchError {
    fn from(x: ReleaseError) -> Self {
        Self::ReleaseFailure(x)
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// Reserves a zeroed buffer, reporting allocation failure instead of aborting.
pub(crate) fn try_zeroed<T: Copy + Default>(len: usize, context: &'static str) -> Result<Vec<T>> {
    let mut out: Vec<T> = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| SearchError::AllocationFailure {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
            context,
        })?;
    out.resize(len, T::default());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let errs = [
            SearchError::from(InputError::InvalidTopN { top_n: 0 }),
            SearchError::AllocationFailure {
                bytes: 10,
                context: "test",
            },
            SearchError::device("lost"),
            SearchError::from(ReleaseError::NullHandle),
        ];
        let codes: Vec<i32> = errs.iter().map(|e| e.status_code()).collect();
        assert_eq!(
            codes,
            vec![
                STATUS_INVALID_INPUT,
                STATUS_ALLOCATION_FAILURE,
                STATUS_DEVICE_FAILURE,
                STATUS_RELEASE_FAILURE
            ]
        );
        assert!(codes.iter().all(|&c| c != STATUS_OK));
    }

    #[test]
    fn test_try_zeroed_too_large() {
        let out = try_zeroed::<u64>(usize::MAX / 4, "huge");
        assert!(matches!(out, Err(SearchError::AllocationFailure { .. })));
    }
}
