pub mod config;
pub mod encoding;
pub mod input;
pub mod sparse;

pub use config::{
    Backend,
    CpuMethod,
    GpuMethod,
    NumericMode,
    SearchConfig,
    Strategy,
};
pub use encoding::EncodingConfig;
pub use input::EncodedInput;
pub use sparse::{
    CandidateMatrix,
    SparseRows,
    SpectrumBatch,
};
