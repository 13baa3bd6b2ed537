use serde::{
    Deserialize,
    Serialize,
};
use std::fmt::Display;
use std::str::FromStr;

use crate::errors::{
    InputError,
    Result,
};
use crate::models::encoding::EncodingConfig;
use crate::scoring::kernel::MatchKernel;

/// How the spectrum/candidate product is formulated.
///
/// All four produce the same scores (bit-identical in float mode), they only
/// differ in memory layout and in how work is grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One spectrum at a time, merge of two sorted sparse rows.
    SparseVector,
    /// One spectrum at a time, spectrum expanded to a dense array.
    DenseVector,
    /// Blocks of spectra against an inverted (bin -> candidates) index.
    BatchedSparse,
    /// Blocks of spectra expanded into a dense bin-major block.
    BatchedDense,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::SparseVector,
        Strategy::DenseVector,
        Strategy::BatchedSparse,
        Strategy::BatchedDense,
    ];

    pub fn from_flags(batched: bool, sparse: bool) -> Self {
        match (batched, sparse) {
            (false, true) => Strategy::SparseVector,
            (false, false) => Strategy::DenseVector,
            (true, true) => Strategy::BatchedSparse,
            (true, false) => Strategy::BatchedDense,
        }
    }

    pub fn is_batched(&self) -> bool {
        matches!(self, Strategy::BatchedSparse | Strategy::BatchedDense)
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Strategy::SparseVector | Strategy::BatchedSparse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NumericMode {
    #[default]
    Float,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

/// The eight CPU entry points, named `<numeric>CPU_<layout>` where the
/// layout is `SV`/`DV` (single sparse/dense vector) or `SM`/`DM`
/// (batched sparse/dense matrix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuMethod {
    I32Dv,
    F32Dv,
    I32Dm,
    F32Dm,
    I32Sv,
    F32Sv,
    I32Sm,
    F32Sm,
}

impl CpuMethod {
    pub const ALL: [CpuMethod; 8] = [
        CpuMethod::I32Dv,
        CpuMethod::F32Dv,
        CpuMethod::I32Dm,
        CpuMethod::F32Dm,
        CpuMethod::I32Sv,
        CpuMethod::F32Sv,
        CpuMethod::I32Sm,
        CpuMethod::F32Sm,
    ];

    pub fn strategy(&self) -> Strategy {
        match self {
            CpuMethod::I32Dv | CpuMethod::F32Dv => Strategy::DenseVector,
            CpuMethod::I32Dm | CpuMethod::F32Dm => Strategy::BatchedDense,
            CpuMethod::I32Sv | CpuMethod::F32Sv => Strategy::SparseVector,
            CpuMethod::I32Sm | CpuMethod::F32Sm => Strategy::BatchedSparse,
        }
    }

    pub fn numeric(&self) -> NumericMode {
        match self {
            CpuMethod::I32Dv | CpuMethod::I32Dm | CpuMethod::I32Sv | CpuMethod::I32Sm => {
                NumericMode::Integer
            }
            _ => NumericMode::Float,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CpuMethod::I32Dv => "i32CPU_DV",
            CpuMethod::F32Dv => "f32CPU_DV",
            CpuMethod::I32Dm => "i32CPU_DM",
            CpuMethod::F32Dm => "f32CPU_DM",
            CpuMethod::I32Sv => "i32CPU_SV",
            CpuMethod::F32Sv => "f32CPU_SV",
            CpuMethod::I32Sm => "i32CPU_SM",
            CpuMethod::F32Sm => "f32CPU_SM",
        }
    }
}

impl Display for CpuMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for CpuMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CpuMethod::ALL
            .iter()
            .find(|m| m.label().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = CpuMethod::ALL.iter().map(|m| m.label()).collect();
                format!("unknown CPU method '{}', expected one of {:?}", s, names)
            })
    }
}

/// The three GPU formulations, float only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuMethod {
    /// One dense spectrum vector per dispatch (`f32GPU_DV`).
    Spmv,
    /// Dense block of spectra per dispatch (`f32GPU_DM`).
    Spmm,
    /// Sparse block of spectra per dispatch (`f32GPU_SM`).
    Spgemm,
}

impl GpuMethod {
    pub const ALL: [GpuMethod; 3] = [GpuMethod::Spmv, GpuMethod::Spmm, GpuMethod::Spgemm];

    /// Single vector strategies both map onto SpMV, the device always
    /// works on a dense spectrum vector in that case.
    pub fn from_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::SparseVector | Strategy::DenseVector => GpuMethod::Spmv,
            Strategy::BatchedDense => GpuMethod::Spmm,
            Strategy::BatchedSparse => GpuMethod::Spgemm,
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            GpuMethod::Spmv => Strategy::DenseVector,
            GpuMethod::Spmm => Strategy::BatchedDense,
            GpuMethod::Spgemm => Strategy::BatchedSparse,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GpuMethod::Spmv => "f32GPU_DV",
            GpuMethod::Spmm => "f32GPU_DM",
            GpuMethod::Spgemm => "f32GPU_SM",
        }
    }
}

impl Display for GpuMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for GpuMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "spmv" | "f32gpu_dv" => Ok(GpuMethod::Spmv),
            "spmm" | "f32gpu_dm" => Ok(GpuMethod::Spmm),
            "spgemm" | "f32gpu_sm" => Ok(GpuMethod::Spgemm),
            _ => Err(format!(
                "unknown GPU method '{}', expected one of spmv, spmm, spgemm",
                s
            )),
        }
    }
}

/// Options of one search call.
///
/// Integer-typed fields keep the signed types of the C ABI so that
/// out-of-range values can be reported instead of wrapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of candidates reported per spectrum.
    pub top_n: i32,
    /// Peak matching tolerance, in daltons.
    pub tolerance: f32,
    /// Divide each candidate score by its number of peaks.
    pub normalize: bool,
    /// Weight matches by a Gaussian of the bin distance instead of 1.
    pub use_gaussian: bool,
    pub batched: bool,
    pub sparse: bool,
    pub numeric: NumericMode,
    /// Worker threads, `<= 0` uses all available cores.
    pub cores: i32,
    /// Spectra per batch for the batched strategies.
    pub batch_size: i32,
    /// Log progress every `verbose` spectra, `0` disables it.
    pub verbose: i32,
    pub encoding: EncodingConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_n: 20,
            tolerance: 0.02,
            normalize: true,
            use_gaussian: true,
            batched: false,
            sparse: true,
            numeric: NumericMode::Float,
            cores: 0,
            batch_size: 100,
            verbose: 0,
            encoding: EncodingConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn strategy(&self) -> Strategy {
        Strategy::from_flags(self.batched, self.sparse)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.batched = strategy.is_batched();
        self.sparse = strategy.is_sparse();
        self
    }

    pub fn with_cpu_method(self, method: CpuMethod) -> Self {
        let mut out = self.with_strategy(method.strategy());
        out.numeric = method.numeric();
        out
    }

    pub fn with_gpu_method(self, method: GpuMethod) -> Self {
        let mut out = self.with_strategy(method.strategy());
        out.numeric = NumericMode::Float;
        out
    }

    /// Checks the scalar options, run before touching any buffer.
    pub fn validate(&self) -> Result<()> {
        if self.top_n <= 0 {
            return Err(InputError::InvalidTopN {
                top_n: self.top_n as i64,
            }
            .into());
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(InputError::NegativeTolerance {
                tolerance: self.tolerance,
            }
            .into());
        }
        if self.batch_size <= 0 {
            return Err(InputError::InvalidBatchSize {
                batch_size: self.batch_size as i64,
            }
            .into());
        }
        Ok(())
    }

    pub fn top_n_usize(&self) -> usize {
        self.top_n.max(0) as usize
    }

    pub fn batch_size_usize(&self) -> usize {
        self.batch_size.max(1) as usize
    }

    pub fn tolerance_bins(&self) -> u32 {
        self.encoding.tolerance_bins(self.tolerance)
    }

    /// Matching kernel for this tolerance, windowed to the encoding.
    pub fn kernel(&self) -> MatchKernel {
        let size = u32::try_from(self.encoding.encoding_size()).unwrap_or(u32::MAX);
        MatchKernel::clipped(self.tolerance_bins(), self.use_gaussian, size)
    }

    /// Progress interval, `None` when progress logging is off.
    pub fn progress_interval(&self) -> Option<usize> {
        if self.verbose > 0 {
            Some(self.verbose as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SearchError;

    #[test]
    fn test_strategy_flags_roundtrip() {
        for strategy in Strategy::ALL {
            let conf = SearchConfig::default().with_strategy(strategy);
            assert_eq!(conf.strategy(), strategy);
        }
    }

    #[test]
    fn test_cpu_method_names() {
        for method in CpuMethod::ALL {
            let parsed: CpuMethod = method.label().parse().unwrap();
            assert_eq!(parsed, method);
        }
        assert_eq!("F32CPU_sm".parse::<CpuMethod>().unwrap(), CpuMethod::F32Sm);
        assert!("f64CPU_SV".parse::<CpuMethod>().is_err());
        assert_eq!(CpuMethod::I32Dm.strategy(), Strategy::BatchedDense);
        assert_eq!(CpuMethod::I32Dm.numeric(), NumericMode::Integer);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let conf: SearchConfig =
            serde_json::from_str(r#"{"top_n": 5, "numeric": "integer", "batched": true}"#).unwrap();
        assert_eq!(conf.top_n, 5);
        assert_eq!(conf.numeric, NumericMode::Integer);
        assert_eq!(conf.strategy(), Strategy::BatchedSparse);
        assert_eq!(conf.batch_size, 100);
        assert_eq!(conf.encoding, EncodingConfig::default());
    }

    #[test]
    fn test_validate() {
        assert!(SearchConfig::default().validate().is_ok());

        let conf = SearchConfig {
            top_n: 0,
            ..Default::default()
        };
        assert!(matches!(
            conf.validate(),
            Err(SearchError::InvalidInput(InputError::InvalidTopN { top_n: 0 }))
        ));

        let conf = SearchConfig {
            tolerance: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            conf.validate(),
            Err(SearchError::InvalidInput(InputError::NegativeTolerance { .. }))
        ));

        let conf = SearchConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(conf.validate().is_err());
    }
}
