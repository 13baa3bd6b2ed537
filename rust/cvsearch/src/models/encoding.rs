use serde::{
    Deserialize,
    Serialize,
};

/// Mapping from continuous masses to integer bins.
///
/// A mass `m` is encoded as `floor(m * mass_multiplier)`, and every
/// candidate and spectrum of one search must share the same encoding.
/// The engine itself only ever sees the resulting integers, so this
/// struct mostly exists to know the width of the dense representation
/// and to convert a tolerance in daltons into a tolerance in bins.
///
/// Example:
/// ```
/// use cvsearch::EncodingConfig;
///
/// let enc = EncodingConfig::default();
/// assert_eq!(enc.encoding_size(), 500_000);
/// assert_eq!(enc.encode(147.5), Some(14750));
/// assert_eq!(enc.tolerance_bins(0.02), 2);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncodingConfig {
    /// Largest representable mass, in daltons.
    pub mass_range: u32,
    /// Bins per dalton.
    pub mass_multiplier: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            mass_range: 5000,
            mass_multiplier: 100,
        }
    }
}

impl EncodingConfig {
    pub fn new(mass_range: u32, mass_multiplier: u32) -> Self {
        Self {
            mass_range,
            mass_multiplier,
        }
    }

    /// Number of bins of the dense representation.
    pub fn encoding_size(&self) -> usize {
        self.mass_range as usize * self.mass_multiplier as usize
    }

    /// Encodes a mass, `None` if it falls outside of the encoding range.
    pub fn encode(&self, mass: f64) -> Option<i32> {
        let bin = (mass * self.mass_multiplier as f64).floor();
        if bin < 0.0 || bin >= self.encoding_size() as f64 {
            return None;
        }
        Some(bin as i32)
    }

    /// Tolerance in daltons expressed as a whole number of bins.
    pub fn tolerance_bins(&self, tolerance: f32) -> u32 {
        if tolerance <= 0.0 {
            return 0;
        }
        (tolerance * self.mass_multiplier as f32).round() as u32
    }

    pub fn contains(&self, bin: i64) -> bool {
        bin >= 0 && (bin as u64) < self.encoding_size() as u64
    }
}
