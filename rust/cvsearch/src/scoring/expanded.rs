use std::marker::PhantomData;

use super::arithmetic::Arithmetic;
use super::kernel::MatchKernel;

/// A spectrum spread by the match kernel, as a sorted sparse vector.
///
/// Every spectrum peak contributes the kernel profile to the bins within the
/// tolerance window, overlapping windows keep the maximum. The result is
/// the vector the candidate rows are multiplied with.
///
/// Buffers are kept between calls, one instance is meant to be reused for
/// every spectrum a worker handles.
#[derive(Debug, Clone)]
pub struct ExpandedSpectrum<A: Arithmetic> {
    bins: Vec<u32>,
    raw: Vec<f32>,
    values: Vec<A::Value>,
    _mode: PhantomData<A>,
}

impl<A: Arithmetic> Default for ExpandedSpectrum<A> {
    fn default() -> Self {
        Self {
            bins: Vec::new(),
            raw: Vec::new(),
            values: Vec::new(),
            _mode: PhantomData,
        }
    }
}

impl<A: Arithmetic> ExpandedSpectrum<A> {
    /// Replaces the contents with the expansion of `peaks`.
    ///
    /// `peaks` must be strictly increasing and inside `[0, encoding_size)`,
    /// which the input views already guarantee.
    pub fn rebuild(&mut self, peaks: &[i32], kernel: &MatchKernel, encoding_size: usize) {
        self.bins.clear();
        self.raw.clear();
        self.values.clear();
        if encoding_size == 0 {
            return;
        }

        let radius = kernel.radius();
        let last_bin = (encoding_size - 1) as u32;
        for &peak in peaks {
            let peak = peak as u32;
            let lo = peak.saturating_sub(radius);
            let hi = peak.saturating_add(radius).min(last_bin);

            // Windows have a fixed width and ascending centers, so the bins
            // at or above `lo` form a contiguous tail ending at the previous
            // window's upper edge.
            let mut idx = self.bins.partition_point(|&b| b < lo);
            for bin in lo..=hi {
                let w = kernel.weight(bin.abs_diff(peak));
                if idx < self.bins.len() {
                    debug_assert_eq!(self.bins[idx], bin);
                    if w > self.raw[idx] {
                        self.raw[idx] = w;
                    }
                    idx += 1;
                } else {
                    self.bins.push(bin);
                    self.raw.push(w);
                }
            }
        }

        self.values.extend(self.raw.iter().map(|&x| A::value(x)));
    }

    #[inline]
    pub fn bins(&self) -> &[u32] {
        &self.bins
    }

    #[inline]
    pub fn values(&self) -> &[A::Value] {
        &self.values
    }

    /// Unquantized kernel values, aligned with [`Self::bins`].
    pub fn raw_values(&self) -> &[f32] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Writes the entries into a dense vector.
    pub fn scatter_into(&self, dense: &mut [A::Value]) {
        for (&b, &v) in self.bins.iter().zip(self.values.iter()) {
            dense[b as usize] = v;
        }
    }

    /// Resets the entries previously written by [`Self::scatter_into`].
    pub fn clear_from(&self, dense: &mut [A::Value]) {
        for &b in self.bins.iter() {
            dense[b as usize] = A::Value::default();
        }
    }
}
