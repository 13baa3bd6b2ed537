/// Contribution of a spectrum peak to the bins around it.
///
/// A peak at bin `p` spreads over `[p - r, p + r]` where `r` is the
/// tolerance in bins. With the binary kernel every bin in that window gets
/// 1, with the Gaussian kernel bin `p + d` gets `exp(-0.5 * (d / sigma)^2)`
/// where `sigma = r / 3`. A zero radius always contributes exactly 1 at the
/// peak itself.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchKernel {
    radius: u32,
    gaussian: bool,
    // profile[d] is the weight at distance d, d in 0..=radius
    profile: Vec<f32>,
}

impl MatchKernel {
    pub fn new(radius: u32, gaussian: bool) -> Self {
        Self::clipped(radius, gaussian, u32::MAX)
    }

    /// Kernel for an encoding of `encoding_size` bins.
    ///
    /// No two bins of the encoding are further apart than
    /// `encoding_size - 1`, so the window stops there. The Gaussian width
    /// still follows the requested radius.
    pub fn clipped(radius: u32, gaussian: bool, encoding_size: u32) -> Self {
        let sigma = radius as f32 / 3.0;
        let window = radius.min(encoding_size.saturating_sub(1));
        let profile = (0..=window)
            .map(|d| gaussian_or_flat(d, sigma, gaussian))
            .collect();
        Self {
            radius: window,
            gaussian,
            profile,
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn is_gaussian(&self) -> bool {
        self.gaussian
    }

    /// Weight at a bin distance, 0 outside of the window.
    #[inline]
    pub fn weight(&self, distance: u32) -> f32 {
        match self.profile.get(distance as usize) {
            Some(&w) => w,
            None => 0.0,
        }
    }
}

fn gaussian_or_flat(distance: u32, sigma: f32, gaussian: bool) -> f32 {
    if !gaussian || sigma == 0.0 {
        return 1.0;
    }
    let z = distance as f32 / sigma;
    (-0.5 * z * z).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_radius_is_exact_match() {
        let k = MatchKernel::new(0, true);
        assert_eq!(k.weight(0), 1.0);
        assert_eq!(k.weight(1), 0.0);
    }

    #[test]
    fn test_gaussian_below_binary() {
        let g = MatchKernel::new(6, true);
        let b = MatchKernel::new(6, false);
        assert_eq!(g.weight(0), 1.0);
        for d in 0..=6 {
            assert!(g.weight(d) <= b.weight(d));
            assert_eq!(b.weight(d), 1.0);
        }
        for d in 1..=6 {
            assert!(g.weight(d) < g.weight(d - 1));
        }
        // At the cutoff the distance is three sigmas.
        assert!((g.weight(6) - (-4.5f32).exp()).abs() < 1e-6);
        assert_eq!(g.weight(7), 0.0);
    }

    #[test]
    fn test_window_clipped_to_encoding() {
        let k = MatchKernel::clipped(u32::MAX, false, 5);
        assert_eq!(k.radius(), 4);
        assert_eq!(k.weight(4), 1.0);
        assert_eq!(k.weight(5), 0.0);

        // Clipping keeps the Gaussian shape of the full radius.
        let full = MatchKernel::new(30, true);
        let short = MatchKernel::clipped(30, true, 8);
        assert_eq!(short.radius(), 7);
        for d in 0..=7 {
            assert_eq!(short.weight(d), full.weight(d));
        }
        assert_eq!(short.weight(8), 0.0);

        let empty = MatchKernel::clipped(3, true, 0);
        assert_eq!(empty.radius(), 0);
    }
}
