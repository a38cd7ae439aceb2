//! Small-sample estimators.

use serde::{Deserialize, Serialize};

/// Two-sided 95% normal quantile.
pub const Z_95: f64 = 1.96;

/// A closed interval within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

impl ConfidenceInterval {
    /// The widest possible interval, `[0, 1]`.
    pub const UNKNOWN: Self = Self { lower: 0.0, upper: 1.0 };

    /// Upper minus lower bound.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether `value` lies within the interval.
    pub fn contains(&self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}

/// Wilson score interval for `successes` out of `trials`.
///
/// Zero trials yields [`ConfidenceInterval::UNKNOWN`]. For a single success
/// the lower bound is `1 / (1 + z²)`, strictly below 1.
pub fn wilson_interval(successes: u64, trials: u64, z: f64) -> ConfidenceInterval {
    if trials == 0 {
        return ConfidenceInterval::UNKNOWN;
    }
    let n = trials as f64;
    let p = successes.min(trials) as f64 / n;
    let z2 = z * z;

    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denominator;

    ConfidenceInterval {
        lower: (center - margin).clamp(0.0, 1.0),
        upper: (center + margin).clamp(0.0, 1.0),
    }
}

/// Good-Turing estimate of the probability that the next observation is a
/// never-seen state: `N1 / N`. With no observations it is 1.
pub fn good_turing_unseen(singletons: u64, observations: u64) -> f64 {
    if observations == 0 {
        return 1.0;
    }
    (singletons as f64 / observations as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_trials_is_widest() {
        assert_eq!(wilson_interval(0, 0, Z_95), ConfidenceInterval::UNKNOWN);
    }

    #[test]
    fn single_pass_is_strictly_below_one() {
        let interval = wilson_interval(1, 1, Z_95);
        let expected = 1.0 / (1.0 + Z_95 * Z_95);
        assert!((interval.lower - expected).abs() < 1e-12);
        assert!(interval.lower < 1.0);
        assert!((interval.upper - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lower_bound_grows_with_passes() {
        let mut previous = 0.0;
        for passes in [1, 10, 100, 1000] {
            let lower = wilson_interval(passes, passes, Z_95).lower;
            assert!(lower > previous);
            previous = lower;
        }
        assert!(wilson_interval(50, 100, Z_95).lower < wilson_interval(90, 100, Z_95).lower);
    }

    #[test]
    fn width_narrows_at_a_fixed_rate() {
        let widths: Vec<f64> = [(5, 10), (50, 100), (2_500, 5_000)]
            .into_iter()
            .map(|(passes, trials)| wilson_interval(passes, trials, Z_95).width())
            .collect();
        assert!(widths.windows(2).all(|pair| pair[1] < pair[0]), "{widths:?}");
        assert!(widths[2] < 0.03);
    }

    #[test]
    fn all_failures_gives_zero_lower_bound() {
        let interval = wilson_interval(0, 100, Z_95);
        assert!(interval.lower < 1e-12);
        assert!(interval.upper < 0.05);
    }

    #[test]
    fn good_turing_bounds() {
        assert_eq!(good_turing_unseen(0, 0), 1.0);
        assert_eq!(good_turing_unseen(0, 500), 0.0);
        assert_eq!(good_turing_unseen(5, 10), 0.5);
    }
}
