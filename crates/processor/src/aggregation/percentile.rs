use crate::config::Interpolation;
use crate::error::{AggregationError, AggregationResult};

/// Percentile estimator over a finite sample set
///
/// Two estimators are available:
/// - [`Interpolation::Legacy`] places the rank at `p(n+1)/100` and clamps to
///   the first or last value outside `[1, n)`. For `5, 10, ..., 100` the 95th
///   percentile is `99.75`.
/// - [`Interpolation::R7`] places the rank at `p(n-1)/100` on a zero-based
///   index and interpolates between neighbours. For the same input it gives `95.25`.
///
/// Both return the single value for `n = 1` and `0.0` for an empty set.
///
/// # Examples
///
/// ```
/// use processor::aggregation::Percentile;
///
/// let values: Vec<f64> = (1..=20).map(|i| (i * 5) as f64).collect();
/// let p95 = Percentile::p95().evaluate(&values);
/// assert!((p95 - 99.75).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentile {
    quantile: f64,
    interpolation: Interpolation,
}

impl Percentile {
    /// Create an estimator for a percentile in (0, 100]
    pub fn new(quantile: f64) -> AggregationResult<Self> {
        if !(quantile > 0.0 && quantile <= 100.0) {
            return Err(AggregationError::InvalidPercentile {
                percentile: quantile,
            });
        }
        Ok(Self {
            quantile,
            interpolation: Interpolation::Legacy,
        })
    }

    /// Create a p95 estimator
    pub fn p95() -> Self {
        Self {
            quantile: 95.0,
            interpolation: Interpolation::Legacy,
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Evaluate over unsorted values, leaving the input untouched
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        let mut sorted = values.to_vec();
        self.evaluate_in_place(&mut sorted)
    }

    /// Evaluate over values that may be reordered
    pub fn evaluate_in_place(&self, values: &mut [f64]) -> f64 {
        values.sort_unstable_by(f64::total_cmp);
        self.evaluate_sorted(values)
    }

    /// Evaluate over values already sorted ascending
    pub fn evaluate_sorted(&self, sorted: &[f64]) -> f64 {
        match sorted.len() {
            0 => 0.0,
            1 => sorted[0],
            n => match self.interpolation {
                Interpolation::Legacy => legacy(sorted, n, self.quantile),
                Interpolation::R7 => r7(sorted, n, self.quantile),
            },
        }
    }
}

impl Default for Percentile {
    fn default() -> Self {
        Self::p95()
    }
}

fn legacy(sorted: &[f64], n: usize, quantile: f64) -> f64 {
    let pos = quantile * (n + 1) as f64 / 100.0;
    if pos < 1.0 {
        return sorted[0];
    }
    if pos >= n as f64 {
        return sorted[n - 1];
    }
    let lower = pos.floor();
    let d = pos - lower;
    let lower = lower as usize;
    let below = sorted[lower - 1];
    below + d * (sorted[lower] - below)
}

fn r7(sorted: &[f64], n: usize, quantile: f64) -> f64 {
    let rank = quantile / 100.0 * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (rank.ceil() as usize).min(n - 1);

    if lower_idx == upper_idx {
        sorted[lower_idx]
    } else {
        let fraction = rank - lower_idx as f64;
        sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx])
    }
}

/// Compute the `quantile` percentile of `values` with the default estimator
pub fn percentile(values: &[f64], quantile: f64) -> AggregationResult<f64> {
    Ok(Percentile::new(quantile)?.evaluate(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fives() -> Vec<f64> {
        (1..=20).map(|i| (i * 5) as f64).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_golden_p95() {
        assert!(approx(Percentile::p95().evaluate(&fives()), 99.75));
    }

    #[test]
    fn test_golden_p95_is_order_independent() {
        let mut values = fives();
        values.reverse();
        values.swap(3, 11);
        assert!(approx(Percentile::p95().evaluate(&values), 99.75));
    }

    #[test]
    fn test_r7_variant() {
        let p95 = Percentile::p95()
            .with_interpolation(Interpolation::R7)
            .evaluate(&fives());
        assert!(approx(p95, 95.25));
    }

    #[test]
    fn test_single_value() {
        for interpolation in [Interpolation::Legacy, Interpolation::R7] {
            let estimator = Percentile::p95().with_interpolation(interpolation);
            assert_eq!(estimator.evaluate(&[42.5]), 42.5);
        }
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(Percentile::p95().evaluate(&[]), 0.0);
    }

    #[test]
    fn test_three_values_clamp_to_max() {
        assert_eq!(Percentile::p95().evaluate(&[60.0, 75.5, 90.0]), 90.0);
    }

    #[test]
    fn test_low_percentile_clamps_to_min() {
        let p1 = Percentile::new(1.0).unwrap().evaluate(&[3.0, 1.0, 2.0]);
        assert_eq!(p1, 1.0);
    }

    #[test]
    fn test_median_legacy() {
        let p50 = Percentile::new(50.0).unwrap().evaluate(&[1.0, 2.0, 3.0, 4.0]);
        assert!(approx(p50, 2.5));
    }

    #[test]
    fn test_result_within_bounds() {
        let sets: Vec<Vec<f64>> = vec![
            vec![0.0, 100.0],
            vec![12.5, 12.5, 12.5],
            vec![99.9, 0.1, 50.0, 50.0, 73.2, 18.4, 66.6],
            (0..1000).map(|i| ((i * 37) % 101) as f64).collect(),
        ];
        for values in sets {
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for interpolation in [Interpolation::Legacy, Interpolation::R7] {
                let p = Percentile::p95()
                    .with_interpolation(interpolation)
                    .evaluate(&values);
                assert!(p >= min && p <= max, "{} not in [{}, {}]", p, min, max);
            }
        }
    }

    #[test]
    fn test_invalid_percentile() {
        assert!(Percentile::new(0.0).is_err());
        assert!(Percentile::new(100.1).is_err());
        assert!(Percentile::new(f64::NAN).is_err());
        assert!(Percentile::new(100.0).is_ok());
        assert!(percentile(&[1.0], -1.0).is_err());
    }

    #[test]
    fn test_evaluate_does_not_reorder_input() {
        let values = vec![3.0, 1.0, 2.0];
        Percentile::p95().evaluate(&values);
        assert_eq!(values, vec![3.0, 1.0, 2.0]);
    }
}
