/// A column of finite values sorted ascending, ready for repeated quantile lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedColumn {
    values: Vec<f64>,
}

impl SortedColumn {
    /// Drops non-finite values and sorts the rest. `None` when nothing finite remains.
    pub fn new(mut values: Vec<f64>) -> Option<Self> {
        values.retain(|v| v.is_finite());
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        Some(Self { values })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.values.len()
    }

    #[cfg(test)]
    fn min(&self) -> f64 {
        self.values[0]
    }

    #[cfg(test)]
    fn max(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Linear interpolation between closest ranks, `rank = q * (n - 1)`.
    pub fn quantile(&self, q: f64) -> f64 {
        let n = self.values.len();
        if n == 1 {
            return self.values[0];
        }

        let q = q.clamp(0.0, 1.0);
        let rank = q * (n as f64 - 1.0);
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;

        if lower == upper || self.values[lower] == self.values[upper] {
            self.values[lower]
        } else {
            let w = rank - lower as f64;
            self.values[lower] * (1.0 - w) + self.values[upper] * w
        }
    }
}

/// Keeps a probability off the exact 0/1 boundary of the quantile function.
/// NaN passes through unchanged.
pub fn clamp_probability(p: f64, tol: f64) -> f64 {
    p.clamp(tol, 1.0 - tol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn quantile_interpolates_between_points() {
        let column = SortedColumn::new(vec![4.0, 1.0, 3.0, 2.0]).expect("finite values");
        assert_approx(column.quantile(0.25), 1.75);
        assert_approx(column.quantile(0.5), 2.5);
        assert_approx(column.quantile(0.0), 1.0);
        assert_approx(column.quantile(1.0), 4.0);
    }

    #[test]
    fn quantile_of_single_value_is_that_value() {
        let column = SortedColumn::new(vec![7.5]).expect("finite values");
        assert_approx(column.quantile(0.0), 7.5);
        assert_approx(column.quantile(0.3), 7.5);
        assert_approx(column.quantile(1.0), 7.5);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let column =
            SortedColumn::new(vec![f64::NAN, 2.0, f64::INFINITY, 1.0]).expect("finite values");
        assert_eq!(column.len(), 2);
        assert_approx(column.min(), 1.0);
        assert_approx(column.max(), 2.0);
    }

    #[test]
    fn all_nan_column_has_no_quantiles() {
        assert!(SortedColumn::new(vec![f64::NAN, f64::NAN]).is_none());
        assert!(SortedColumn::new(Vec::new()).is_none());
    }

    #[test]
    fn clamp_keeps_probabilities_off_the_boundary() {
        let tol = 1e-6;
        assert_eq!(clamp_probability(0.0, tol), tol);
        assert_eq!(clamp_probability(1.0, tol), 1.0 - tol);
        assert_eq!(clamp_probability(-3.0, tol), tol);
        assert_eq!(clamp_probability(0.25, tol), 0.25);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_clamped_probability_never_hits_zero_or_one(
            p in -2.0f64..3.0,
            tol_exp in 2i32..12,
        ) {
            let tol = 10f64.powi(-tol_exp);
            let clamped = clamp_probability(p, tol);
            prop_assert!(clamped > 0.0 && clamped < 1.0);
            prop_assert!(clamped >= tol && clamped <= 1.0 - tol);
        }

        #[test]
        fn prop_upper_tail_quantile_is_non_increasing_in_p(
            values in vec(-1_000.0f64..1_000.0, 1..64),
            p1 in 0.0f64..1.0,
            p2 in 0.0f64..1.0,
        ) {
            let column = SortedColumn::new(values).expect("finite values");
            let (lo, hi) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
            prop_assert!(column.quantile(1.0 - hi) <= column.quantile(1.0 - lo) + 1e-9);
        }

        #[test]
        fn prop_quantile_stays_within_sample_range(
            values in vec(-1_000.0f64..1_000.0, 1..64),
            q in 0.0f64..1.0,
        ) {
            let column = SortedColumn::new(values).expect("finite values");
            let v = column.quantile(q);
            prop_assert!(v >= column.min() - 1e-9 && v <= column.max() + 1e-9);
        }
    }
}
