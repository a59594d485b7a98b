use crate::testing::{cast, Alternative, TestResult};
use single_utilities::traits::FloatOps;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// One-sample test of a proportion `successes / trials` against `p0`.
///
/// Score (chi-square) test with Yates' continuity correction, the one-sided
/// alternatives use the signed square root of the statistic.
pub fn proportion_test<T>(successes: T, trials: T, p0: T, alternative: Alternative) -> TestResult<T>
where
    T: FloatOps,
{
    let x = successes.to_f64().unwrap_or(f64::NAN);
    let n = trials.to_f64().unwrap_or(f64::NAN);
    let p = p0.to_f64().unwrap_or(f64::NAN);

    if n <= 0.0 || !(p > 0.0 && p < 1.0) {
        return TestResult::new(T::zero(), T::one());
    }

    let estimate = x / n;
    let expected = n * p;
    let deviation = (x - expected).abs();
    let yates = deviation.min(0.5);
    let statistic = (deviation - yates).powi(2) / (expected * (1.0 - p));

    let p_value = match alternative {
        Alternative::TwoSided => calculate_chi_square_p_value(statistic, 1.0),
        Alternative::Greater | Alternative::Less => {
            let normal = Normal::standard();
            let z = (estimate - p).signum() * statistic.sqrt();
            if alternative == Alternative::Greater {
                normal.sf(z)
            } else {
                normal.cdf(z)
            }
        }
    };

    TestResult::new(cast::<T>(statistic), cast::<T>(p_value))
        .with_estimate(cast::<T>(estimate))
        .with_metadata("expected", cast::<T>(expected))
}

fn calculate_chi_square_p_value(chi_square: f64, df: f64) -> f64 {
    match ChiSquared::new(df) {
        Ok(dist) => dist.sf(chi_square),
        Err(_) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_abundant_feature_rejects_null() {
        // 500 reads out of 1e6 against p0 = 1e-6
        let result = proportion_test(500.0, 1e6, 1e-6, Alternative::Greater);
        assert!(result.p_value < 1e-10);
        assert_relative_eq!(result.estimate.unwrap(), 5e-4);
    }

    #[test]
    fn test_feature_below_expectation() {
        let result = proportion_test(0.0, 2e6, 1e-6, Alternative::Greater);
        assert!(result.p_value > 0.5);
    }

    #[test]
    fn test_yates_correction_value() {
        // x = 60, n = 100, p0 = 0.5: (|60 - 50| - 0.5)^2 / 25 = 3.61
        let result = proportion_test(60.0, 100.0, 0.5, Alternative::TwoSided);
        assert_relative_eq!(result.statistic, 3.61, epsilon = 1e-12);
        assert_relative_eq!(result.p_value, 0.05743312, epsilon = 1e-6);

        let greater = proportion_test(60.0, 100.0, 0.5, Alternative::Greater);
        assert_relative_eq!(greater.p_value, 0.05743312 / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(proportion_test(1.0, 0.0, 0.5, Alternative::Greater).p_value, 1.0);
        assert_eq!(proportion_test(1.0, 10.0, 0.0, Alternative::Greater).p_value, 1.0);
    }
}
