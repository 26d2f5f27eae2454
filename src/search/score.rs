//! Confidence estimate over the ranked catches curve.
//!
//! A least-squares line is fitted to the ranked `catches` values; the
//! per-rank ratio of actual to predicted catches measures how strongly
//! the top candidates stand out from an otherwise linear tail.

use crate::config::ZeroDivisionPolicy;
use crate::search::workers::LutResult;

const ZERO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEstimate {
    pub max_delta: f32,
    pub sq_average_delta: f32,
}

impl ScoreEstimate {
    pub const ZERO: Self = Self {
        max_delta: 0.0,
        sq_average_delta: 0.0,
    };
}

/// Fit `y = a * rank + b` to the catches curve by least squares.
///
/// A degenerate system (fewer than two points) falls back to the flat
/// line through the mean.
fn approximate(results: &[LutResult]) -> (f64, f64) {
    let n = results.len() as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_x2 = 0.0;
    let mut sum_xy = 0.0;

    for (i, result) in results.iter().enumerate() {
        let x = i as f64;
        let y = result.catches as f64;
        sum_x += x;
        sum_y += y;
        sum_x2 += x * x;
        sum_xy += x * y;
    }

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator.abs() < ZERO_EPSILON {
        return (0.0, sum_y / n);
    }

    let a = (n * sum_xy - sum_x * sum_y) / denominator;
    let b = (sum_y - a * sum_x) / n;
    (a, b)
}

/// Compute the confidence estimate for a ranked result list.
///
/// An empty list yields the zero estimate. Ranks where the fitted line
/// predicts zero are handled per `policy`.
pub fn estimate_approximation(results: &[LutResult], policy: ZeroDivisionPolicy) -> ScoreEstimate {
    if results.is_empty() {
        return ScoreEstimate::ZERO;
    }

    let (a, b) = approximate(results);

    let mut sum_squares = 0.0f64;
    let mut max_delta = 0.0f64;
    let mut included = 0usize;

    for (i, result) in results.iter().enumerate() {
        let predicted = a * i as f64 + b;
        let denominator = if predicted.abs() >= ZERO_EPSILON {
            predicted
        } else {
            match policy {
                // A skipped rank leaves both the max and the mean
                ZeroDivisionPolicy::Skip => continue,
                ZeroDivisionPolicy::Clamp => ZERO_EPSILON.copysign(predicted),
            }
        };

        let ratio = result.catches as f64 / denominator;
        sum_squares += ratio * ratio;
        included += 1;
        if ratio > max_delta {
            max_delta = ratio;
        }
    }

    let sq_average_delta = if included == 0 {
        0.0
    } else {
        (sum_squares / included as f64).sqrt() as f32
    };

    ScoreEstimate {
        max_delta: max_delta as f32,
        sq_average_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(catches: &[u32]) -> Vec<LutResult> {
        catches
            .iter()
            .enumerate()
            .map(|(i, &c)| LutResult {
                track_index: i as u32,
                chunk_index: 0,
                catches: c,
            })
            .collect()
    }

    #[test]
    fn test_perfectly_linear_curve() {
        // y = -2x + 10 fits exactly; every ratio is 1
        let results = ranked(&[10, 8, 6, 4, 2]);
        let estimate = estimate_approximation(&results, ZeroDivisionPolicy::Skip);

        assert!((estimate.max_delta - 1.0).abs() < 1e-6);
        assert!((estimate.sq_average_delta - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_coefficients() {
        let (a, b) = approximate(&ranked(&[10, 8, 6, 4, 2]));
        assert!((a + 2.0).abs() < 1e-9);
        assert!((b - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input_is_zero() {
        let estimate = estimate_approximation(&[], ZeroDivisionPolicy::Skip);
        assert_eq!(estimate, ScoreEstimate::ZERO);
    }

    #[test]
    fn test_dominant_top_track_raises_max_delta() {
        let results = ranked(&[50, 8, 6, 4, 2]);
        let estimate = estimate_approximation(&results, ZeroDivisionPolicy::Skip);
        assert!(estimate.max_delta > 1.0);
    }

    #[test]
    fn test_single_result_uses_flat_fit() {
        let results = ranked(&[7]);
        let estimate = estimate_approximation(&results, ZeroDivisionPolicy::Skip);
        assert!((estimate.max_delta - 1.0).abs() < 1e-6);
        assert!((estimate.sq_average_delta - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_prediction_skip_drops_term() {
        // All-zero catches fit the zero line; skip leaves the zero estimate
        let results = ranked(&[0, 0, 0]);
        let estimate = estimate_approximation(&results, ZeroDivisionPolicy::Skip);
        assert_eq!(estimate, ScoreEstimate::ZERO);
    }

    #[test]
    fn test_zero_prediction_skip_shrinks_the_mean() {
        // y = -2x + 4 fits exactly and predicts 0 at the last rank, so
        // that rank is skipped; the two remaining ratios are both 1 and
        // the mean runs over two terms, not three
        let results = ranked(&[4, 2, 0]);
        let estimate = estimate_approximation(&results, ZeroDivisionPolicy::Skip);

        assert!((estimate.max_delta - 1.0).abs() < 1e-6);
        assert!((estimate.sq_average_delta - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_prediction_clamp_keeps_term() {
        let results = ranked(&[0, 0, 0]);
        let estimate = estimate_approximation(&results, ZeroDivisionPolicy::Clamp);
        // 0 / epsilon is still zero; the estimate stays finite
        assert!(estimate.max_delta.is_finite());
        assert!(estimate.sq_average_delta.is_finite());
    }
}
