//! Exact Binomial Tail Tests and Order Statistics
//!
//! Self-contained numerical primitives for the sequential decision layer:
//! one-sided exact binomial tests, percentile computation with linear
//! interpolation, and NaN-aware medians for history columns.
//!
//! # Background
//!
//! The sequential tester asks, after `n` trials, how surprising a feature's
//! cumulative hit count `x` would be if hits were coin flips (`p = 0.5`).
//! Both one-sided tails are needed: the upper tail `P[X >= x]` drives
//! acceptance, the lower tail `P[X <= x]` drives rejection. Trial counts are
//! small (tens to low hundreds), so the exact tail sum is both cheap and
//! preferable to a normal approximation, whose error is worst exactly where
//! the decisions happen: in the tails.
//!
//! Percentiles interpolate linearly between order statistics at rank
//! `q/100 * (m - 1)`, so `q = 100` is the maximum and `q = 50` the median.

/// Natural log of `n!`, by direct summation.
///
/// Trial counts stay small enough that the O(n) sum is irrelevant next to a
/// single model fit, and it is exact to f64 rounding.
fn ln_factorial(n: u64) -> f64 {
    (2..=n).map(|i| (i as f64).ln()).sum()
}

/// Natural log of the binomial coefficient C(n, k).
fn ln_choose(n: u64, k: u64) -> f64 {
    debug_assert!(k <= n);
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Log of the binomial probability mass `P[X = k]` for `X ~ Bin(n, p)`.
fn ln_pmf(k: u64, n: u64, p: f64) -> f64 {
    ln_choose(n, k) + (k as f64) * p.ln() + ((n - k) as f64) * (1.0 - p).ln()
}

/// Upper-tail probability `P[X >= x]` for `X ~ Bin(n, p)`, inclusive.
///
/// `x = 0` returns exactly 1. Summation runs from the extreme tail inward so
/// the smallest terms are accumulated first.
pub fn binom_tail_upper(x: u64, n: u64, p: f64) -> f64 {
    if x == 0 {
        return 1.0;
    }
    if x > n {
        return 0.0;
    }
    let sum: f64 = (x..=n).rev().map(|k| ln_pmf(k, n, p).exp()).sum();
    sum.min(1.0)
}

/// Lower-tail probability `P[X <= x]` for `X ~ Bin(n, p)`, inclusive.
pub fn binom_tail_lower(x: u64, n: u64, p: f64) -> f64 {
    if x >= n {
        return 1.0;
    }
    let sum: f64 = (0..=x).map(|k| ln_pmf(k, n, p).exp()).sum();
    sum.min(1.0)
}

/// The `q`-th percentile (`0 <= q <= 100`) of `values`, with linear
/// interpolation between adjacent order statistics.
///
/// Panics in debug builds if `values` is empty; callers guarantee at least
/// one shadow importance per trial.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    debug_assert!(!values.is_empty());
    debug_assert!((0.0..=100.0).contains(&q));
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let m = sorted.len();
    if m == 1 {
        return sorted[0];
    }
    let rank = q / 100.0 * (m - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;
    if lo + 1 >= m {
        return sorted[m - 1];
    }
    sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
}

/// Median of the finite (non-NaN) entries of `values`; NaN if none exist.
///
/// History columns carry NaN for trials after a feature was pruned, so every
/// cross-trial aggregate must skip them.
pub fn nan_median(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    percentile(&finite, 50.0)
}

/// Mean of the finite (non-NaN) entries of `values`; NaN if none exist.
pub fn nan_mean(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Population standard deviation of the finite entries (divisor `n`, not
/// `n - 1`), matching the z-score convention of the importance scorer.
pub fn nan_std(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for &v in values {
        if !v.is_nan() {
            let d = v - mean;
            sum_sq += d * d;
            count += 1;
        }
    }
    (sum_sq / count as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn upper_tail_matches_hand_computation() {
        // P[X >= 8 | n = 10, p = 0.5] = (45 + 10 + 1) / 1024
        assert_relative_eq!(
            binom_tail_upper(8, 10, 0.5),
            56.0 / 1024.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn lower_tail_matches_hand_computation() {
        // P[X <= 2 | n = 10, p = 0.5] = (1 + 10 + 45) / 1024
        assert_relative_eq!(
            binom_tail_lower(2, 10, 0.5),
            56.0 / 1024.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn tails_are_inclusive_and_bounded() {
        assert_relative_eq!(binom_tail_upper(0, 5, 0.5), 1.0);
        assert_relative_eq!(binom_tail_lower(5, 5, 0.5), 1.0);
        assert_eq!(binom_tail_upper(6, 5, 0.5), 0.0);
        for x in 0..=20u64 {
            let p = binom_tail_upper(x, 20, 0.5);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn one_trial_cannot_reach_small_p_values() {
        // The most extreme single-trial outcomes still have p = 0.5.
        assert_relative_eq!(binom_tail_upper(1, 1, 0.5), 0.5);
        assert_relative_eq!(binom_tail_lower(0, 1, 0.5), 0.5);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&v, 100.0), 4.0);
        assert_relative_eq!(percentile(&v, 0.0), 1.0);
        assert_relative_eq!(percentile(&v, 50.0), 2.5);
        assert_relative_eq!(percentile(&v, 25.0), 1.75);
    }

    #[test]
    fn percentile_is_order_invariant() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(percentile(&v, 75.0), 3.25);
    }

    #[test]
    fn nan_median_skips_missing_rows() {
        let v = [f64::NAN, 2.0, f64::NAN, 4.0, 6.0];
        assert_relative_eq!(nan_median(&v), 4.0);
        assert!(nan_median(&[f64::NAN]).is_nan());
    }

    #[test]
    fn nan_std_is_population_std() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(nan_std(&v), 1.25_f64.sqrt(), epsilon = 1e-12);
    }
}
