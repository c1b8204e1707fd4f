//! Two-sample Kolmogorov–Smirnov test used for train/test drift detection.

use serde::{Deserialize, Serialize};

/// Above this many `n * m` sample pairs the asymptotic distribution is used
/// instead of exact lattice-path counting.
const EXACT_MAX_PAIRS: u64 = 10_000;

/// Result of a two-sided two-sample KS test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    /// Largest absolute gap between the two empirical CDFs.
    pub statistic: f64,
    pub p_value: f64,
}

impl KsResult {
    /// Whether the samples differ at significance level `alpha`.
    pub fn rejects(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Two-sided two-sample KS test on the observed values of `a` and `b`.
///
/// NaNs are ignored. Returns `None` when either side has no observations.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> Option<KsResult> {
    let mut a: Vec<f64> = a.iter().copied().filter(|x| !x.is_nan()).collect();
    let mut b: Vec<f64> = b.iter().copied().filter(|x| !x.is_nan()).collect();
    if a.is_empty() || b.is_empty() {
        return None;
    }
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let n = a.len() as u64;
    let m = b.len() as u64;
    let gap = max_cdf_gap(&a, &b);
    let statistic = gap as f64 / (n * m) as f64;

    let p_value = if gap == 0 {
        1.0
    } else if n * m <= EXACT_MAX_PAIRS {
        exact_p_value(n, m, gap)
    } else {
        asymptotic_p_value(n, m, statistic)
    };

    Some(KsResult {
        statistic,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

/// `max |i*m - j*n|` over the merged walk of both sorted samples, which is
/// the KS statistic scaled by `n * m`. Ties advance both sides together.
fn max_cdf_gap(a: &[f64], b: &[f64]) -> u64 {
    let (n, m) = (a.len() as i64, b.len() as i64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut best = 0i64;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        best = best.max((i as i64 * m - j as i64 * n).abs());
    }
    best as u64
}

/// `P(D >= gap / nm)` by counting monotone lattice paths from `(0, 0)` to
/// `(n, m)` that stay strictly inside the band `|i*m - j*n| < gap`.
fn exact_p_value(n: u64, m: u64, gap: u64) -> f64 {
    let gap = gap as i64;
    let (n, m) = (n as i64, m as i64);
    let mut row = vec![0.0f64; m as usize + 1];

    for i in 0..=n {
        for j in 0..=m {
            let ju = j as usize;
            if (i * m - j * n).abs() >= gap {
                row[ju] = 0.0;
            } else if i == 0 && j == 0 {
                row[ju] = 1.0;
            } else {
                let up = if i > 0 { row[ju] } else { 0.0 };
                let left = if j > 0 { row[ju - 1] } else { 0.0 };
                row[ju] = up + left;
            }
        }
    }

    let inside = row[m as usize] / binomial(n + m, n);
    1.0 - inside
}

fn binomial(total: i64, k: i64) -> f64 {
    let k = k.min(total - k);
    (1..=k).fold(1.0, |acc, i| acc * (total - k + i) as f64 / i as f64)
}

/// Kolmogorov distribution tail with the Stephens small-sample correction.
fn asymptotic_p_value(n: u64, m: u64, statistic: f64) -> f64 {
    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * statistic;
    kolmogorov_q(lambda)
}

fn kolmogorov_q(lambda: f64) -> f64 {
    // Q(0.2) differs from 1 only past the 12th decimal.
    if lambda < 0.2 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 1.0;
    let mut sum = 0.0;
    let mut prev = 0.0f64;
    for j in 1..=100 {
        let jf = j as f64;
        let term = sign * 2.0 * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= 1e-10 * prev || term.abs() <= 1e-12 * sum.abs() {
            return sum;
        }
        sign = -sign;
        prev = term.abs();
    }
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread(start: f64, end: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn test_identical_samples_never_drift() {
        let a = vec![1.0, -1.0, 0.0, 1.0, 1.0, -1.0];
        let result = ks_2samp(&a, &a).unwrap();
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
        assert!(!result.rejects(0.05));
    }

    #[test]
    fn test_disjoint_samples_drift() {
        let result = ks_2samp(&spread(0.0, 1.0, 20), &spread(100.0, 101.0, 20)).unwrap();
        assert_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-6);
        assert!(result.rejects(0.05));
    }

    #[test]
    fn test_exact_p_value_matches_path_count() {
        // Only 2 of the C(20, 10) orderings separate the samples completely.
        let result = ks_2samp(&spread(0.0, 1.0, 10), &spread(100.0, 101.0, 10)).unwrap();
        let expected = 2.0 / 184_756.0;
        assert!((result.p_value - expected).abs() < 1e-12);
    }

    #[test]
    fn test_large_disjoint_samples_use_asymptotic_tail() {
        let result = ks_2samp(&spread(0.0, 1.0, 200), &spread(5.0, 6.0, 200)).unwrap();
        assert_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-10);
    }

    #[test]
    fn test_same_distribution_large_samples_pass() {
        let a = spread(0.0, 1.0, 300);
        let b: Vec<f64> = spread(0.0, 1.0, 301);
        let result = ks_2samp(&a, &b).unwrap();
        assert!(result.statistic < 0.01);
        assert!(!result.rejects(0.05));
    }

    #[test]
    fn test_nans_are_ignored_and_empty_is_untestable() {
        let result = ks_2samp(&[1.0, f64::NAN, 2.0], &[1.0, 2.0]).unwrap();
        assert_eq!(result.statistic, 0.0);
        assert!(ks_2samp(&[f64::NAN], &[1.0]).is_none());
        assert!(ks_2samp(&[], &[1.0]).is_none());
    }
}
