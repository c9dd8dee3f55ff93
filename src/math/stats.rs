//! Goodness-of-fit statistics for `statistics.fit`:
//! - chi-square test p-value
//! - Kolmogorov–Smirnov test of normalized residuals against N(0, 1)

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Chi-square survival function `P(X > x)` with `dof` degrees of freedom.
pub fn chi2_sf(x: f64, dof: usize) -> f64 {
    if dof == 0 {
        return f64::NAN;
    }
    ChiSquared::new(dof as f64).map(|dist| dist.sf(x)).unwrap_or(f64::NAN)
}

/// Kolmogorov distribution survival function `P(K > lambda)`.
pub fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for j in 1..=100 {
        let jf = j as f64;
        let term = (-2.0 * jf * jf * lambda * lambda).exp();
        sum += sign * term;
        if term < 1e-16 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// Kolmogorov–Smirnov test of `samples` against the standard normal.
///
/// Returns `(D, p_value)`; the p-value uses the asymptotic distribution with
/// Stephens' small-sample correction.
pub fn ks_test_normal(samples: &[f64]) -> (f64, f64) {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return (f64::NAN, f64::NAN);
    };
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len() as f64;
    let mut d = 0.0_f64;
    for (i, &x) in sorted.iter().enumerate() {
        let cdf = normal.cdf(x);
        let above = (i as f64 + 1.0) / n - cdf;
        let below = cdf - i as f64 / n;
        d = d.max(above).max(below);
    }

    let sqrt_n = n.sqrt();
    let p = kolmogorov_sf((sqrt_n + 0.12 + 0.11 / sqrt_n) * d);
    (d, p)
}
