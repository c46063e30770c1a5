// SPDX-License-Identifier: MIT

//! Descriptive statistics and the two drift tests
//!
//! Moments follow the usual dataframe conventions: sample standard deviation
//! (ddof = 1), adjusted Fisher-Pearson skewness and bias-corrected excess
//! kurtosis. KS p-values are exact for samples of up to `KS_EXACT_MAX`
//! values and asymptotic above that; chi-square p-values come from the
//! regularized upper incomplete gamma function.

use super::error::{GovernorError, Result};

/// Test statistic and p-value of a hypothesis test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sum of `(x - mean)^power`
fn central_sum(values: &[f64], mean: f64, power: i32) -> f64 {
    values.iter().map(|x| (x - mean).powi(power)).sum()
}

/// Standard deviation with n - 1 in the denominator
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    Some((central_sum(values, m, 2) / (values.len() - 1) as f64).sqrt())
}

/// Standard deviation with n in the denominator
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some((central_sum(values, m, 2) / values.len() as f64).sqrt())
}

/// Adjusted Fisher-Pearson skewness; needs at least 3 values
pub fn skewness(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 3 {
        return None;
    }
    let m = mean(values)?;
    let m2 = central_sum(values, m, 2) / n;
    if m2 == 0.0 {
        return Some(0.0);
    }
    let m3 = central_sum(values, m, 3) / n;
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (n * (n - 1.0)).sqrt() / (n - 2.0))
}

/// Bias-corrected excess kurtosis; needs at least 4 values
pub fn kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 4 {
        return None;
    }
    let m = mean(values)?;
    let m2 = central_sum(values, m, 2) / n;
    if m2 == 0.0 {
        return Some(0.0);
    }
    let m4 = central_sum(values, m, 4) / n;
    let g2 = m4 / (m2 * m2) - 3.0;
    Some(((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0)))
}

/// Largest sample size for which the KS p-value is computed exactly
pub const KS_EXACT_MAX: usize = 10_000;

/// Two-sample Kolmogorov-Smirnov test, two-sided
pub fn ks_2samp(current: &[f64], reference: &[f64]) -> Result<TestResult> {
    if current.is_empty() || reference.is_empty() {
        return Err(GovernorError::statistical(
            "Kolmogorov-Smirnov needs non-empty samples",
        ));
    }

    let mut a = current.to_vec();
    let mut b = reference.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n1, n2) = (a.len(), b.len());
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < n1 && j < n2 {
        // Step both empirical CDFs past every value equal to x so ties move together
        let x = a[i].min(b[j]);
        while i < n1 && a[i] <= x {
            i += 1;
        }
        while j < n2 && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 as f64 - j as f64 / n2 as f64).abs());
    }

    let p_value = if d == 0.0 {
        1.0
    } else if n1.max(n2) <= KS_EXACT_MAX {
        ks_exact_p(n1, n2, d)
    } else {
        let en = ((n1 * n2) as f64 / (n1 + n2) as f64).sqrt();
        kolmogorov_q((en + 0.12 + 0.11 / en) * d)
    };
    Ok(TestResult {
        statistic: d,
        p_value,
    })
}

/// P(D >= d) under the null, by counting lattice paths
///
/// A path from (0, 0) to (n1, n2) steps one sample at a time; every ordering
/// is equally likely, so moving along `i` from (i, j) has probability
/// `(n1 - i) / (n1 - i + n2 - j)`. The walk tracks the probability of
/// staying strictly inside `|i / n1 - j / n2| < d`.
fn ks_exact_p(n1: usize, n2: usize, d: f64) -> f64 {
    // D * n1 * n2 is an integer; compare on that scale to avoid rounding
    let bound = (d * (n1 * n2) as f64).round() as u64;
    let inside =
        |i: usize, j: usize| ((i * n2) as i64 - (j * n1) as i64).unsigned_abs() < bound;

    let mut row = vec![0.0f64; n2 + 1];
    for i in 0..=n1 {
        for j in 0..=n2 {
            let mut p = if i == 0 && j == 0 { 1.0 } else { 0.0 };
            if i > 0 {
                // row[j] still holds (i - 1, j)
                p += row[j] * (n1 - i + 1) as f64 / (n1 - i + 1 + n2 - j) as f64;
            }
            if j > 0 {
                p += row[j - 1] * (n2 - j + 1) as f64 / (n1 - i + n2 - j + 1) as f64;
            }
            row[j] = if inside(i, j) { p } else { 0.0 };
        }
    }
    (1.0 - row[n2]).clamp(0.0, 1.0)
}

/// Survival function of the Kolmogorov distribution
fn kolmogorov_q(lambda: f64) -> f64 {
    const EPS1: f64 = 0.001;
    const EPS2: f64 = 1.0e-8;

    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;
    for j in 1..=100 {
        let j = j as f64;
        let term = fac * (a2 * j * j).exp();
        sum += term;
        if term.abs() <= EPS1 * previous || term.abs() <= EPS2 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        previous = term.abs();
    }
    // The series does not converge for tiny lambda, where the tail is 1
    1.0
}

/// Chi-square goodness-of-fit of `observed` against `expected` frequencies
/// with `k - 1` degrees of freedom
pub fn chi_square(observed: &[f64], expected: &[f64]) -> Result<TestResult> {
    if observed.len() != expected.len() {
        return Err(GovernorError::statistical(format!(
            "frequency vectors differ in length ({} vs {})",
            observed.len(),
            expected.len()
        )));
    }
    if observed.len() < 2 {
        return Err(GovernorError::statistical(
            "chi-square needs at least 2 categories",
        ));
    }
    if expected.iter().all(|&e| e == 0.0) {
        return Err(GovernorError::statistical(
            "all expected frequencies are zero",
        ));
    }

    let mut statistic = 0.0;
    for (&o, &e) in observed.iter().zip(expected) {
        if e == 0.0 {
            if o > 0.0 {
                statistic = f64::INFINITY;
            }
            continue;
        }
        statistic += (o - e).powi(2) / e;
    }

    let df = (observed.len() - 1) as f64;
    let p_value = if statistic.is_infinite() {
        0.0
    } else {
        gamma_q(df / 2.0, statistic / 2.0)
    };
    Ok(TestResult {
        statistic,
        p_value,
    })
}

const GAMMA_ITMAX: usize = 200;
const GAMMA_EPS: f64 = 3.0e-12;
const GAMMA_FPMIN: f64 = 1.0e-300;

/// Regularized upper incomplete gamma function Q(a, x)
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - gamma_series(a, x)
    } else {
        gamma_continued_fraction(a, x)
    }
}

/// P(a, x) by its series expansion
fn gamma_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut del = 1.0 / a;
    let mut sum = del;
    for _ in 0..GAMMA_ITMAX {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * GAMMA_EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

/// Q(a, x) by Lentz's continued fraction
fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / GAMMA_FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=GAMMA_ITMAX {
        let i = i as f64;
        let an = -i * (i - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < GAMMA_FPMIN {
            d = GAMMA_FPMIN;
        }
        c = b + an / c;
        if c.abs() < GAMMA_FPMIN {
            c = GAMMA_FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < GAMMA_EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// ln Γ(x) for x > 0 (Lanczos approximation)
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for c in COEFFICIENTS {
        y += 1.0;
        series += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_central_tendency() {
        assert_eq!(mean(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(mean(&[]), None);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_standard_deviations() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(population_std(&values).unwrap(), 2.0, 1e-12));
        assert!(close(sample_std(&values).unwrap(), (32.0f64 / 7.0).sqrt(), 1e-12));
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn test_shape_moments() {
        let symmetric = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(close(skewness(&symmetric).unwrap(), 0.0, 1e-12));
        assert!(close(kurtosis(&symmetric).unwrap(), -1.2, 1e-12));

        let right_tailed = [1.0, 1.0, 1.0, 2.0, 10.0];
        assert!(skewness(&right_tailed).unwrap() > 0.0);

        assert_eq!(skewness(&[1.0, 2.0]), None);
        assert_eq!(kurtosis(&[1.0, 2.0, 3.0]), None);
        assert_eq!(skewness(&[4.0, 4.0, 4.0]), Some(0.0));
    }

    #[test]
    fn test_ln_gamma() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-9));
        assert!(close(ln_gamma(5.0), 24.0f64.ln(), 1e-9));
        assert!(close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-9));
    }

    #[test]
    fn test_gamma_q_matches_closed_form() {
        // Q(1, x) = e^-x
        for x in [0.1, 0.5, 1.0, 2.5, 8.0] {
            assert!(close(gamma_q(1.0, x), (-x as f64).exp(), 1e-9));
        }
        assert_eq!(gamma_q(2.0, 0.0), 1.0);
    }

    #[test]
    fn test_ks_identical_samples() {
        let sample: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let result = ks_2samp(&sample, &sample).unwrap();
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_ks_disjoint_samples() {
        let low: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let high: Vec<f64> = (100..150).map(|i| i as f64).collect();
        let result = ks_2samp(&low, &high).unwrap();
        assert_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-10);
    }

    #[test]
    fn test_ks_small_disjoint_samples_are_exact() {
        // Only the two extreme orderings out of C(6, 3) = 20 reach D = 1
        let result = ks_2samp(&[1.0, 2.0, 3.0], &[100.0, 101.0, 102.0]).unwrap();
        assert_eq!(result.statistic, 1.0);
        assert!(close(result.p_value, 0.1, 1e-12));

        // C(8, 4) = 70
        let result = ks_2samp(&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0]).unwrap();
        assert!(close(result.p_value, 2.0 / 70.0, 1e-12));
    }

    #[test]
    fn test_ks_exact_unequal_sizes() {
        // D = 1 for sizes 2 and 4: 2 of C(6, 2) = 15 orderings
        let result = ks_2samp(&[0.0, 1.0], &[10.0, 11.0, 12.0, 13.0]).unwrap();
        assert!(close(result.p_value, 2.0 / 15.0, 1e-12));

        // A single interleaving is far from significant
        let result = ks_2samp(&[1.0, 3.0, 5.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!(close(result.statistic, 1.0 / 3.0, 1e-12));
        assert!(close(result.p_value, 1.0, 1e-12));
    }

    #[test]
    fn test_ks_large_samples_use_asymptotic_tail() {
        let low: Vec<f64> = (0..KS_EXACT_MAX as i64 + 1).map(|i| i as f64).collect();
        let high: Vec<f64> = low.iter().map(|x| x + 0.5).collect();
        let result = ks_2samp(&low, &high).unwrap();
        assert!(result.statistic < 1e-3);
        assert!(result.p_value > 0.99);
    }

    #[test]
    fn test_ks_statistic_with_ties() {
        let a = [1.0, 2.0, 2.0, 3.0];
        let b = [2.0, 2.0, 3.0, 4.0];
        // After x = 1: 1/4 vs 0; after x = 2: 3/4 vs 2/4; after x = 3: 1 vs 3/4
        let result = ks_2samp(&a, &b).unwrap();
        assert!(close(result.statistic, 0.25, 1e-12));
        assert!(ks_2samp(&[], &b).is_err());
    }

    #[test]
    fn test_chi_square_identical() {
        let freq = [0.2, 0.3, 0.5];
        let result = chi_square(&freq, &freq).unwrap();
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_chi_square_two_degrees_of_freedom() {
        let observed = [0.2, 0.3, 0.5];
        let expected = [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];
        let result = chi_square(&observed, &expected).unwrap();
        // With df = 2 the survival function is exp(-x / 2)
        assert!(close(result.p_value, (-result.statistic / 2.0).exp(), 1e-9));
        assert!(result.p_value > 0.05);
    }

    #[test]
    fn test_chi_square_new_category() {
        let result = chi_square(&[0.5, 0.5], &[1.0, 0.0]).unwrap();
        assert!(result.statistic.is_infinite());
        assert_eq!(result.p_value, 0.0);
    }

    #[test]
    fn test_chi_square_degenerate_input() {
        assert!(matches!(
            chi_square(&[1.0], &[1.0]),
            Err(GovernorError::StatisticalTest(_))
        ));
        assert!(matches!(
            chi_square(&[0.5, 0.5], &[0.0, 0.0]),
            Err(GovernorError::StatisticalTest(_))
        ));
        assert!(chi_square(&[0.5, 0.5], &[1.0]).is_err());
    }
}
