use crate::process::{ExonError, Region};

use ndarray::Array2;
use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Fewest values the normality check accepts. With two values the fitted
/// normal puts both points at the same distance from the mean and the
/// statistic no longer depends on the data.
pub const MIN_NORMALITY_SAMPLES: usize = 3;

/// Largest smaller-sample size for which the exact U distribution is used.
pub const EXACT_U_MAX_SAMPLES: usize = 8;

/// One-sample Kolmogorov-Smirnov test against a normal fitted to the same values.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalityTest {
    pub statistic: f64,
    pub p_value: f64,
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl NormalityTest {
    pub fn is_normal(&self) -> bool {
        self.p_value >= SIGNIFICANCE_LEVEL
    }

    pub fn message(&self) -> &'static str {
        if self.is_normal() {
            "Data may be normally distributed (fail to reject H0)."
        } else {
            "Data is NOT normally distributed (reject H0)."
        }
    }
}

/// Tests `values` against Normal(mean, sd) where mean and sd (n - 1
/// denominator) come from `values` themselves. Fitting and testing on the same
/// sample makes the p-value optimistic.
///
/// # Errors
/// `InsufficientData` for fewer than [`MIN_NORMALITY_SAMPLES`] values,
/// non-finite values, or zero spread.
pub fn ks_normality_test(values: &[f64]) -> Result<NormalityTest, ExonError> {
    let n = values.len();
    if n < MIN_NORMALITY_SAMPLES {
        return Err(ExonError::InsufficientData(format!(
            "normality check needs at least {} frequencies, found {}",
            MIN_NORMALITY_SAMPLES, n
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ExonError::InsufficientData(
            "normality check received a non-finite frequency".to_string(),
        ));
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON * mean.abs().max(1.0) {
        return Err(ExonError::InsufficientData(format!(
            "all {} frequencies are identical; no normal can be fitted",
            n
        )));
    }
    let normal = Normal::new(mean, std_dev)
        .map_err(|e| ExonError::InsufficientData(format!("cannot fit normal: {}", e)))?;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let statistic = ks_statistic(&sorted, |x| normal.cdf(x));
    let p_value = (1.0 - kolmogorov_cdf(n, statistic)).clamp(0.0, 1.0);

    Ok(NormalityTest {
        statistic,
        p_value,
        n,
        mean,
        std_dev,
    })
}

/// Two-sided statistic sup |F_n(x) - F(x)| for ascending `sorted`.
pub fn ks_statistic<F: Fn(f64) -> f64>(sorted: &[f64], cdf: F) -> f64 {
    let n = sorted.len() as f64;
    sorted.iter().enumerate().fold(0.0_f64, |d, (i, &x)| {
        let f = cdf(x);
        let above = (i as f64 + 1.0) / n - f;
        let below = f - i as f64 / n;
        d.max(above).max(below)
    })
}

/// P(D_n < d) for the two-sided one-sample statistic (Marsaglia, Tsang and
/// Wang 2003). Large `n * d^2` uses their closed-form approximation.
pub fn kolmogorov_cdf(n: usize, d: f64) -> f64 {
    if n == 0 || d >= 1.0 {
        return 1.0;
    }
    if d <= 0.0 {
        return 0.0;
    }
    let nf = n as f64;
    let s = d * d * nf;
    if s > 7.24 || (s > 3.76 && n > 99) {
        return 1.0 - 2.0 * (-(2.000071 + 0.331 / nf.sqrt() + 1.409 / nf) * s).exp();
    }

    let k = (nf * d) as usize + 1;
    let m = 2 * k - 1;
    let h = k as f64 - nf * d;

    let mut hm = Array2::<f64>::zeros((m, m));
    for i in 0..m {
        for j in 0..m {
            if i + 1 >= j {
                hm[[i, j]] = 1.0;
            }
        }
    }
    for i in 0..m {
        hm[[i, 0]] -= h.powi(i as i32 + 1);
        hm[[m - 1, i]] -= h.powi((m - i) as i32);
    }
    if 2.0 * h - 1.0 > 0.0 {
        hm[[m - 1, 0]] += (2.0 * h - 1.0).powi(m as i32);
    }
    for i in 0..m {
        for j in 0..m {
            if i + 1 > j {
                for g in 1..=(i + 1 - j) {
                    hm[[i, j]] /= g as f64;
                }
            }
        }
    }

    let (q, mut exponent) = scaled_matrix_power(&hm, n);
    let mut p = q[[k - 1, k - 1]];
    for i in 1..=n {
        p = p * i as f64 / nf;
        if p < 1e-140 {
            p *= 1e140;
            exponent -= 140;
        }
    }
    (p * 10f64.powi(exponent)).clamp(0.0, 1.0)
}

/// `a^n` as (matrix, decimal exponent), rescaled to stay within f64 range.
fn scaled_matrix_power(a: &Array2<f64>, n: usize) -> (Array2<f64>, i32) {
    if n <= 1 {
        return (a.clone(), 0);
    }
    let (half, half_exp) = scaled_matrix_power(a, n / 2);
    let squared = half.dot(&half);
    let (mut v, mut exponent) = if n % 2 == 0 {
        (squared, 2 * half_exp)
    } else {
        (a.dot(&squared), 2 * half_exp)
    };
    let mid = a.nrows() / 2;
    if v[[mid, mid]] > 1e140 {
        v.mapv_inplace(|x| x * 1e-140);
        exponent += 140;
    }
    (v, exponent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UTestMethod {
    Exact,
    Asymptotic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MannWhitneyResult {
    /// U of the first sample.
    pub u_statistic: f64,
    pub p_value: f64,
    pub method: UTestMethod,
}

/// Two-sided Mann-Whitney U test.
///
/// The exact null distribution is used when the smaller sample has at most
/// [`EXACT_U_MAX_SAMPLES`] values and nothing is tied; otherwise the normal
/// approximation with tie and continuity correction. When every value is
/// tied the variance vanishes and the p-value is 1.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> Result<MannWhitneyResult, ExonError> {
    if x.is_empty() || y.is_empty() {
        return Err(ExonError::InsufficientData(format!(
            "rank-sum test needs observations in both samples, found {} and {}",
            x.len(),
            y.len()
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(ExonError::InsufficientData(
            "rank-sum test received a non-finite value".to_string(),
        ));
    }

    let (n1, n2) = (x.len(), y.len());
    let combined: Vec<f64> = x.iter().chain(y).copied().collect();
    let (ranks, tie_sum) = midranks(&combined);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let u_max = u1.max(u2);

    let (method, p_value) = if n1.min(n2) <= EXACT_U_MAX_SAMPLES && tie_sum == 0.0 {
        // The null distribution is unchanged when the samples swap roles
        let counts = u_null_distribution(n1.min(n2), n1.max(n2));
        let total: f64 = counts.iter().sum();
        let at_least = counts[u_max.round() as usize..].iter().sum::<f64>() / total;
        (UTestMethod::Exact, (2.0 * at_least).min(1.0))
    } else {
        let nf = (n1 + n2) as f64;
        let mu = (n1 * n2) as f64 / 2.0;
        let variance = (n1 * n2) as f64 / 12.0 * ((nf + 1.0) - tie_sum / (nf * (nf - 1.0)));
        let p = if variance > 0.0 {
            let z = (u_max - mu - 0.5) / variance.sqrt();
            let standard = Normal::new(0.0, 1.0)
                .map_err(|e| ExonError::InsufficientData(e.to_string()))?;
            (2.0 * standard.sf(z)).clamp(0.0, 1.0)
        } else {
            1.0
        };
        (UTestMethod::Asymptotic, p)
    };

    Ok(MannWhitneyResult {
        u_statistic: u1,
        p_value,
        method,
    })
}

/// Average ranks (1-based) and the tie term sum(t^3 - t).
fn midranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        let t = (end - start) as f64;
        tie_sum += t * t * t - t;
        start = end;
    }
    (ranks, tie_sum)
}

/// Number of orderings of n1 + n2 distinct values giving each U in 0..=n1*n2.
fn u_null_distribution(n1: usize, n2: usize) -> Vec<f64> {
    let max_u = n1 * n2;
    // dp[a][u]: orderings of the items placed so far with `a` from the first sample
    let mut dp = vec![vec![0.0_f64; max_u + 1]; n1 + 1];
    dp[0][0] = 1.0;
    for placed in 0..(n1 + n2) {
        let mut next = vec![vec![0.0_f64; max_u + 1]; n1 + 1];
        for a in 0..=n1.min(placed) {
            let b = placed - a;
            if b > n2 {
                continue;
            }
            for u in 0..=max_u {
                let c = dp[a][u];
                if c == 0.0 {
                    continue;
                }
                if a < n1 {
                    next[a + 1][u + b] += c;
                }
                if b < n2 {
                    next[a][u] += c;
                }
            }
        }
        dp = next;
    }
    dp.swap_remove(n1)
}

/// Rank-sum comparison of the two primary groups within one region.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupComparison {
    pub region: Region,
    pub first_label: String,
    pub second_label: String,
    pub first_n: usize,
    pub second_n: usize,
    pub result: MannWhitneyResult,
}

impl GroupComparison {
    pub fn is_significant(&self) -> bool {
        self.result.p_value < SIGNIFICANCE_LEVEL
    }

    pub fn message(&self) -> String {
        if self.is_significant() {
            format!(
                "{}: Significant difference between {} and {} groups.",
                self.region, self.first_label, self.second_label
            )
        } else {
            format!(
                "{}: No significant difference between {} and {} groups.",
                self.region, self.first_label, self.second_label
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOutcome {
    Tested(GroupComparison),
    Skipped { region: Region, reason: String },
}

impl ComparisonOutcome {
    pub fn region(&self) -> Region {
        match self {
            ComparisonOutcome::Tested(c) => c.region,
            ComparisonOutcome::Skipped { region, .. } => *region,
        }
    }
}

/// Compares `first` against `second` for one region. A region where either
/// group has no observations is skipped with the reason recorded.
pub fn compare_region(
    region: Region,
    first_label: &str,
    first: &[f64],
    second_label: &str,
    second: &[f64],
) -> ComparisonOutcome {
    let missing: Vec<&str> = [(first_label, first), (second_label, second)]
        .iter()
        .filter(|(_, values)| values.is_empty())
        .map(|(label, _)| *label)
        .collect();
    if !missing.is_empty() {
        return ComparisonOutcome::Skipped {
            region,
            reason: format!("no observations for {}", missing.join(" and ")),
        };
    }

    match mann_whitney_u(first, second) {
        Ok(result) => ComparisonOutcome::Tested(GroupComparison {
            region,
            first_label: first_label.to_string(),
            second_label: second_label.to_string(),
            first_n: first.len(),
            second_n: second.len(),
            result,
        }),
        Err(e) => ComparisonOutcome::Skipped {
            region,
            reason: e.to_string(),
        },
    }
}
