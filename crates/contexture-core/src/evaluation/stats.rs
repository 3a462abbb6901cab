//! Statistical backing for engine comparisons.
//!
//! Per-query triad scores are noisy, so a leaderboard gap between two
//! engines needs more than a glance at the means. This module provides:
//! - bootstrap confidence intervals for a metric mean
//! - paired t-tests over index-aligned per-query series
//! - Cohen's d effect sizes
//!
//! Randomness comes from a small seeded generator so reports are
//! reproducible run to run.

/// Mean with a bootstrap 95% confidence interval.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapResult {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

impl BootstrapResult {
    /// Formats as `mean [lower, upper]`.
    pub fn display(&self, precision: usize) -> String {
        format!(
            "{:.prec$} [{:.prec$}, {:.prec$}]",
            self.mean,
            self.lower,
            self.upper,
            prec = precision
        )
    }
}

/// Bootstraps a 95% confidence interval for the mean of `values`.
///
/// Resamples with replacement `resamples` times, takes the 2.5th and
/// 97.5th percentiles of the resampled means. Typical input is one
/// engine's present values for one triad metric. Empty input yields NaN
/// bounds.
pub fn bootstrap_ci(values: &[f64], resamples: usize, seed: u64) -> BootstrapResult {
    if values.is_empty() {
        return BootstrapResult {
            mean: f64::NAN,
            lower: f64::NAN,
            upper: f64::NAN,
        };
    }

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;

    let mut rng = SeededRng::new(seed);
    let mut means: Vec<f64> = (0..resamples)
        .map(|_| {
            let sum: f64 = (0..n).map(|_| values[rng.index(n)]).sum();
            sum / n as f64
        })
        .collect();
    means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    BootstrapResult {
        mean,
        lower: percentile(&means, 0.025),
        upper: percentile(&means, 0.975),
    }
}

fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let index = ((sorted.len() as f64) * fraction) as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Outcome of a paired t-test between two engines.
#[derive(Debug, Clone, Copy)]
pub struct TTestResult {
    /// Positive when the first series scores higher on average.
    pub t_statistic: f64,
    /// Two-tailed p-value.
    pub p_value: f64,
    pub df: usize,
}

impl TTestResult {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }

    /// Formats as `t(df)=..., p=...` with a star at p < 0.05.
    pub fn display(&self) -> String {
        let marker = if self.is_significant(0.05) { "*" } else { "" };
        format!(
            "t({})={:.3}, p={:.4}{}",
            self.df, self.t_statistic, self.p_value, marker
        )
    }
}

/// Paired t-test over two index-aligned score series.
///
/// Both series must come from the same queries in the same order, which
/// is what [`Leaderboard::metric_series`](crate::evaluation::Leaderboard::metric_series)
/// produces when two engines ran the same batch. Callers drop indices
/// where either side is absent before passing the series in.
///
/// # Panics
///
/// Panics when the series differ in length or are empty.
pub fn paired_ttest(first: &[f64], second: &[f64]) -> TTestResult {
    assert_eq!(
        first.len(),
        second.len(),
        "paired test needs index-aligned series"
    );
    assert!(!first.is_empty(), "paired test needs at least one pair");

    let n = first.len();
    let df = n - 1;

    let diffs: Vec<f64> = first.iter().zip(second).map(|(a, b)| a - b).collect();
    let mean_diff = diffs.iter().sum::<f64>() / n as f64;
    let var_diff = if df == 0 {
        0.0
    } else {
        diffs.iter().map(|d| (d - mean_diff).powi(2)).sum::<f64>() / df as f64
    };
    let se = (var_diff / n as f64).sqrt();

    let t = if se > 0.0 { mean_diff / se } else { 0.0 };
    TTestResult {
        t_statistic: t,
        p_value: two_tailed_p(t.abs(), df.max(1)),
        df,
    }
}

/// Cohen's d standardized effect size between two score groups.
///
/// Positive when the first group scores higher. Conventional reading:
/// below 0.2 negligible, 0.5 medium, 0.8 and up large.
pub fn cohens_d(first: &[f64], second: &[f64]) -> f64 {
    if first.len() < 2 || second.len() < 2 {
        return 0.0;
    }

    let (n_a, n_b) = (first.len() as f64, second.len() as f64);
    let mean_a = first.iter().sum::<f64>() / n_a;
    let mean_b = second.iter().sum::<f64>() / n_b;
    let var_a = first.iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / (n_a - 1.0);
    let var_b = second.iter().map(|x| (x - mean_b).powi(2)).sum::<f64>() / (n_b - 1.0);

    let pooled = (((n_a - 1.0) * var_a + (n_b - 1.0) * var_b) / (n_a + n_b - 2.0)).sqrt();
    if pooled == 0.0 {
        return 0.0;
    }
    (mean_a - mean_b) / pooled
}

/// Names the magnitude of a Cohen's d value.
pub fn effect_size_label(d: f64) -> &'static str {
    match d.abs() {
        d if d < 0.2 => "negligible",
        d if d < 0.5 => "small",
        d if d < 0.8 => "medium",
        _ => "large",
    }
}

// ============================================================================
// Seeded generator
// ============================================================================

/// Linear congruential generator, Numerical Recipes parameters. Keeps
/// bootstrap output reproducible without pulling in a randomness crate.
struct SeededRng {
    state: u64,
}

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn index(&mut self, len: usize) -> usize {
        (self.next() as usize) % len
    }
}

// ============================================================================
// t-distribution tail probability
// ============================================================================

/// Two-tailed p-value for |t| with `df` degrees of freedom.
///
/// Small df goes through the incomplete beta identity
/// `p = I_{df/(df+t^2)}(df/2, 1/2)`; large df uses the normal
/// approximation.
fn two_tailed_p(t_abs: f64, df: usize) -> f64 {
    if df > 100 {
        return 2.0 * (1.0 - normal_cdf(t_abs));
    }
    let x = df as f64 / (df as f64 + t_abs * t_abs);
    incomplete_beta(df as f64 / 2.0, 0.5, x)
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 polynomial approximation.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Regularized incomplete beta via the continued fraction expansion.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-10;
    const TINY: f64 = 1e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let numerator = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let numerator = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Lanczos approximation of ln(gamma(x)).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];

    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000000000190015;
    for coeff in COEFFS {
        y += 1.0;
        series += coeff / y;
    }
    -tmp + (2.5066282746310005 * series / x).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_brackets_the_mean() {
        let values = vec![0.7, 0.75, 0.8, 0.72, 0.78, 0.74, 0.76, 0.79];
        let result = bootstrap_ci(&values, 2000, 42);

        assert!((result.mean - 0.755).abs() < 0.01);
        assert!(result.lower <= result.mean);
        assert!(result.mean <= result.upper);
    }

    #[test]
    fn test_bootstrap_is_reproducible_for_a_seed() {
        let values = vec![0.4, 0.5, 0.6, 0.55];
        let a = bootstrap_ci(&values, 500, 7);
        let b = bootstrap_ci(&values, 500, 7);
        assert_eq!(a.lower, b.lower);
        assert_eq!(a.upper, b.upper);
    }

    #[test]
    fn test_bootstrap_of_nothing_is_nan() {
        let result = bootstrap_ci(&[], 100, 1);
        assert!(result.mean.is_nan());
    }

    #[test]
    fn test_clear_separation_is_significant() {
        let strong = vec![0.9, 0.88, 0.92, 0.91, 0.89, 0.9, 0.93, 0.87];
        let weak = vec![0.5, 0.52, 0.48, 0.51, 0.49, 0.5, 0.53, 0.47];

        let result = paired_ttest(&strong, &weak);
        assert!(result.t_statistic > 0.0, "first series is stronger");
        assert!(result.is_significant(0.05));
    }

    #[test]
    fn test_identical_series_are_not_significant() {
        let scores = vec![0.6, 0.7, 0.65, 0.62];
        let result = paired_ttest(&scores, &scores);
        assert_eq!(result.t_statistic, 0.0);
        assert!(!result.is_significant(0.05));
    }

    #[test]
    fn test_cohens_d_reads_direction_and_magnitude() {
        let high = vec![0.9, 0.85, 0.88, 0.92];
        let low = vec![0.5, 0.55, 0.48, 0.52];

        let d = cohens_d(&high, &low);
        assert!(d > 0.8, "separation this wide is a large effect, got {d}");
        assert_eq!(effect_size_label(d), "large");
        assert!(cohens_d(&low, &high) < 0.0);
    }

    #[test]
    fn test_degenerate_groups_have_no_effect_size() {
        assert_eq!(cohens_d(&[0.5], &[0.5, 0.6]), 0.0);
        assert_eq!(cohens_d(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
    }

    #[test]
    fn test_erf_matches_known_points() {
        assert!(erf(0.0).abs() < 1e-9);
        assert!((erf(1.0) - 0.8427).abs() < 1e-3);
        assert!((erf(-1.0) + 0.8427).abs() < 1e-3);
    }
}
