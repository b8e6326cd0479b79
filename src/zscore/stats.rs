//! Pure numeric routines behind the Z-Score Engine: OLS regression, an
//! ADF-style cointegration statistic, AR(1) half-life, and the Hurst
//! exponent via rescaled-range analysis.
//!
//! Closed-form `f64` arithmetic throughout — no external linear-algebra
//! crate, just arrays and sums.

/// Critical values for the (simplified) ADF cointegration test at the 1%, 5%,
/// and 10% levels.
pub const ADF_CRITICAL_VALUES: [f64; 3] = [-3.43, -2.86, -2.57];

/// Ordinary least squares fit of `y = slope * x + intercept`, plus R².
#[derive(Debug, Clone, Copy)]
pub struct OlsResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

pub fn ols(x: &[f64], y: &[f64]) -> Option<OlsResult> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for i in 0..x.len() {
        let dx = x[i] - mean_x;
        cov += dx * (y[i] - mean_y);
        var_x += dx * dx;
    }
    if var_x == 0.0 {
        return None;
    }
    let slope = cov / var_x;
    let intercept = mean_y - slope * mean_x;

    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for i in 0..x.len() {
        let predicted = slope * x[i] + intercept;
        ss_res += (y[i] - predicted).powi(2);
        ss_tot += (y[i] - mean_y).powi(2);
    }
    let r_squared = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    Some(OlsResult {
        slope,
        intercept,
        r_squared,
    })
}

/// Spread series from an OLS fit: `y - (slope * x + intercept)`.
pub fn residuals(x: &[f64], y: &[f64], ols: &OlsResult) -> Vec<f64> {
    x.iter()
        .zip(y.iter())
        .map(|(xi, yi)| yi - (ols.slope * xi + ols.intercept))
        .collect()
}

/// Simplified Augmented Dickey-Fuller statistic on a residual series:
/// regress `Δr_t` on `r_{t-1}` (lag 1, no augmentation terms) and return the
/// t-statistic of that slope.
pub fn adf_statistic(residuals: &[f64]) -> Option<f64> {
    if residuals.len() < 3 {
        return None;
    }
    let lagged = &residuals[..residuals.len() - 1];
    let diffs: Vec<f64> = residuals.windows(2).map(|w| w[1] - w[0]).collect();

    let fit = ols(lagged, &diffs)?;
    let n = lagged.len() as f64;
    let mean_lag = lagged.iter().sum::<f64>() / n;
    let var_lag: f64 = lagged.iter().map(|v| (v - mean_lag).powi(2)).sum();
    if var_lag == 0.0 {
        return None;
    }
    let predicted: Vec<f64> = lagged.iter().map(|v| fit.slope * v + fit.intercept).collect();
    let residual_var: f64 = diffs
        .iter()
        .zip(predicted.iter())
        .map(|(d, p)| (d - p).powi(2))
        .sum::<f64>()
        / (n - 2.0).max(1.0);
    let se_slope = (residual_var / var_lag).sqrt();
    if se_slope == 0.0 {
        return None;
    }
    Some(fit.slope / se_slope)
}

/// Half-life of mean reversion from an AR(1) fit on the residual series:
/// `λ = Σ(Δr_i · r_{i-1}) / Σ r_i²`, `halfLife = ln(2) / |λ|`.
pub fn half_life(residuals: &[f64]) -> Option<f64> {
    if residuals.len() < 3 {
        return None;
    }
    let lagged = &residuals[..residuals.len() - 1];
    let diffs: Vec<f64> = residuals.windows(2).map(|w| w[1] - w[0]).collect();

    let numerator: f64 = diffs.iter().zip(lagged.iter()).map(|(d, r)| d * r).sum();
    let denominator: f64 = lagged.iter().map(|r| r * r).sum();
    if denominator == 0.0 {
        return None;
    }
    let lambda = numerator / denominator;
    if lambda == 0.0 {
        return None;
    }
    Some((2f64).ln() / lambda.abs())
}

/// Hurst exponent via rescaled-range (R/S) analysis over a single window —
/// values < 0.5 indicate mean reversion.
pub fn hurst_exponent(series: &[f64]) -> Option<f64> {
    if series.len() < 8 {
        return None;
    }
    let n = series.len();
    let mean = series.iter().sum::<f64>() / n as f64;

    let mut cumulative = 0.0;
    let mut deviations = Vec::with_capacity(n);
    for v in series {
        cumulative += v - mean;
        deviations.push(cumulative);
    }
    let range = deviations.iter().cloned().fold(f64::MIN, f64::max)
        - deviations.iter().cloned().fold(f64::MAX, f64::min);

    let variance = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 || range == 0.0 {
        return None;
    }
    let rescaled_range = range / std_dev;
    // H = log(R/S) / log(n)
    Some(rescaled_range.ln() / (n as f64).ln())
}

/// Is the ADF statistic below (i.e. more negative than) the 10% critical
/// value.
pub fn is_cointegrated(adf_stat: f64) -> bool {
    adf_stat < ADF_CRITICAL_VALUES[2]
}

/// Signal confidence from the current z-score, adjusted by how trustworthy
/// the underlying mean reversion looks: a Hurst exponent further from 0.5
/// (more strongly mean-reverting) raises confidence, a slower half-life
/// lowers it. Clamped to `[0, 1]`.
pub fn confidence(z: f64, hurst_exponent: f64, half_life: f64) -> f64 {
    let mut c = (z.abs() / 4.0).min(1.0);
    if hurst_exponent < 0.4 {
        c *= 1.2;
    } else if hurst_exponent > 0.6 {
        c *= 0.8;
    }
    if half_life < 10.0 {
        c *= 1.3;
    } else if half_life > 30.0 {
        c *= 0.7;
    }
    c.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ols_recovers_known_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|xi| 2.0 * xi + 3.0).collect();
        let fit = ols(&x, &y).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 3.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn half_life_is_positive_for_mean_reverting_series() {
        // AR(1) with rho ~ 0.5 around zero: strongly mean reverting.
        let mut series = vec![10.0];
        for _ in 0..50 {
            let prev = *series.last().unwrap();
            series.push(prev * 0.5);
        }
        let hl = half_life(&series).unwrap();
        assert!(hl > 0.0);
        assert!(hl < 5.0);
    }

    #[test]
    fn hurst_exponent_below_half_for_strongly_mean_reverting_series() {
        let series: Vec<f64> = (0..64)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let h = hurst_exponent(&series).unwrap();
        assert!(h < 0.5);
    }

    #[test]
    fn is_cointegrated_uses_ten_percent_critical_value() {
        assert!(is_cointegrated(-3.0));
        assert!(!is_cointegrated(-2.0));
    }

    #[test]
    fn adf_statistic_requires_at_least_three_points() {
        assert!(adf_statistic(&[1.0, 2.0]).is_none());
        assert!(adf_statistic(&[1.0, 0.5, 0.2, 0.1]).is_some());
    }

    #[test]
    fn confidence_is_capped_at_one() {
        assert_eq!(confidence(100.0, 0.3, 5.0), 1.0);
    }

    #[test]
    fn confidence_boosted_by_strong_mean_reversion_and_fast_half_life() {
        let base = confidence(2.0, 0.5, 20.0);
        let boosted = confidence(2.0, 0.3, 5.0);
        assert!(boosted > base);
    }

    #[test]
    fn confidence_dampened_by_weak_mean_reversion_and_slow_half_life() {
        let base = confidence(2.0, 0.5, 20.0);
        let dampened = confidence(2.0, 0.7, 40.0);
        assert!(dampened < base);
    }
}
