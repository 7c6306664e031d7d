//! Robust statistics for cross-sectional normalization.
//!
//! Peer groups are small and fundamentals are fat-tailed, so the centre is the
//! median and the spread is the median absolute deviation rescaled to be
//! comparable with a standard deviation under normality.
use statrs::distribution::{ContinuousCDF, Normal};

/// MAD scale factor for consistency with the normal standard deviation.
pub const MAD_SCALE: f64 = 1.4826;
/// Mean-absolute-deviation scale factor, sqrt(pi / 2).
pub const MEAN_AD_SCALE: f64 = 1.2533;

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation (divides by n).
pub fn population_std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    variance.sqrt()
}

fn sorted(data: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v
}

/// Median of the finite values. Sorting makes the result independent of input order.
pub fn median(data: &[f64]) -> Option<f64> {
    let v = sorted(data);
    if v.is_empty() {
        return None;
    }
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Median absolute deviation around the median (unscaled).
pub fn mad(data: &[f64]) -> Option<f64> {
    let m = median(data)?;
    let deviations: Vec<f64> = data
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - m).abs())
        .collect();
    median(&deviations)
}

/// Mean absolute deviation around the median (unscaled).
pub fn mean_abs_deviation(data: &[f64]) -> Option<f64> {
    let m = median(data)?;
    let deviations: Vec<f64> = data
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - m).abs())
        .collect();
    Some(mean(&deviations))
}

/// Centre and spread of a sample: (median, 1.4826 * MAD).
///
/// When more than half the sample sits on the median the MAD collapses to
/// zero; the spread then falls back to the scaled mean absolute deviation.
/// A spread of zero means every value is identical.
pub fn robust_center_spread(data: &[f64]) -> Option<(f64, f64)> {
    let center = median(data)?;
    let mad = mad(data)? * MAD_SCALE;
    if mad > f64::EPSILON {
        return Some((center, mad));
    }
    let mean_ad = mean_abs_deviation(data)? * MEAN_AD_SCALE;
    Some((center, mean_ad.max(0.0)))
}

/// Robust z-score capped to +/- `cap`. Returns 0 for a degenerate spread.
pub fn robust_z(value: f64, center: f64, spread: f64, cap: f64) -> f64 {
    if !value.is_finite() || spread <= f64::EPSILON {
        return 0.0;
    }
    ((value - center) / spread).clamp(-cap, cap)
}

/// Map a z-score onto 0-100 through the standard normal CDF.
pub fn z_to_score(z: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(z) * 100.0,
        Err(_) => 50.0,
    }
}

/// Compound annual growth rate in percent over `years`.
pub fn cagr(latest: f64, earliest: f64, years: f64) -> Option<f64> {
    if earliest <= 0.0 || latest <= 0.0 || years <= 0.0 {
        return None;
    }
    Some(((latest / earliest).powf(1.0 / years) - 1.0) * 100.0)
}

/// Least-squares slope of `data` against its index.
pub fn linear_slope(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let n = data.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(data);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in data.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den <= f64::EPSILON {
        return None;
    }
    Some(num / den)
}
