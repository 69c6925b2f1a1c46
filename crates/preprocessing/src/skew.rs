//! Sample skewness and the log transform applied to skewed columns

use hotel_core::errors::{PipelineError, Result, Stage};

/// Bias-corrected sample skewness (adjusted Fisher-Pearson G1)
///
/// NaN values are skipped. Returns 0 for fewer than three values or a
/// constant column.
pub fn skewness(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let n = finite.len() as f64;
    if n < 3.0 {
        return 0.0;
    }

    let mean = finite.iter().sum::<f64>() / n;
    let m2 = finite.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let m3 = finite.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;

    let std_dev = m2.sqrt();
    if std_dev < 1e-10 {
        return 0.0;
    }

    let g1 = m3 / std_dev.powi(3);
    g1 * (n * (n - 1.0)).sqrt() / (n - 2.0)
}

/// `ln(1 + x)` elementwise; every non-NaN value must be greater than -1
pub fn log1p_column(values: &[f64]) -> Result<Vec<f64>> {
    if let Some((row, &v)) = values.iter().enumerate().find(|(_, v)| **v <= -1.0) {
        return Err(PipelineError::new(
            Stage::Preprocessing,
            "log transform skewed column",
            "log1p needs values greater than -1",
        )
        .with_context("row", row)
        .with_context("value", v));
    }
    Ok(values.iter().map(|v| v.ln_1p()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skewness_matches_reference() {
        // scipy.stats.skew([1, 2, 3, 10], bias=False)
        let skew = skewness(&[1.0, 2.0, 3.0, 10.0]);
        assert!((skew - 1.7636).abs() < 1e-3, "skew = {skew}");

        assert!(skewness(&[1.0, 2.0, 3.0, 4.0]).abs() < 1e-12);
        assert!(skewness(&[10.0, 2.0, 1.0, 1.0]) > 0.0);
        assert!(skewness(&[-10.0, 2.0, 1.0, 1.0]) < 0.0);
    }

    #[test]
    fn test_degenerate_columns_have_zero_skew() {
        assert_eq!(skewness(&[]), 0.0);
        assert_eq!(skewness(&[1.0, 5.0]), 0.0);
        assert_eq!(skewness(&[3.0, 3.0, 3.0, 3.0]), 0.0);
        assert_eq!(skewness(&[f64::NAN, 1.0, f64::NAN]), 0.0);
    }

    #[test]
    fn test_log1p_column() {
        let out = log1p_column(&[0.0, 1.0, f64::NAN]).unwrap();
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 2f64.ln()).abs() < 1e-12);
        assert!(out[2].is_nan());

        let err = log1p_column(&[0.5, -1.0]).unwrap_err();
        assert_eq!(err.context_value("row"), Some("1"));
    }
}
