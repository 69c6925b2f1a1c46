//! Feature quantisation for histogram-based split finding
//!
//! Each feature is mapped onto at most `max_bin` bins. Bin `b < bounds.len()`
//! holds values in `(bounds[b-1], bounds[b]]`; the last bin holds everything
//! above the last bound plus NaN, so "bin <= b" is equivalent to
//! "value <= bounds[b]" and NaN always lands right of any split.

/// Quantised, column-major view of a numeric matrix
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    bins: Vec<Vec<u16>>,
    bounds: Vec<Vec<f64>>,
    n_rows: usize,
}

impl BinnedMatrix {
    /// Quantise row-major `rows` into at most `max_bin` bins per feature
    pub fn from_rows(rows: &[Vec<f64>], max_bin: usize) -> Self {
        let n_rows = rows.len();
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        let max_bin = max_bin.clamp(2, u16::MAX as usize);

        let mut bins = Vec::with_capacity(n_features);
        let mut bounds = Vec::with_capacity(n_features);
        for feature in 0..n_features {
            let column: Vec<f64> = rows.iter().map(|r| r[feature]).collect();
            let feature_bounds = fit_bounds(&column, max_bin);
            bins.push(
                column
                    .iter()
                    .map(|&v| bin_of(&feature_bounds, v))
                    .collect(),
            );
            bounds.push(feature_bounds);
        }

        Self {
            bins,
            bounds,
            n_rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.bins.len()
    }

    /// Number of bins used by `feature`
    pub fn n_bins(&self, feature: usize) -> usize {
        self.bounds[feature].len() + 1
    }

    /// Bin indices of one feature, one per row
    pub fn column(&self, feature: usize) -> &[u16] {
        &self.bins[feature]
    }

    /// Value-space threshold equivalent to "bin <= `bin`"
    pub fn threshold(&self, feature: usize, bin: u16) -> f64 {
        self.bounds[feature]
            .get(bin as usize)
            .copied()
            .unwrap_or(f64::INFINITY)
    }
}

fn bin_of(bounds: &[f64], value: f64) -> u16 {
    if value.is_nan() {
        return bounds.len() as u16;
    }
    bounds.partition_point(|&b| b < value) as u16
}

fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi {
        lo
    } else {
        mid
    }
}

fn fit_bounds(values: &[f64], max_bin: usize) -> Vec<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    finite.sort_by(f64::total_cmp);

    let mut distinct: Vec<(f64, usize)> = Vec::new();
    for v in finite.iter().copied() {
        match distinct.last_mut() {
            Some((last, count)) if *last == v => *count += 1,
            _ => distinct.push((v, 1)),
        }
    }

    if distinct.len() <= max_bin {
        return distinct
            .windows(2)
            .map(|w| midpoint(w[0].0, w[1].0))
            .collect();
    }

    // Equal-frequency boundaries over the distinct values
    let per_bin = finite.len() as f64 / max_bin as f64;
    let mut bounds = Vec::with_capacity(max_bin - 1);
    let mut seen = 0usize;
    for i in 0..distinct.len() - 1 {
        seen += distinct[i].1;
        if seen as f64 >= per_bin * (bounds.len() + 1) as f64 {
            bounds.push(midpoint(distinct[i].0, distinct[i + 1].0));
            if bounds.len() == max_bin - 1 {
                break;
            }
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rows(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|&v| vec![v]).collect()
    }

    #[test]
    fn test_few_distinct_values_get_own_bins() {
        let m = BinnedMatrix::from_rows(&rows(&[3.0, 1.0, 2.0, 1.0]), 255);
        assert_eq!(m.n_bins(0), 3);
        assert_eq!(m.column(0), &[2, 0, 1, 0]);
        assert_eq!(m.threshold(0, 0), 1.5);
        assert_eq!(m.threshold(0, 1), 2.5);
    }

    #[test]
    fn test_bin_order_matches_threshold_order() {
        let values: Vec<f64> = (0..1000).map(|i| ((i * 37) % 1000) as f64 / 7.0).collect();
        let m = BinnedMatrix::from_rows(&rows(&values), 16);
        assert!(m.n_bins(0) <= 16);

        for (row, &v) in values.iter().enumerate() {
            let bin = m.column(0)[row];
            for b in 0..m.n_bins(0) as u16 - 1 {
                assert_eq!(bin <= b, v <= m.threshold(0, b));
            }
        }
    }

    proptest! {
        #[test]
        fn bins_agree_with_thresholds(
            values in proptest::collection::vec(-1e6f64..1e6, 1..300),
            max_bin in 2usize..64,
        ) {
            let m = BinnedMatrix::from_rows(&rows(&values), max_bin);
            prop_assert!(m.n_bins(0) <= max_bin);
            for (row, &v) in values.iter().enumerate() {
                let bin = m.column(0)[row];
                for b in 0..m.n_bins(0) as u16 - 1 {
                    prop_assert_eq!(bin <= b, v <= m.threshold(0, b));
                }
            }
        }
    }

    #[test]
    fn test_nan_goes_to_last_bin() {
        let m = BinnedMatrix::from_rows(&rows(&[1.0, f64::NAN, 2.0]), 255);
        assert_eq!(m.column(0)[1] as usize, m.n_bins(0) - 1);
    }
}
