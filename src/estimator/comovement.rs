//! Per-asset drift/volatility of tick-to-tick price changes, plus a single
//! market-wide comovement scalar (median pairwise correlation).

use serde::{Deserialize, Serialize};

use crate::config::DiagonalPolicy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComovementStats {
    /// Mean return per asset.
    pub drift: Vec<f64>,
    /// Population standard deviation of returns per asset.
    pub stdev: Vec<f64>,
    /// Symmetric, unit-diagonal, entries in [-1, 1].
    pub correlation: Vec<Vec<f64>>,
    pub coefficient: f64,
    pub observations: usize,
}

impl ComovementStats {
    pub fn empty(assets: usize) -> Self {
        let mut correlation = vec![vec![0.0; assets]; assets];
        for (i, row) in correlation.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self {
            drift: vec![0.0; assets],
            stdev: vec![0.0; assets],
            correlation,
            coefficient: 0.0,
            observations: 0,
        }
    }
}

/// Running sums over return vectors; fed one history row at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComovementEstimator {
    assets: usize,
    diagonal: DiagonalPolicy,
    last_row: Option<Vec<f64>>,
    count: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    /// Row-major n*n cross-product sums.
    cross: Vec<f64>,
}

impl ComovementEstimator {
    pub fn new(assets: usize, diagonal: DiagonalPolicy) -> Self {
        Self {
            assets,
            diagonal,
            last_row: None,
            count: 0,
            sum: vec![0.0; assets],
            sum_sq: vec![0.0; assets],
            cross: vec![0.0; assets * assets],
        }
    }

    pub fn observations(&self) -> usize {
        self.count
    }

    /// Consumes the next price row. Rows of the wrong width are ignored.
    pub fn observe(&mut self, row: &[f64]) {
        if row.len() != self.assets {
            return;
        }
        if let Some(prev) = &self.last_row {
            let ret: Vec<f64> = row.iter().zip(prev).map(|(now, before)| now - before).collect();
            self.count += 1;
            for i in 0..self.assets {
                self.sum[i] += ret[i];
                self.sum_sq[i] += ret[i] * ret[i];
                for j in 0..self.assets {
                    self.cross[i * self.assets + j] += ret[i] * ret[j];
                }
            }
        }
        self.last_row = Some(row.to_vec());
    }

    pub fn stats(&self) -> ComovementStats {
        let n = self.assets;
        if self.count == 0 {
            return ComovementStats::empty(n);
        }
        let count = self.count as f64;

        let drift: Vec<f64> = self.sum.iter().map(|s| s / count).collect();
        let stdev: Vec<f64> = (0..n)
            .map(|i| (self.sum_sq[i] / count - drift[i] * drift[i]).max(0.0).sqrt())
            .collect();

        let mut correlation = vec![vec![0.0; n]; n];
        for i in 0..n {
            correlation[i][i] = 1.0;
            for j in (i + 1)..n {
                let cov = self.cross[i * n + j] / count - drift[i] * drift[j];
                let denom = stdev[i] * stdev[j];
                let rho = if denom > f64::EPSILON {
                    (cov / denom).clamp(-1.0, 1.0)
                } else {
                    0.0
                };
                correlation[i][j] = rho;
                correlation[j][i] = rho;
            }
        }

        let coefficient = median_correlation(&correlation, self.diagonal);
        ComovementStats {
            drift,
            stdev,
            correlation,
            coefficient,
            observations: self.count,
        }
    }
}

/// Median of the matrix entries selected by `policy`; 0 when none are.
pub fn median_correlation(matrix: &[Vec<f64>], policy: DiagonalPolicy) -> f64 {
    let mut values: Vec<f64> = Vec::with_capacity(matrix.len() * matrix.len());
    for (i, row) in matrix.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            if i == j && policy == DiagonalPolicy::Exclude {
                continue;
            }
            values.push(v);
        }
    }
    median(&mut values).unwrap_or(0.0)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
