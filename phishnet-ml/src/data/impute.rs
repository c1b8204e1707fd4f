//! Missing-value imputation fitted on the training split.

use crate::error::PipelineError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How missing feature values are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ImputerStrategy {
    /// Mean of the `n_neighbors` nearest training rows (nan-euclidean distance,
    /// uniform weights).
    Knn {
        #[serde(default = "default_n_neighbors")]
        n_neighbors: usize,
    },
    /// Column mean of the training split.
    Mean,
    /// A fixed value.
    Constant { value: f64 },
}

impl Default for ImputerStrategy {
    fn default() -> Self {
        Self::Knn {
            n_neighbors: default_n_neighbors(),
        }
    }
}

fn default_n_neighbors() -> usize {
    3
}

/// An imputer with its learned state. Frozen after [`FittedImputer::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FittedImputer {
    Knn {
        n_neighbors: usize,
        /// Training rows the neighbours are drawn from.
        reference: Vec<Vec<Option<f64>>>,
        /// Fallback when no reference row shares an observed coordinate.
        means: Vec<f64>,
    },
    Mean {
        means: Vec<f64>,
    },
    Constant {
        value: f64,
        width: usize,
    },
}

impl FittedImputer {
    /// Learn imputation state from training rows.
    ///
    /// `columns` names the row positions, for error messages only.
    pub fn fit(
        strategy: &ImputerStrategy,
        columns: &[String],
        rows: &[Vec<Option<f64>>],
    ) -> Result<Self, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::transform("cannot fit imputer on zero rows"));
        }
        let width = columns.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(PipelineError::transform(format!(
                "row {i} has {} values, expected {width}",
                row.len()
            )));
        }
        let means = column_means(columns, rows)?;

        Ok(match strategy {
            ImputerStrategy::Knn { n_neighbors } => {
                if *n_neighbors == 0 {
                    return Err(PipelineError::transform("n_neighbors must be at least 1"));
                }
                Self::Knn {
                    n_neighbors: *n_neighbors,
                    reference: rows.to_vec(),
                    means,
                }
            }
            ImputerStrategy::Mean => Self::Mean { means },
            ImputerStrategy::Constant { value } => Self::Constant {
                value: *value,
                width,
            },
        })
    }

    /// Number of features the imputer was fitted on.
    pub fn width(&self) -> usize {
        match self {
            Self::Knn { means, .. } | Self::Mean { means } => means.len(),
            Self::Constant { width, .. } => *width,
        }
    }

    /// Fill the gaps of one row. Observed values are returned unchanged.
    pub fn transform_row(&self, row: &[Option<f64>]) -> Result<Vec<f64>, PipelineError> {
        if row.len() != self.width() {
            return Err(PipelineError::transform(format!(
                "row has {} values, imputer was fitted on {}",
                row.len(),
                self.width()
            )));
        }
        if let Some(full) = row.iter().copied().collect::<Option<Vec<f64>>>() {
            return Ok(full);
        }

        Ok(match self {
            Self::Mean { means } => row
                .iter()
                .zip(means)
                .map(|(v, mean)| v.unwrap_or(*mean))
                .collect(),
            Self::Constant { value, .. } => row.iter().map(|v| v.unwrap_or(*value)).collect(),
            Self::Knn {
                n_neighbors,
                reference,
                means,
            } => knn_fill(row, reference, means, *n_neighbors),
        })
    }

    /// Impute every row into a dense matrix.
    pub fn transform(&self, rows: &[Vec<Option<f64>>]) -> Result<Array2<f64>, PipelineError> {
        let width = self.width();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            flat.extend(self.transform_row(row)?);
        }
        Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| PipelineError::transform(format!("matrix shape: {e}")))
    }
}

fn column_means(columns: &[String], rows: &[Vec<Option<f64>>]) -> Result<Vec<f64>, PipelineError> {
    columns
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let (sum, count) = rows
                .iter()
                .filter_map(|r| r[j])
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                Err(PipelineError::transform(format!(
                    "column `{name}` has no observed values"
                )))
            } else {
                Ok(sum / count as f64)
            }
        })
        .collect()
}

/// Euclidean distance over coordinates observed in both rows, scaled up by
/// `total / present`. `None` when the rows share no observed coordinate.
fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut present = 0usize;
    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (x, y) {
            sum += (x - y) * (x - y);
            present += 1;
        }
    }
    (present > 0).then(|| (sum * a.len() as f64 / present as f64).sqrt())
}

fn knn_fill(
    row: &[Option<f64>],
    reference: &[Vec<Option<f64>>],
    means: &[f64],
    k: usize,
) -> Vec<f64> {
    let distances: Vec<Option<f64>> = reference.iter().map(|r| nan_euclidean(row, r)).collect();

    row.iter()
        .enumerate()
        .map(|(j, value)| {
            if let Some(v) = value {
                return *v;
            }
            // Donors must have column j observed; ties resolve by row order.
            let mut donors: Vec<(f64, f64)> = reference
                .iter()
                .zip(&distances)
                .filter_map(|(r, d)| Some((d.as_ref().copied()?, r[j]?)))
                .collect();
            if donors.is_empty() {
                return means[j];
            }
            donors.sort_by(|a, b| a.0.total_cmp(&b.0));
            let take = donors.len().min(k);
            donors[..take].iter().map(|(_, v)| v).sum::<f64>() / take as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn train_rows() -> Vec<Vec<Option<f64>>> {
        vec![
            vec![Some(1.0), Some(1.0)],
            vec![Some(1.0), Some(1.0)],
            vec![Some(1.0), Some(-1.0)],
            vec![Some(-1.0), Some(-1.0)],
            vec![Some(-1.0), None],
        ]
    }

    #[test]
    fn test_observed_rows_are_unchanged() {
        for strategy in [
            ImputerStrategy::default(),
            ImputerStrategy::Mean,
            ImputerStrategy::Constant { value: 0.0 },
        ] {
            let imputer = FittedImputer::fit(&strategy, &cols(2), &train_rows()).unwrap();
            assert_eq!(
                imputer.transform_row(&[Some(-1.0), Some(0.5)]).unwrap(),
                vec![-1.0, 0.5]
            );
        }
    }

    #[test]
    fn test_knn_uses_nearest_donors() {
        let imputer =
            FittedImputer::fit(&ImputerStrategy::default(), &cols(2), &train_rows()).unwrap();
        // Nearest rows on f0 = 1.0 are the first three; their f1 mean is 1/3.
        let filled = imputer.transform_row(&[Some(1.0), None]).unwrap();
        assert!((filled[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_knn_falls_back_to_mean_without_shared_coordinates() {
        let imputer =
            FittedImputer::fit(&ImputerStrategy::default(), &cols(2), &train_rows()).unwrap();
        let filled = imputer.transform_row(&[None, None]).unwrap();
        assert!((filled[0] - 0.2).abs() < 1e-12);
        assert!((filled[1] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_and_constant() {
        let mean = FittedImputer::fit(&ImputerStrategy::Mean, &cols(2), &train_rows()).unwrap();
        assert_eq!(mean.transform_row(&[None, Some(1.0)]).unwrap(), vec![0.2, 1.0]);

        let constant = FittedImputer::fit(
            &ImputerStrategy::Constant { value: -1.0 },
            &cols(2),
            &train_rows(),
        )
        .unwrap();
        assert_eq!(constant.transform_row(&[None, None]).unwrap(), vec![-1.0, -1.0]);
    }

    #[test]
    fn test_all_null_column_cannot_fit() {
        let rows = vec![vec![Some(1.0), None], vec![Some(2.0), None]];
        let err = FittedImputer::fit(&ImputerStrategy::default(), &cols(2), &rows).unwrap_err();
        assert!(matches!(err, PipelineError::TransformFit(msg) if msg.contains("f1")));
    }

    #[test]
    fn test_transform_builds_dense_matrix() {
        let imputer = FittedImputer::fit(&ImputerStrategy::Mean, &cols(2), &train_rows()).unwrap();
        let matrix = imputer.transform(&train_rows()).unwrap();
        assert_eq!(matrix.dim(), (5, 2));
        assert_eq!(matrix[[4, 1]], 0.0);
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let imputer = FittedImputer::fit(&ImputerStrategy::Mean, &cols(2), &train_rows()).unwrap();
        assert!(imputer.transform_row(&[Some(1.0)]).is_err());
    }
}
