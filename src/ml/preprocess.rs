//! Feature preprocessing: constant imputation followed by robust scaling.
//!
//! Missing cells are filled with a constant, then each column is centred on
//! its median and divided by its interquartile range. Both statistics are
//! taken after imputation, so the fill value participates in them.

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::domain::{DataFrame, Value};

/// A fitted imputer + robust scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Column names in output order
    pub feature_names: Vec<String>,
    pub fill_value: f64,
    /// Per-column medians
    pub centers: Vec<f64>,
    /// Per-column IQRs (1.0 where the IQR is zero)
    pub scales: Vec<f64>,
}

impl Preprocessor {
    /// Fit on every column of `features`
    pub fn fit(features: &DataFrame, fill_value: f64) -> Result<Self> {
        if features.is_empty() {
            anyhow::bail!("Cannot fit a preprocessor on an empty frame");
        }

        let mut centers = Vec::with_capacity(features.n_cols());
        let mut scales = Vec::with_capacity(features.n_cols());

        for name in features.columns() {
            let cells = features
                .column(name)
                .with_context(|| format!("Column '{}' vanished during fit", name))?;
            let mut values = cells
                .iter()
                .map(|cell| impute(cell, fill_value, name))
                .collect::<Result<Vec<f64>>>()?;
            values.sort_by(f64::total_cmp);

            let median = percentile(&values, 50.0);
            let iqr = percentile(&values, 75.0) - percentile(&values, 25.0);

            centers.push(median);
            scales.push(if iqr == 0.0 { 1.0 } else { iqr });
        }

        Ok(Self {
            feature_names: features.columns().to_vec(),
            fill_value,
            centers,
            scales,
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Impute and scale `features`, selecting columns by name.
    ///
    /// Extra columns are ignored; a missing fitted column is an error.
    pub fn transform(&self, features: &DataFrame) -> Result<Array2<f64>> {
        let indices = self
            .feature_names
            .iter()
            .map(|name| {
                features
                    .column_index(name)
                    .with_context(|| format!("Input is missing feature column '{}'", name))
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut data = Vec::with_capacity(features.n_rows() * indices.len());
        for row in features.rows() {
            for (j, &idx) in indices.iter().enumerate() {
                let raw = impute(&row[idx], self.fill_value, &self.feature_names[j])?;
                data.push((raw - self.centers[j]) / self.scales[j]);
            }
        }

        Ok(Array2::from_shape_vec((features.n_rows(), indices.len()), data)?)
    }
}

fn impute(cell: &Value, fill_value: f64, column: &str) -> Result<f64> {
    match cell {
        Value::Null => Ok(fill_value),
        Value::Number(n) => Ok(*n),
        Value::Text(s) => anyhow::bail!("Column '{}' has non-numeric value '{}'", column, s),
    }
}

/// Linear-interpolated percentile of sorted, non-empty values
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = (q / 100.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rows: Vec<Vec<Value>>) -> DataFrame {
        DataFrame::from_rows(vec!["a".into(), "b".into()], rows).unwrap()
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 50.0), 2.5);
        assert_eq!(percentile(&v, 25.0), 1.75);
        assert_eq!(percentile(&v, 75.0), 3.25);
    }

    #[test]
    fn test_fit_statistics() {
        let df = frame(vec![
            vec![Value::Number(1.0), Value::Number(5.0)],
            vec![Value::Number(2.0), Value::Number(5.0)],
            vec![Value::Number(3.0), Value::Null],
            vec![Value::Number(4.0), Value::Number(5.0)],
        ]);
        let p = Preprocessor::fit(&df, 0.0).unwrap();

        assert_eq!(p.centers[0], 2.5);
        assert_eq!(p.scales[0], 1.5);
        // b = [0, 5, 5, 5] after imputation
        assert_eq!(p.centers[1], 5.0);
        assert_eq!(p.scales[1], 1.25);
    }

    #[test]
    fn test_transform_has_no_missing_values() {
        let df = frame(vec![
            vec![Value::Number(1.0), Value::Null],
            vec![Value::Null, Value::Number(2.0)],
            vec![Value::Number(3.0), Value::Number(3.0)],
        ]);
        let p = Preprocessor::fit(&df, 0.0).unwrap();
        let m = p.transform(&df).unwrap();

        assert_eq!(m.dim(), (3, 2));
        assert!(m.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_column_keeps_unit_scale() {
        let df = frame(vec![
            vec![Value::Number(7.0), Value::Number(1.0)],
            vec![Value::Number(7.0), Value::Number(2.0)],
        ]);
        let p = Preprocessor::fit(&df, 0.0).unwrap();
        assert_eq!(p.scales[0], 1.0);
        assert_eq!(p.transform(&df).unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn test_transform_selects_by_name() {
        let df = frame(vec![
            vec![Value::Number(1.0), Value::Number(10.0)],
            vec![Value::Number(3.0), Value::Number(30.0)],
        ]);
        let p = Preprocessor::fit(&df, 0.0).unwrap();

        let reordered = DataFrame::from_rows(
            vec!["b".into(), "extra".into(), "a".into()],
            vec![vec![Value::Number(10.0), Value::Text("x".into()), Value::Number(1.0)]],
        )
        .unwrap();
        let m = p.transform(&reordered).unwrap();
        let expected = p.transform(&df).unwrap();
        assert_eq!(m.row(0), expected.row(0));

        let missing = DataFrame::from_rows(vec!["a".into()], vec![vec![Value::Number(1.0)]]).unwrap();
        assert!(p.transform(&missing).is_err());
    }

    #[test]
    fn test_text_is_rejected() {
        let df = frame(vec![vec![Value::Text("oops".into()), Value::Number(1.0)]]);
        assert!(Preprocessor::fit(&df, 0.0).is_err());
    }
}
