//! Model-ready arrays: `Array2<f64>` with the encoded label as the last
//! column, persisted as NumPy `.npy` files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{concatenate, s, Array2, Axis};
use ndarray_npy::{read_npy, write_npy};

/// Build from equally sized rows
pub fn from_rows(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let cols = rows.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(rows.len() * cols);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != cols {
            anyhow::bail!("Row {} has {} values, expected {}", i, row.len(), cols);
        }
        data.extend_from_slice(row);
    }
    Ok(Array2::from_shape_vec((rows.len(), cols), data)?)
}

/// Append `labels` as a trailing column
pub fn with_label_column(features: &Array2<f64>, labels: &[f64]) -> Result<Array2<f64>> {
    if labels.len() != features.nrows() {
        anyhow::bail!(
            "Label vector has {} entries, array has {} rows",
            labels.len(),
            features.nrows()
        );
    }
    let column = Array2::from_shape_vec((labels.len(), 1), labels.to_vec())?;
    Ok(concatenate(Axis(1), &[features.view(), column.view()])?)
}

/// Split off the last column: `(features, labels)`
pub fn split_label_column(array: &Array2<f64>) -> Result<(Array2<f64>, Vec<f64>)> {
    let Some(label_col) = array.ncols().checked_sub(1) else {
        anyhow::bail!("Cannot split a label column from a zero-width array");
    };
    let features = array.slice(s![.., ..label_col]).to_owned();
    let labels = array.column(label_col).to_vec();
    Ok((features, labels))
}

/// Save an array to a `.npy` file, creating parent directories
pub async fn save_npy(path: &Path, array: &Array2<f64>) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let owned: PathBuf = path.to_path_buf();
    let array = array.clone();
    tokio::task::spawn_blocking(move || {
        write_npy(&owned, &array).with_context(|| format!("Failed to write array: {}", owned.display()))
    })
    .await
    .context("Array write task panicked")?
}

/// Load a 2-D `f64` array from a `.npy` file
pub async fn load_npy(path: &Path) -> Result<Array2<f64>> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        read_npy::<_, Array2<f64>>(&owned).with_context(|| format!("Failed to read array: {}", owned.display()))
    })
    .await
    .context("Array read task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    #[test]
    fn test_label_column_split() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let with_labels = with_label_column(&x, &[0.0, 1.0]).unwrap();

        assert_eq!(with_labels.dim(), (2, 3));
        assert_eq!(with_labels.row(1).to_vec(), vec![3.0, 4.0, 1.0]);

        let (features, labels) = split_label_column(&with_labels).unwrap();
        assert_eq!(features, x);
        assert_eq!(labels, vec![0.0, 1.0]);
    }

    #[test]
    fn test_mismatched_labels_rejected() {
        let x = array![[1.0], [2.0]];
        assert!(with_label_column(&x, &[1.0]).is_err());
        assert!(from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(split_label_column(&Array2::<f64>::zeros((3, 0))).is_err());
    }

    #[tokio::test]
    async fn test_npy_file_keeps_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/train.npy");
        let x = array![[0.5, -1.25, 0.0], [1e-9, 42.0, 1.0]];

        save_npy(&path, &x).await.unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");

        assert_eq!(load_npy(&path).await.unwrap(), x);
    }

    #[tokio::test]
    async fn test_corrupt_npy_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.npy");
        std::fs::write(&path, b"\x93NUMPY\x01\x00\xff\xff{'shape': (99999999999999999, 99999999999999999)}").unwrap();
        assert!(load_npy(&path).await.is_err());
        assert!(load_npy(&temp.path().join("missing.npy")).await.is_err());
    }
}
