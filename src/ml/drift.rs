//! Two-sample Kolmogorov-Smirnov drift test.
//!
//! The statistic is the largest gap between the empirical CDFs of the two
//! samples. The p-value uses the asymptotic Kolmogorov distribution with the
//! Stephens small-sample correction, so it is defined for any sample sizes.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DataFrame, Value};

const EPS1: f64 = 0.001;
const EPS2: f64 = 1.0e-8;
const MAX_TERMS: u32 = 100;

/// Result of a two-sample test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Per-column entry in the drift report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    pub drift_status: bool,
}

/// Drift report persisted as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// True when no column drifted
    pub status: bool,
    pub threshold: f64,
    pub columns: BTreeMap<String, ColumnDrift>,
}

impl DriftReport {
    pub fn drifted_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, c)| c.drift_status)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Compare every column present in both frames.
///
/// A column drifts when its p-value falls below `threshold`.
pub fn detect_drift(base: &DataFrame, current: &DataFrame, threshold: f64) -> DriftReport {
    let mut columns = BTreeMap::new();

    for name in base.columns() {
        let (Some(a), Some(b)) = (base.column(name), current.column(name)) else {
            continue;
        };
        let result = ks_2samp(&a, &b);
        columns.insert(
            name.clone(),
            ColumnDrift {
                p_value: result.p_value,
                drift_status: result.p_value < threshold,
            },
        );
    }

    let status = columns.values().all(|c| !c.drift_status);
    DriftReport {
        status,
        threshold,
        columns,
    }
}

/// Two-sample KS test over cells; nulls are ignored.
///
/// A side with no non-null values yields `p_value = 1.0`.
pub fn ks_2samp(a: &[&Value], b: &[&Value]) -> KsResult {
    let mut xs: Vec<&Value> = a.iter().copied().filter(|v| !v.is_null()).collect();
    let mut ys: Vec<&Value> = b.iter().copied().filter(|v| !v.is_null()).collect();

    if xs.is_empty() || ys.is_empty() {
        return KsResult {
            statistic: 0.0,
            p_value: 1.0,
        };
    }

    xs.sort_by(|x, y| x.total_cmp(y));
    ys.sort_by(|x, y| x.total_cmp(y));

    let statistic = ks_statistic(&xs, &ys, |x, y| x.total_cmp(y));
    KsResult {
        statistic,
        p_value: p_value(statistic, xs.len(), ys.len()),
    }
}

/// Largest CDF gap between two sorted samples, stepping past ties together
fn ks_statistic<T, F>(xs: &[T], ys: &[T], cmp: F) -> f64
where
    F: Fn(&T, &T) -> Ordering,
{
    let (n, m) = (xs.len() as f64, ys.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;

    while i < xs.len() && j < ys.len() {
        let pivot = match cmp(&xs[i], &ys[j]) {
            Ordering::Greater => &ys[j],
            _ => &xs[i],
        };
        while i < xs.len() && cmp(&xs[i], pivot) == Ordering::Equal {
            i += 1;
        }
        while j < ys.len() && cmp(&ys[j], pivot) == Ordering::Equal {
            j += 1;
        }
        d = d.max((i as f64 / n - j as f64 / m).abs());
    }

    d
}

fn p_value(statistic: f64, n: usize, m: usize) -> f64 {
    if statistic <= 0.0 {
        return 1.0;
    }
    let en = (n * m) as f64 / (n + m) as f64;
    let sqrt_en = en.sqrt();
    let lambda = (sqrt_en + 0.12 + 0.11 / sqrt_en) * statistic;
    kolmogorov_sf(lambda).clamp(0.0, 1.0)
}

/// Survival function of the Kolmogorov distribution
fn kolmogorov_sf(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;

    for j in 1..=MAX_TERMS {
        let jf = f64::from(j);
        let term = fac * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= EPS1 * previous || term.abs() <= EPS2 * sum {
            return sum;
        }
        fac = -fac;
        previous = term.abs();
    }

    // Series did not converge: lambda is tiny and the samples agree
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> Vec<Value> {
        values.iter().map(|v| Value::Number(*v)).collect()
    }

    fn refs(values: &[Value]) -> Vec<&Value> {
        values.iter().collect()
    }

    #[test]
    fn test_self_comparison_has_no_drift() {
        let a = numbers(&[1.0, 2.0, 2.0, 3.0, 7.5, 9.0]);
        let result = ks_2samp(&refs(&a), &refs(&a));
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_disjoint_samples_drift() {
        let a = numbers(&(0..50).map(f64::from).collect::<Vec<_>>());
        let b = numbers(&(100..150).map(f64::from).collect::<Vec<_>>());
        let result = ks_2samp(&refs(&a), &refs(&b));
        assert!((result.statistic - 1.0).abs() < 1e-12);
        assert!(result.p_value < 1e-6);
    }

    #[test]
    fn test_ties_are_stepped_together() {
        let a = numbers(&[1.0, 1.0, 2.0]);
        let b = numbers(&[1.0, 2.0, 2.0]);
        let result = ks_2samp(&refs(&a), &refs(&b));
        // CDFs at 1.0: 2/3 vs 1/3
        assert!((result.statistic - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_nulls_are_ignored() {
        let a = vec![Value::Null, Value::Number(1.0), Value::Number(2.0)];
        let b = vec![Value::Number(1.0), Value::Number(2.0), Value::Null, Value::Null];
        assert_eq!(ks_2samp(&refs(&a), &refs(&b)).p_value, 1.0);

        let empty = vec![Value::Null];
        assert_eq!(ks_2samp(&refs(&a), &refs(&empty)).p_value, 1.0);
    }

    #[test]
    fn test_text_columns_compare_lexicographically() {
        let a = vec![Value::Text("neg".into()), Value::Text("pos".into())];
        let result = ks_2samp(&refs(&a), &refs(&a));
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_detect_drift_report() {
        let cols = vec!["stable".to_string(), "shifted".to_string()];
        let mut base = DataFrame::new(cols.clone());
        let mut current = DataFrame::new(cols);
        for i in 0..40 {
            let x = f64::from(i);
            base.push_row(vec![Value::Number(x), Value::Number(x)]).unwrap();
            current
                .push_row(vec![Value::Number(x), Value::Number(x + 1000.0)])
                .unwrap();
        }

        let report = detect_drift(&base, &current, 0.5);
        assert!(!report.status);
        assert!(!report.columns["stable"].drift_status);
        assert!(report.columns["shifted"].drift_status);
        assert_eq!(report.drifted_columns(), vec!["shifted".to_string()]);

        let same = detect_drift(&base, &base, 0.5);
        assert!(same.status);
        assert!(same.columns.values().all(|c| c.p_value == 1.0));
    }
}
