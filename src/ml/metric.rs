//! Binary classification scores (positive label `1`).

use anyhow::Result;

use crate::domain::ClassificationMetric;

/// Precision, recall and f1 of `y_pred` against `y_true`.
///
/// A ratio with a zero denominator scores 0.
pub fn classification_score(y_true: &[f64], y_pred: &[f64]) -> Result<ClassificationMetric> {
    if y_true.len() != y_pred.len() {
        anyhow::bail!(
            "Label vectors differ in length: {} true vs {} predicted",
            y_true.len(),
            y_pred.len()
        );
    }

    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (t, p) in y_true.iter().zip(y_pred) {
        let actual = *t == 1.0;
        let predicted = *p == 1.0;
        match (actual, predicted) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = ratio(2 * tp, 2 * tp + fp + fn_);

    Ok(ClassificationMetric {
        f1_score: f1,
        precision_score: precision,
        recall_score: recall,
    })
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
