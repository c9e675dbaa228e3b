//! Histogram gradient-boosted decision trees for binary classification.
//!
//! Each round fits a regression tree to the gradient of the logistic loss
//! using Newton leaf weights `-G / (H + lambda)`. Features are bucketed
//! once before training; a split keeps the raw threshold so prediction
//! never needs the bins.

use anyhow::Result;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::estimator::{Estimator, Predictor};
use crate::config::ConfigError;

const PROBABILITY_FLOOR: f64 = 1e-6;
const HESSIAN_FLOOR: f64 = 1e-16;
const MIN_GAIN: f64 = 1e-12;

/// Booster hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// L2 regularisation on leaf weights
    #[serde(default = "default_lambda")]
    pub lambda: f64,

    #[serde(default = "default_max_bins")]
    pub max_bins: usize,

    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,
}

fn default_n_estimators() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.3
}

fn default_max_depth() -> usize {
    3
}

fn default_lambda() -> f64 {
    1.0
}

fn default_max_bins() -> usize {
    64
}

fn default_min_child_weight() -> f64 {
    1.0
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            lambda: default_lambda(),
            max_bins: default_max_bins(),
            min_child_weight: default_min_child_weight(),
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, message: String| ConfigError::InvalidSetting { key, message };

        if self.n_estimators == 0 {
            return Err(invalid("boosting.n_estimators", "must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(invalid(
                "boosting.learning_rate",
                format!("{} is not in (0, 1]", self.learning_rate),
            ));
        }
        if self.max_depth == 0 {
            return Err(invalid("boosting.max_depth", "must be at least 1".into()));
        }
        if self.lambda < 0.0 {
            return Err(invalid("boosting.lambda", format!("{} is negative", self.lambda)));
        }
        if !(2..=u16::MAX as usize).contains(&self.max_bins) {
            return Err(invalid(
                "boosting.max_bins",
                format!("{} is not in [2, {}]", self.max_bins, u16::MAX),
            ));
        }
        if self.min_child_weight < 0.0 {
            return Err(invalid(
                "boosting.min_child_weight",
                format!("{} is negative", self.min_child_weight),
            ));
        }
        Ok(())
    }
}

/// The boosting estimator
#[derive(Debug, Clone, Default)]
pub struct GradientBoosting {
    params: BoostingParams,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams) -> Self {
        Self { params }
    }
}

impl Estimator for GradientBoosting {
    type Model = BoostedTrees;

    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&self, features: &Array2<f64>, labels: &[f64]) -> Result<BoostedTrees> {
        let p = &self.params;
        let n = features.nrows();

        if n == 0 {
            anyhow::bail!("Cannot fit a classifier on zero rows");
        }
        if labels.len() != n {
            anyhow::bail!("Expected {} labels, got {}", n, labels.len());
        }
        if let Some(bad) = labels.iter().find(|&&l| l != 0.0 && l != 1.0) {
            anyhow::bail!("Labels must be 0 or 1, found {}", bad);
        }

        let bins = BinnedFeatures::build(features, p.max_bins);

        let positive_rate = labels.iter().sum::<f64>() / n as f64;
        let clamped = positive_rate.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
        let base_score = (clamped / (1.0 - clamped)).ln();

        let mut raw = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(p.n_estimators);
        let all_rows: Vec<usize> = (0..n).collect();

        for round in 0..p.n_estimators {
            for i in 0..n {
                let prob = sigmoid(raw[i]);
                grad[i] = prob - labels[i];
                hess[i] = (prob * (1.0 - prob)).max(HESSIAN_FLOOR);
            }

            let mut builder = TreeBuilder {
                params: p,
                bins: &bins,
                grad: &grad,
                hess: &hess,
                nodes: Vec::new(),
            };
            builder.grow(&all_rows, 0);
            let tree = Tree {
                nodes: builder.nodes,
            };

            for (i, value) in raw.iter_mut().enumerate() {
                *value += tree.score(&features.row(i));
            }

            if round % 25 == 0 {
                debug!(round, nodes = tree.nodes.len(), "Boosting round finished");
            }
            trees.push(tree);
        }

        Ok(BoostedTrees {
            base_score,
            n_features: features.ncols(),
            trees,
        })
    }
}

/// A fitted booster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    /// Initial log-odds
    pub base_score: f64,
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl BoostedTrees {
    /// Positive-class probability for each row
    pub fn predict_proba(&self, features: &Array2<f64>) -> Result<Vec<f64>> {
        if features.ncols() != self.n_features {
            anyhow::bail!(
                "Model expects {} features, got {}",
                self.n_features,
                features.ncols()
            );
        }

        Ok(features
            .outer_iter()
            .map(|row| {
                let raw: f64 = self.base_score + self.trees.iter().map(|t| t.score(&row)).sum::<f64>();
                sigmoid(raw)
            })
            .collect())
    }
}

impl Predictor for BoostedTrees {
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<f64>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| if p >= 0.5 { 1.0 } else { 0.0 })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Node {
    Leaf {
        /// Shrunk leaf weight
        value: f64,
    },
    Split {
        feature: usize,
        /// Rows with `x <= threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn score(&self, row: &ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Column-major bin indices plus the cut points that produced them
struct BinnedFeatures {
    /// `thresholds[f][b]` separates bin `b` from bin `b + 1`
    thresholds: Vec<Vec<f64>>,
    bins: Vec<Vec<u16>>,
}

impl BinnedFeatures {
    fn build(features: &Array2<f64>, max_bins: usize) -> Self {
        let d = features.ncols();
        let mut thresholds = Vec::with_capacity(d);
        let mut bins = Vec::with_capacity(d);

        for f in 0..d {
            let raw = features.column(f);
            let mut column = raw.to_vec();
            column.sort_by(f64::total_cmp);
            let cuts = cut_points(&column, max_bins);

            let assigned = raw
                .iter()
                .map(|v| cuts.partition_point(|t| t < v) as u16)
                .collect();

            thresholds.push(cuts);
            bins.push(assigned);
        }

        Self { thresholds, bins }
    }
}

/// Midpoints between distinct values, or quantile cuts when there are too many
fn cut_points(sorted: &[f64], max_bins: usize) -> Vec<f64> {
    let mut uniques: Vec<f64> = sorted.to_vec();
    uniques.dedup();

    if uniques.len() <= max_bins {
        return uniques.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    let n = sorted.len();
    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|q| sorted[(q * n / max_bins).min(n - 1)])
        .collect();
    cuts.dedup();
    // The maximum as a cut would leave an empty right side
    if cuts.last() == uniques.last() {
        cuts.pop();
    }
    cuts
}

struct TreeBuilder<'a> {
    params: &'a BoostingParams,
    bins: &'a BinnedFeatures,
    grad: &'a [f64],
    hess: &'a [f64],
    nodes: Vec<Node>,
}

struct BestSplit {
    gain: f64,
    feature: usize,
    bin: usize,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `rows`, returning its node index
    fn grow(&mut self, rows: &[usize], depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();

        let split = if depth < self.params.max_depth && rows.len() >= 2 {
            self.best_split(rows, g, h)
        } else {
            None
        };

        let Some(split) = split else {
            let value = -g / (h + self.params.lambda) * self.params.learning_rate;
            self.nodes.push(Node::Leaf { value });
            return self.nodes.len() - 1;
        };

        let feature_bins = &self.bins.bins[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| (feature_bins[i] as usize) <= split.bin);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });
        let left = self.grow(&left_rows, depth + 1);
        let right = self.grow(&right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: self.bins.thresholds[split.feature][split.bin],
            left,
            right,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let lambda = self.params.lambda;
        let mcw = self.params.min_child_weight;
        let parent = g * g / (h + lambda);
        let mut best: Option<BestSplit> = None;

        for (feature, cuts) in self.bins.thresholds.iter().enumerate() {
            if cuts.is_empty() {
                continue;
            }

            let n_bins = cuts.len() + 1;
            let mut hist_g = vec![0.0; n_bins];
            let mut hist_h = vec![0.0; n_bins];
            for &i in rows {
                let b = self.bins.bins[feature][i] as usize;
                hist_g[b] += self.grad[i];
                hist_h[b] += self.hess[i];
            }

            let (mut gl, mut hl) = (0.0, 0.0);
            for bin in 0..cuts.len() {
                gl += hist_g[bin];
                hl += hist_h[bin];
                let (gr, hr) = (g - gl, h - hl);
                if hl < mcw || hr < mcw {
                    continue;
                }

                let gain = gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { gain, feature, bin });
                }
            }
        }

        best
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
