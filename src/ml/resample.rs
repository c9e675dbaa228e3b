//! Class rebalancing: SMOTE oversampling and Tomek-link cleaning.

use std::collections::BTreeMap;

use anyhow::Result;
use ndarray::{concatenate, s, Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SMOTE_NEIGHBOURS: usize = 5;

/// Rows per distance block in the nearest-neighbour search
const NEIGHBOUR_BLOCK: usize = 256;

/// Which rebalancing technique to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerKind {
    /// SMOTE followed by Tomek-link removal
    #[default]
    SmoteTomek,
    Smote,
    None,
}

pub struct Resampler {
    kind: ResamplerKind,
    rng: StdRng,
}

impl Resampler {
    /// Create a resampler; without a seed the generator is seeded from entropy
    pub fn new(kind: ResamplerKind, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { kind, rng }
    }

    /// Rebalance `(features, labels)`
    pub fn fit_resample(&mut self, features: &Array2<f64>, labels: &[f64]) -> Result<(Array2<f64>, Vec<f64>)> {
        if features.nrows() != labels.len() {
            anyhow::bail!(
                "Resampling needs one label per row: {} rows, {} labels",
                features.nrows(),
                labels.len()
            );
        }

        match self.kind {
            ResamplerKind::None => Ok((features.clone(), labels.to_vec())),
            ResamplerKind::Smote => self.smote(features, labels),
            ResamplerKind::SmoteTomek => {
                let (x, y) = self.smote(features, labels)?;
                Ok(tomek_links(&x, &y))
            }
        }
    }

    /// Oversample every non-majority class up to the majority count
    fn smote(&mut self, features: &Array2<f64>, labels: &[f64]) -> Result<(Array2<f64>, Vec<f64>)> {
        let classes = group_by_class(labels);
        let mut y = labels.to_vec();

        if classes.len() < 2 {
            debug!("Single class present, skipping SMOTE");
            return Ok((features.clone(), y));
        }

        let majority = classes.values().map(Vec::len).max().unwrap_or(0);
        let mut synthetic = Vec::new();
        let mut added_rows = 0;

        for (label, members) in &classes {
            let needed = majority - members.len();
            if needed == 0 || members.len() < 2 {
                continue;
            }

            let k = SMOTE_NEIGHBOURS.min(members.len() - 1);
            let neighbours: Vec<Vec<usize>> = members
                .iter()
                .map(|&i| nearest_within(features, i, members, k))
                .collect();

            for _ in 0..needed {
                let pick = self.rng.gen_range(0..members.len());
                let partner = neighbours[pick][self.rng.gen_range(0..k)];
                let gap: f64 = self.rng.gen();

                let base = features.row(members[pick]);
                let other = features.row(partner);
                synthetic.extend(base.iter().zip(other.iter()).map(|(a, b)| a + gap * (b - a)));
                y.push(*label as f64);
            }
            added_rows += needed;

            debug!(label = *label, added = needed, "SMOTE oversampled class");
        }

        let added = Array2::from_shape_vec((added_rows, features.ncols()), synthetic)?;
        let x = concatenate(Axis(0), &[features.view(), added.view()])?;
        Ok((x, y))
    }
}

/// Drop both members of every Tomek link
///
/// A Tomek link is a pair of rows with different labels that are each
/// other's nearest neighbour.
pub fn tomek_links(features: &Array2<f64>, labels: &[f64]) -> (Array2<f64>, Vec<f64>) {
    let n = features.nrows();
    if n < 2 {
        return (features.clone(), labels.to_vec());
    }

    let nearest = nearest_neighbours(features, NEIGHBOUR_BLOCK);
    let keep: Vec<usize> = (0..n)
        .filter(|&i| {
            let linked = nearest[i].is_some_and(|j| nearest[j] == Some(i) && labels[i] != labels[j]);
            !linked
        })
        .collect();

    debug!(removed = n - keep.len(), "Tomek links cleaned");

    let y = keep.iter().map(|&i| labels[i]).collect();
    (features.select(Axis(0), &keep), y)
}

/// Each row's nearest other row by squared Euclidean distance.
///
/// Distances are computed a block of rows at a time as
/// `|a|^2 + |b|^2 - 2 a.b`, so the inner work is one matrix product per block.
fn nearest_neighbours(features: &Array2<f64>, block: usize) -> Vec<Option<usize>> {
    let n = features.nrows();
    let norms: Array1<f64> = features.map_axis(Axis(1), |row| row.dot(&row));
    let mut nearest = Vec::with_capacity(n);

    for start in (0..n).step_by(block.max(1)) {
        let end = (start + block.max(1)).min(n);
        let cross = features.slice(s![start..end, ..]).dot(&features.t());

        for (offset, dots) in cross.outer_iter().enumerate() {
            let i = start + offset;
            let mut best = None;
            let mut best_dist = f64::INFINITY;
            for (j, dot) in dots.iter().enumerate() {
                if j == i {
                    continue;
                }
                let d = norms[i] + norms[j] - 2.0 * dot;
                if d < best_dist {
                    best_dist = d;
                    best = Some(j);
                }
            }
            nearest.push(best);
        }
    }

    nearest
}

fn group_by_class(labels: &[f64]) -> BTreeMap<i64, Vec<usize>> {
    let mut classes: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        classes.entry(label.round() as i64).or_default().push(i);
    }
    classes
}

/// The `k` nearest rows to `target` among `candidates`, excluding itself
fn nearest_within(features: &Array2<f64>, target: usize, candidates: &[usize], k: usize) -> Vec<usize> {
    let row = features.row(target);
    let mut dists: Vec<(f64, usize)> = candidates
        .iter()
        .filter(|&&c| c != target)
        .map(|&c| (squared_distance(&row, &features.row(c)), c))
        .collect();
    dists.sort_by(|a, b| a.0.total_cmp(&b.0));
    dists.into_iter().take(k).map(|(_, c)| c).collect()
}

fn squared_distance(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
