//! # Bundled Random Forest
//!
//! A compact bootstrap ensemble of variance-reduction regression trees, used
//! as the default driving model when the caller does not supply one. Binary
//! classification targets work unchanged as regression on the 0/1 indicator.
//!
//! The forest exposes both optional model capabilities:
//!
//! - impurity importances: mean weighted variance reduction per feature
//!   across all trees, normalized to sum to one;
//! - attributions: per-row path contributions, where each split credits its
//!   feature with the change in node mean along the row's decision path.
//!
//! Tree fitting is rayon-parallel but fully deterministic: each tree derives
//! its own RNG stream from the configured seed and its position in the
//! ensemble, so the fitted forest is independent of scheduling order.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::model::{Attributions, Model, ModelError, ModelFamily};

/// A node of a fitted regression tree.
///
/// Split nodes carry the mean label of the samples that reached them, which
/// is what the path-contribution attribution walks against.
#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        value: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Adds this tree's path contributions for `row` into `out`.
    fn attribute_row(&self, row: &[f64], out: &mut [f64]) {
        let mut node = &self.root;
        let mut current = match &self.root {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split { value, .. } => *value,
        };
        loop {
            match node {
                TreeNode::Leaf { .. } => return,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let child: &TreeNode = if row[*feature] <= *threshold { left } else { right };
                    let child_value = match child {
                        TreeNode::Leaf { value } => *value,
                        TreeNode::Split { value, .. } => *value,
                    };
                    out[*feature] += child_value - current;
                    current = child_value;
                    node = child;
                }
            }
        }
    }
}

/// Bootstrap ensemble of regression trees implementing [`Model`].
#[derive(Debug, Clone)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    min_samples_split: usize,
    max_features: Option<usize>,
    seed: u64,
    trees: Vec<RegressionTree>,
    importances: Option<Array1<f64>>,
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomForest {
    pub fn new() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 4,
            max_features: None,
            seed: 0,
            trees: Vec::new(),
            importances: None,
            n_features: 0,
        }
    }

    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees.max(1);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split.max(2);
        self
    }

    /// Number of candidate features examined per split. Defaults to
    /// `ceil(sqrt(n_features))` when unset.
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn features_per_split(&self, n_features: usize) -> usize {
        self.max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .min(n_features)
            .max(1)
    }
}

impl Model for RandomForest {
    fn family(&self) -> ModelFamily {
        ModelFamily::TreeEnsemble
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(ModelError::EmptyTrainingSet {
                rows: n_rows,
                columns: n_features,
            });
        }
        let params = SplitParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            features_per_split: self.features_per_split(n_features),
        };
        let seed = self.seed;
        let fitted: Vec<(RegressionTree, Array1<f64>)> = (0..self.n_trees)
            .into_par_iter()
            .map(|tree_index| {
                let mut rng = StdRng::seed_from_u64(
                    seed.wrapping_add((tree_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                );
                let sample: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
                let mut importance = Array1::zeros(n_features);
                let root = build_node(x, y, &sample, 0, &params, &mut rng, &mut importance);
                (RegressionTree { root }, importance)
            })
            .collect();

        let mut total = Array1::zeros(n_features);
        self.trees = Vec::with_capacity(self.n_trees);
        for (tree, importance) in fitted {
            total += &importance;
            self.trees.push(tree);
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        self.importances = Some(total);
        self.n_features = n_features;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        if self.trees.is_empty() {
            return Array1::zeros(x.nrows());
        }
        let mut out = Array1::zeros(x.nrows());
        let mut row_buf = vec![0.0; x.ncols()];
        for (r, mut_slot) in out.iter_mut().enumerate() {
            for (c, v) in row_buf.iter_mut().enumerate() {
                *v = x[[r, c]];
            }
            let sum: f64 = self.trees.iter().map(|t| t.predict_row(&row_buf)).sum();
            *mut_slot = sum / self.trees.len() as f64;
        }
        out
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importances.clone()
    }

    fn attributions(&self, x: &Array2<f64>) -> Option<Attributions> {
        if self.trees.is_empty() || x.ncols() != self.n_features {
            return None;
        }
        let mut table = Array2::zeros((x.nrows(), self.n_features));
        let mut row_buf = vec![0.0; x.ncols()];
        let mut contrib = vec![0.0; self.n_features];
        for r in 0..x.nrows() {
            for (c, v) in row_buf.iter_mut().enumerate() {
                *v = x[[r, c]];
            }
            contrib.iter_mut().for_each(|v| *v = 0.0);
            for tree in &self.trees {
                tree.attribute_row(&row_buf, &mut contrib);
            }
            let scale = 1.0 / self.trees.len() as f64;
            for (c, v) in contrib.iter().enumerate() {
                table[[r, c]] = v * scale;
            }
        }
        Some(Attributions::Single(table))
    }
}

struct SplitParams {
    max_depth: usize,
    min_samples_split: usize,
    features_per_split: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    reduction: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

fn mean_of(y: &Array1<f64>, rows: &[usize]) -> f64 {
    rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
}

fn variance_of(y: &Array1<f64>, rows: &[usize]) -> f64 {
    let mean = mean_of(y, rows);
    rows.iter().map(|&r| (y[r] - mean) * (y[r] - mean)).sum::<f64>() / rows.len() as f64
}

fn build_node(
    x: &Array2<f64>,
    y: &Array1<f64>,
    rows: &[usize],
    depth: usize,
    params: &SplitParams,
    rng: &mut StdRng,
    importance: &mut Array1<f64>,
) -> TreeNode {
    let value = mean_of(y, rows);
    if depth >= params.max_depth || rows.len() < params.min_samples_split {
        return TreeNode::Leaf { value };
    }
    let parent_variance = variance_of(y, rows);
    if parent_variance <= 0.0 {
        return TreeNode::Leaf { value };
    }

    let mut candidates: Vec<usize> = (0..x.ncols()).collect();
    candidates.shuffle(rng);
    candidates.truncate(params.features_per_split);

    let best = candidates
        .iter()
        .filter_map(|&feature| best_split_on(x, y, rows, feature, parent_variance))
        .max_by(|a, b| a.reduction.partial_cmp(&b.reduction).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some(split) if split.reduction > 0.0 => {
            // Importance is the impurity decrease weighted by node size.
            importance[split.feature] += split.reduction * rows.len() as f64;
            let left = build_node(x, y, &split.left, depth + 1, params, rng, importance);
            let right = build_node(x, y, &split.right, depth + 1, params, rng, importance);
            TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                value,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        _ => TreeNode::Leaf { value },
    }
}

/// Best variance-reduction split of `rows` on a single feature, if any
/// threshold separates two non-empty sides.
fn best_split_on(
    x: &Array2<f64>,
    y: &Array1<f64>,
    rows: &[usize],
    feature: usize,
    parent_variance: f64,
) -> Option<BestSplit> {
    let mut ordered: Vec<(f64, f64)> = rows.iter().map(|&r| (x[[r, feature]], y[r])).collect();
    ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let n = ordered.len() as f64;
    let total_sum: f64 = ordered.iter().map(|(_, t)| t).sum();
    let total_sq: f64 = ordered.iter().map(|(_, t)| t * t).sum();

    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<(usize, f64, f64)> = None;
    for i in 0..ordered.len() - 1 {
        left_sum += ordered[i].1;
        left_sq += ordered[i].1 * ordered[i].1;
        if ordered[i].0 >= ordered[i + 1].0 {
            continue; // no threshold separates equal values
        }
        let nl = (i + 1) as f64;
        let nr = n - nl;
        let var_l = left_sq / nl - (left_sum / nl) * (left_sum / nl);
        let right_sum = total_sum - left_sum;
        let var_r = (total_sq - left_sq) / nr - (right_sum / nr) * (right_sum / nr);
        let weighted = (nl * var_l + nr * var_r) / n;
        let reduction = parent_variance - weighted;
        if best.map_or(true, |(_, _, r)| reduction > r) {
            let threshold = 0.5 * (ordered[i].0 + ordered[i + 1].0);
            best = Some((i, threshold, reduction));
        }
    }

    best.map(|(_, threshold, reduction)| {
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| x[[r, feature]] <= threshold);
        BestSplit {
            feature,
            threshold,
            reduction,
            left,
            right,
        }
    })
}
