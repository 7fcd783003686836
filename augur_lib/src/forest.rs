//! Bagged decision-tree ensemble used by the classifier.
//!
//! Small and deterministic by construction: every source of randomness
//! (bootstrap draws, feature subsampling) comes from one seeded generator,
//! so a fixed seed and fixed inputs always grow the same forest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tree-growing parameters.
#[derive(Debug, Clone)]
pub struct GrowthSettings {
    /// Number of bagged trees.
    pub trees: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Stop splitting below this many samples in a node.
    pub min_leaf: usize,
}

impl Default for GrowthSettings {
    fn default() -> Self {
        GrowthSettings {
            trees: 64,
            max_depth: 12,
            min_leaf: 1,
        }
    }
}

enum Node {
    // Class distribution at the leaf, summing to 1.
    Leaf { dist: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn posterior<'a>(&'a self, x: &[f64]) -> &'a [f64] {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                None | Some(Node::Leaf { .. }) => break,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = x.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
        match self.nodes.get(idx) {
            Some(Node::Leaf { dist }) => dist,
            _ => &[],
        }
    }
}

fn gini(class_weights: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - class_weights
        .iter()
        .map(|w| {
            let p = w / total;
            p * p
        })
        .sum::<f64>()
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    w: &'a [f64],
    n_labels: usize,
    n_features: usize,
    features_per_split: usize,
    settings: &'a GrowthSettings,
    root_weight: f64,
    importances: Vec<f64>,
}

impl Grower<'_> {
    fn class_weights(&self, samples: &[usize]) -> (Vec<f64>, f64) {
        let mut cw = vec![0.0; self.n_labels];
        let mut total = 0.0;
        for &i in samples {
            let label = self.y.get(i).copied().unwrap_or(0);
            let weight = self.w.get(i).copied().unwrap_or(0.0);
            if let Some(slot) = cw.get_mut(label) {
                *slot += weight;
            }
            total += weight;
        }
        (cw, total)
    }

    fn leaf(&self, nodes: &mut Vec<Node>, cw: Vec<f64>, total: f64) -> usize {
        let dist = if total > 0.0 {
            cw.iter().map(|w| w / total).collect()
        } else {
            vec![0.0; self.n_labels]
        };
        nodes.push(Node::Leaf { dist });
        nodes.len() - 1
    }

    fn value(&self, sample: usize, feature: usize) -> f64 {
        self.x
            .get(sample)
            .and_then(|row| row.get(feature))
            .copied()
            .unwrap_or(0.0)
    }

    /// Best (gain, threshold) for one feature over the node's samples, by
    /// sweeping the sorted values and scoring each boundary between two
    /// distinct ones.
    fn best_split_on(
        &self,
        feature: usize,
        samples: &[usize],
        cw: &[f64],
        total: f64,
        parent_gini: f64,
    ) -> Option<(f64, f64)> {
        let mut vals: Vec<(f64, usize)> = samples
            .iter()
            .map(|&i| (self.value(i, feature), i))
            .collect();
        vals.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = vec![0.0; self.n_labels];
        let mut left_total = 0.0;
        let mut best: Option<(f64, f64)> = None;

        for pair in vals.windows(2) {
            let ((value, sample), (next_value, _)) = match pair {
                [a, b] => (*a, *b),
                _ => continue,
            };
            let label = self.y.get(sample).copied().unwrap_or(0);
            let weight = self.w.get(sample).copied().unwrap_or(0.0);
            if let Some(slot) = left.get_mut(label) {
                *slot += weight;
            }
            left_total += weight;

            if next_value <= value {
                // Same value on both sides, not a real boundary.
                continue;
            }

            let right_total = total - left_total;
            if left_total <= 0.0 || right_total <= 0.0 {
                continue;
            }
            let right_gini = {
                let sum: f64 = cw
                    .iter()
                    .zip(&left)
                    .map(|(all, l)| {
                        let p = (all - l) / right_total;
                        p * p
                    })
                    .sum();
                1.0 - sum
            };
            let gain = parent_gini
                - (left_total / total) * gini(&left, left_total)
                - (right_total / total) * right_gini;
            let better = match best {
                None => gain > 1e-12,
                Some((best_gain, _)) => gain > best_gain + 1e-12,
            };
            if better {
                best = Some((gain, (value + next_value) / 2.0));
            }
        }
        best
    }

    fn best_split_among(
        &self,
        features: &[usize],
        samples: &[usize],
        cw: &[f64],
        total: f64,
        parent_gini: f64,
    ) -> Option<(f64, usize, f64)> {
        let mut best: Option<(f64, usize, f64)> = None;
        for &feature in features {
            if let Some((gain, threshold)) =
                self.best_split_on(feature, samples, cw, total, parent_gini)
            {
                let better = match best {
                    None => true,
                    Some((best_gain, _, _)) => gain > best_gain + 1e-12,
                };
                if better {
                    best = Some((gain, feature, threshold));
                }
            }
        }
        best
    }

    fn grow(
        &mut self,
        nodes: &mut Vec<Node>,
        samples: &[usize],
        depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let (cw, total) = self.class_weights(samples);
        let parent_gini = gini(&cw, total);

        let stop = depth >= self.settings.max_depth
            || samples.len() <= self.settings.min_leaf
            || parent_gini <= 1e-12;
        if stop {
            return self.leaf(nodes, cw, total);
        }

        // Random feature subset, evaluated in index order so that the
        // chosen split does not depend on subset ordering.
        let mut feats = rand::seq::index::sample(
            rng,
            self.n_features,
            self.features_per_split.min(self.n_features),
        )
        .into_vec();
        feats.sort_unstable();

        let mut best = self.best_split_among(&feats, samples, &cw, total, parent_gini);
        if best.is_none() && feats.len() < self.n_features {
            // The subset only held constant features; look at the rest
            // before giving up on the node.
            let all: Vec<usize> = (0..self.n_features).collect();
            best = self.best_split_among(&all, samples, &cw, total, parent_gini);
        }

        let (gain, feature, threshold) = match best {
            None => return self.leaf(nodes, cw, total),
            Some(b) => b,
        };

        if let Some(slot) = self.importances.get_mut(feature) {
            *slot += (total / self.root_weight) * gain;
        }

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .copied()
            .partition(|&i| self.value(i, feature) <= threshold);

        let idx = nodes.len();
        // Placeholder, patched once both children exist.
        nodes.push(Node::Leaf { dist: Vec::new() });
        let left = self.grow(nodes, &left_samples, depth + 1, rng);
        let right = self.grow(nodes, &right_samples, depth + 1, rng);
        if let Some(slot) = nodes.get_mut(idx) {
            *slot = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
        }
        idx
    }
}

/// A bagged ensemble of Gini-grown decision trees.
pub struct Forest {
    trees: Vec<Tree>,
    n_labels: usize,
    importances: Vec<f64>,
}

impl Forest {
    /// Fit on dense feature rows `x`, label indices `y` and per-sample
    /// weights `w` (class balancing is the caller's concern; bagging is
    /// ours).  Each tree sees a bootstrap resample and √n-feature splits.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        w: &[f64],
        n_labels: usize,
        settings: &GrowthSettings,
        seed: u64,
    ) -> Forest {
        let n = x.len();
        let n_features = x.first().map(Vec::len).unwrap_or(0);
        let features_per_split =
            ((n_features as f64).sqrt().round() as usize).max(1);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(settings.trees);

        for _ in 0..settings.trees {
            let bootstrap: Vec<usize> =
                (0..n).map(|_| rng.gen_range(0..n)).collect();

            let mut grower = Grower {
                x,
                y,
                w,
                n_labels,
                n_features,
                features_per_split,
                settings,
                root_weight: bootstrap
                    .iter()
                    .map(|&i| w.get(i).copied().unwrap_or(0.0))
                    .sum::<f64>()
                    .max(f64::EPSILON),
                importances: vec![0.0; n_features],
            };
            let mut nodes = Vec::new();
            grower.grow(&mut nodes, &bootstrap, 0, &mut rng);
            for (acc, tree_imp) in
                importances.iter_mut().zip(&grower.importances)
            {
                *acc += tree_imp;
            }
            trees.push(Tree { nodes });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        Forest {
            trees,
            n_labels,
            importances,
        }
    }

    /// Mean of the per-tree leaf distributions; sums to 1 (up to rounding)
    /// whenever at least one tree was grown.
    pub fn posterior(&self, x: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_labels];
        if self.trees.is_empty() {
            return acc;
        }
        for tree in &self.trees {
            for (slot, p) in acc.iter_mut().zip(tree.posterior(x)) {
                *slot += p;
            }
        }
        let n = self.trees.len() as f64;
        for slot in &mut acc {
            *slot /= n;
        }
        acc
    }

    /// Normalized mean-decrease-in-impurity per feature.
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }
}

#[cfg(test)]
mod test {
    use crate::forest::{Forest, GrowthSettings};

    // Two classes separable on feature 0; feature 1 is noise held constant.
    fn toy() -> (Vec<Vec<f64>>, Vec<usize>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..8 {
            x.push(vec![0.1 * i as f64, 0.5]);
            y.push(0);
        }
        for i in 0..8 {
            x.push(vec![2.0 + 0.1 * i as f64, 0.5]);
            y.push(1);
        }
        let w = vec![1.0; x.len()];
        (x, y, w)
    }

    #[test]
    fn test_separable_classes() {
        let (x, y, w) = toy();
        let forest =
            Forest::fit(&x, &y, &w, 2, &GrowthSettings::default(), 42);

        let p0 = forest.posterior(&[0.2, 0.5]);
        let p1 = forest.posterior(&[2.5, 0.5]);
        assert!(p0[0] > 0.9, "expected class 0, got {p0:?}");
        assert!(p1[1] > 0.9, "expected class 1, got {p1:?}");

        let total: f64 = p0.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_importance_lands_on_informative_feature() {
        let (x, y, w) = toy();
        let forest =
            Forest::fit(&x, &y, &w, 2, &GrowthSettings::default(), 42);
        let imp = forest.importances();
        assert!(imp[0] > 0.99);
        assert!(imp[1] < 0.01);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y, w) = toy();
        let a = Forest::fit(&x, &y, &w, 2, &GrowthSettings::default(), 7);
        let b = Forest::fit(&x, &y, &w, 2, &GrowthSettings::default(), 7);
        let query = [1.1, 0.5];
        assert_eq!(a.posterior(&query), b.posterior(&query));
        assert_eq!(a.importances(), b.importances());
    }

    #[test]
    fn test_weights_shift_the_posterior() {
        // All samples identical features, labels split 50/50: the posterior
        // follows the weights.
        let x = vec![vec![1.0]; 4];
        let y = vec![0, 0, 1, 1];
        let w = vec![3.0, 3.0, 1.0, 1.0];
        let forest =
            Forest::fit(&x, &y, &w, 2, &GrowthSettings::default(), 1);
        let p = forest.posterior(&[1.0]);
        assert!(p[0] > p[1]);
    }
}
