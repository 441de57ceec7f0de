//! ANN quality evaluation: synthetic corpora and recall@k.

use crate::distance::normalize;
use crate::error::Result;
use crate::forest::{Forest, ItemId, Neighbor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// A corpus plus held-out queries.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Vectors to index
    pub train: Vec<Vec<f32>>,
    /// Query vectors
    pub test: Vec<Vec<f32>>,
    pub dimension: usize,
}

impl Dataset {
    /// `(id, vector)` pairs for the training set, ids `item-00000`, `item-00001`, ...
    pub fn corpus(&self) -> Vec<(ItemId, Vec<f32>)> {
        self.train
            .iter()
            .enumerate()
            .map(|(i, v)| (ItemId::new(format!("item-{i:05}")), v.clone()))
            .collect()
    }
}

/// Unit vectors scattered around `n_clusters` random directions.
///
/// Closer to real image embeddings than uniform noise: neighborhoods are
/// dense and most of the variance lives in a few directions.
pub fn clustered_unit_dataset(
    n_train: usize,
    n_test: usize,
    dimension: usize,
    n_clusters: usize,
    cluster_std: f32,
    seed: u64,
) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_clusters = n_clusters.max(1);

    let centers: Vec<Vec<f32>> = (0..n_clusters)
        .map(|_| normalize(&gaussian(&mut rng, dimension, 1.0)))
        .collect();

    let sample = |rng: &mut StdRng| -> Vec<f32> {
        let center = &centers[rng.random_range(0..n_clusters)];
        let noise = gaussian(rng, dimension, cluster_std);
        normalize(&center.iter().zip(&noise).map(|(c, z)| c + z).collect::<Vec<_>>())
    };

    let train = (0..n_train).map(|_| sample(&mut rng)).collect();
    let test = (0..n_test).map(|_| sample(&mut rng)).collect();
    Dataset {
        train,
        test,
        dimension,
    }
}

fn gaussian(rng: &mut StdRng, dimension: usize, std: f32) -> Vec<f32> {
    (0..dimension)
        .map(|_| {
            // Box-Muller; 1 - u keeps ln away from zero.
            let u1: f32 = 1.0 - rng.random::<f32>();
            let u2: f32 = rng.random();
            std * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
        })
        .collect()
}

/// Fraction of the true top-`k` ids present in the first `k` retrieved.
///
/// recall@k = |retrieved ∩ ground_truth| / min(k, |ground_truth|)
pub fn recall_at_k(ground_truth: &[Neighbor], retrieved: &[Neighbor], k: usize) -> f32 {
    let expected = k.min(ground_truth.len());
    if expected == 0 {
        return 0.0;
    }
    let truth: HashSet<&ItemId> = ground_truth.iter().take(k).map(|n| &n.id).collect();
    let hits = retrieved
        .iter()
        .take(k)
        .filter(|n| truth.contains(&n.id))
        .count();
    hits as f32 / expected as f32
}

/// Mean recall@k of `forest.query` against brute force over `queries`.
pub fn mean_recall(
    forest: &Forest,
    queries: &[Vec<f32>],
    k: usize,
    search_budget: usize,
) -> Result<f32> {
    if queries.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for q in queries {
        let truth = forest.exact_query(q, k)?;
        let found = forest.query(q, k, search_budget)?;
        total += recall_at_k(&truth, &found, k);
    }
    Ok(total / queries.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::is_unit;
    use crate::forest::{ForestBuilder, ForestParams};

    fn n(id: &str) -> Neighbor {
        Neighbor {
            id: ItemId::from(id),
            distance: 0.0,
        }
    }

    #[test]
    fn recall_counts_overlap() {
        let truth = [n("a"), n("b"), n("c"), n("d")];
        let found = [n("a"), n("x"), n("c"), n("y")];
        assert_eq!(recall_at_k(&truth, &found, 4), 0.5);
        assert_eq!(recall_at_k(&truth, &found, 1), 1.0);
        assert_eq!(recall_at_k(&truth, &[], 4), 0.0);
        assert_eq!(recall_at_k(&[], &found, 4), 0.0);
    }

    #[test]
    fn recall_with_small_corpus_uses_available_truth() {
        let truth = [n("a"), n("b")];
        assert_eq!(recall_at_k(&truth, &truth, 10), 1.0);
    }

    #[test]
    fn dataset_is_unit_and_reproducible() {
        let a = clustered_unit_dataset(50, 5, 16, 4, 0.2, 3);
        let b = clustered_unit_dataset(50, 5, 16, 4, 0.2, 3);
        assert_eq!(a.train, b.train);
        assert!(a.train.iter().chain(&a.test).all(|v| is_unit(v, 1e-4)));
        assert_eq!(a.corpus()[7].0.as_str(), "item-00007");
    }

    #[test]
    fn exhaustive_budget_gives_perfect_recall() {
        let data = clustered_unit_dataset(200, 10, 8, 5, 0.3, 11);
        let forest = ForestBuilder::new(ForestParams {
            num_trees: 5,
            leaf_size: 8,
            ..ForestParams::default()
        })
        .build_pairs(data.corpus())
        .unwrap();
        let recall = mean_recall(&forest, &data.test, 10, forest.len()).unwrap();
        assert_eq!(recall, 1.0);
    }
}
