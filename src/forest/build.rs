//! Forest construction.

use super::{goes_right, margin, splitmix64, CorpusItem, Forest, ForestParams, ItemId, Node, Tree};
use crate::distance::{self, NORM_EPSILON};
use crate::error::{Result, SearchError};
use crate::simd;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;

/// Tolerance for the "inputs should be unit vectors" warning.
const UNIT_TOLERANCE: f32 = 1e-3;

/// Builds a fresh [`Forest`] from a corpus.
///
/// The builder never touches a forest that is already being served; it always
/// produces a new one that the caller swaps in.
#[derive(Clone, Debug, Default)]
pub struct ForestBuilder {
    params: ForestParams,
}

/// Outcome of splitting one node's item subset.
struct Split {
    normal: Vec<f32>,
    offset: f32,
    left: Vec<u32>,
    right: Vec<u32>,
}

impl ForestBuilder {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Convenience for tests and small tools: build from `(id, vector)` pairs.
    pub fn build_pairs<I, S>(&self, pairs: I) -> Result<Forest>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<ItemId>,
    {
        self.build(
            pairs
                .into_iter()
                .map(|(id, vector)| CorpusItem::new(id, vector))
                .collect(),
        )
    }

    /// Build `num_trees` trees over `corpus`.
    ///
    /// Item vectors should already be unit-normalized; the angular metric is
    /// meaningless otherwise (a warning is logged, the build proceeds).
    ///
    /// # Errors
    ///
    /// - [`SearchError::EmptyCorpus`] for an empty corpus
    /// - [`SearchError::Config`] for parameters rejected by
    ///   [`ForestParams::validate`], duplicate ids, non-finite components, or
    ///   an oversized corpus
    /// - [`SearchError::DimensionMismatch`] if item vectors differ in length
    pub fn build(&self, corpus: Vec<CorpusItem>) -> Result<Forest> {
        let params = &self.params;
        params.validate()?;
        let Some(first) = corpus.first() else {
            return Err(SearchError::EmptyCorpus);
        };
        let dimension = first.vector.len();
        if dimension == 0 {
            return Err(SearchError::config("corpus vectors have zero dimension"));
        }
        if u32::try_from(dimension).is_err() {
            return Err(SearchError::config(format!(
                "dimension {dimension} exceeds u32 range"
            )));
        }
        if u32::try_from(corpus.len()).is_err() {
            return Err(SearchError::config(format!(
                "corpus of {} items exceeds u32 indexing",
                corpus.len()
            )));
        }

        let mut ids = Vec::with_capacity(corpus.len());
        let mut vectors = Vec::with_capacity(corpus.len() * dimension);
        let mut seen = HashSet::with_capacity(corpus.len());
        let mut off_unit = 0usize;
        for item in corpus {
            if item.vector.len() != dimension {
                return Err(SearchError::DimensionMismatch {
                    expected: dimension,
                    actual: item.vector.len(),
                });
            }
            if item.vector.iter().any(|x| !x.is_finite()) {
                return Err(SearchError::config(format!(
                    "item {} has a non-finite component",
                    item.id
                )));
            }
            if !seen.insert(item.id.clone()) {
                return Err(SearchError::config(format!("duplicate item id {}", item.id)));
            }
            if !distance::is_unit(&item.vector, UNIT_TOLERANCE) {
                off_unit += 1;
            }
            vectors.extend_from_slice(&item.vector);
            ids.push(item.id);
        }
        if off_unit > 0 {
            tracing::warn!(off_unit, "corpus contains vectors that are not unit-normalized");
        }

        let n = ids.len();
        tracing::info!(
            items = n,
            dimension,
            trees = params.num_trees,
            leaf_size = params.leaf_size,
            seed = params.seed,
            "building forest"
        );

        let ctx = BuildContext {
            vectors: &vectors,
            dimension,
            leaf_size: params.leaf_size,
            max_split_attempts: params.max_split_attempts,
        };
        let build_all = || -> Vec<Tree> {
            (0..params.num_trees)
                .into_par_iter()
                .map(|t| ctx.build_tree(n, tree_seed(params.seed, t)))
                .collect()
        };
        let trees = match params.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| SearchError::config(format!("failed to start build pool: {e}")))?
                .install(build_all),
            None => build_all(),
        };

        let nodes: usize = trees.iter().map(|t| t.nodes.len()).sum();
        tracing::info!(items = n, nodes, "forest built");

        Ok(Forest {
            dimension,
            leaf_size: params.leaf_size,
            seed: params.seed,
            ids,
            vectors,
            trees,
        })
    }
}

/// Seed for tree `t`: `seed ^ splitmix64(t)`.
pub(crate) fn tree_seed(seed: u64, t: usize) -> u64 {
    seed ^ splitmix64(t as u64)
}

/// Read-only view shared by all tree tasks.
struct BuildContext<'a> {
    vectors: &'a [f32],
    dimension: usize,
    leaf_size: usize,
    max_split_attempts: usize,
}

impl BuildContext<'_> {
    fn row(&self, index: u32) -> &[f32] {
        let start = index as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Build one tree over items `0..n`.
    ///
    /// Uses an explicit work stack instead of recursion: pathological data can
    /// produce very unbalanced trees. Children are appended after their parent.
    fn build_tree(&self, n: usize, seed: u64) -> Tree {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut nodes: Vec<Node> = vec![Node::Leaf { items: Vec::new() }];
        let mut stack: Vec<(usize, Vec<u32>)> = vec![(0, (0..n as u32).collect())];

        while let Some((slot, items)) = stack.pop() {
            if items.len() <= self.leaf_size {
                nodes[slot] = Node::Leaf { items };
                continue;
            }

            let split = self.split(&items, &mut rng);
            let left = nodes.len() as u32;
            let right = left + 1;
            nodes.push(Node::Leaf { items: Vec::new() });
            nodes.push(Node::Leaf { items: Vec::new() });
            nodes[slot] = Node::Internal {
                normal: split.normal,
                offset: split.offset,
                left,
                right,
            };
            stack.push((right as usize, split.right));
            stack.push((left as usize, split.left));
        }

        Tree { root: 0, nodes }
    }

    /// Split `items` (more than `leaf_size` of them) into two non-empty halves.
    fn split(&self, items: &[u32], rng: &mut StdRng) -> Split {
        let mut normal = vec![0.0f32; self.dimension];

        for _ in 0..self.max_split_attempts {
            let i = rng.random_range(0..items.len());
            let mut j = rng.random_range(0..items.len() - 1);
            if j >= i {
                j += 1;
            }
            let a = self.row(items[i]);
            let b = self.row(items[j]);

            simd::sub_into(a, b, &mut normal);
            let len = simd::norm(&normal);
            if len < NORM_EPSILON {
                // Duplicate vectors: no bisector exists.
                continue;
            }
            normal.iter_mut().for_each(|x| *x /= len);
            let offset = simd::dot(&normal, &simd::midpoint(a, b));

            let (right, left): (Vec<u32>, Vec<u32>) = items
                .iter()
                .copied()
                .partition(|&item| goes_right(margin(&normal, offset, self.row(item))));
            if !left.is_empty() && !right.is_empty() {
                return Split {
                    normal,
                    offset,
                    left,
                    right,
                };
            }
        }

        // Zero hyperplane: every query has margin 0 here, so both halves are
        // explored at the same cost.
        let (left, right) = parity_split(items);
        Split {
            normal: vec![0.0; self.dimension],
            offset: 0.0,
            left,
            right,
        }
    }
}

/// Even positions left, odd positions right.
fn parity_split(items: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let left = items.iter().step_by(2).copied().collect();
    let right = items.iter().skip(1).step_by(2).copied().collect();
    (left, right)
}
