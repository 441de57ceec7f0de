//! Random projection forest (Annoy-style).
//!
//! **Technical Name**: Random Projection Forest with best-first multi-tree search
//!
//! Algorithm:
//! - Each tree recursively splits its item subset with the perpendicular
//!   bisector of two randomly sampled members
//! - Subsets of at most `leaf_size` items become leaves
//! - Queries walk all trees at once through a single priority frontier,
//!   ordered by how far the query sits on the wrong side of each hyperplane it
//!   crossed, until `search_budget` distinct candidates are gathered
//! - Candidates are re-ranked by exact angular distance
//!
//! **Relationships**:
//! - Trades the exactness of the ball tree for build speed and much better
//!   behavior in ~100 dimensions
//! - More trees (`num_trees`) raise recall at a fixed budget; a larger
//!   `search_budget` raises recall at a fixed forest
//!
//! # Tie-break rules
//!
//! - A point exactly on a hyperplane (margin `>= 0`) goes **right**, both at
//!   build and query time
//! - Tree `t` draws from `StdRng::seed_from_u64(seed ^ splitmix64(t))`, so a
//!   forest is a pure function of `(corpus, params)`
//! - Results with equal distance are ordered by ascending [`ItemId`]
//!
//! # References
//!
//! - Bernhardsson (2015): "Annoy: Approximate Nearest Neighbors Oh Yeah"
//! - Dasgupta & Freund (2008): "Random projection trees and low dimensional manifolds"

mod build;
mod search;

pub use build::ForestBuilder;
pub use search::QueryStats;

use crate::error::{Result, SearchError};
use crate::simd;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Opaque, stable identifier of a corpus item.
///
/// In the image pipeline this is the item's canonical relative asset path
/// (see [`catalog`](crate::catalog)), but the forest only relies on it being
/// unique and totally ordered.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One corpus entry: identifier plus compressed, unit-normalized vector.
#[derive(Clone, Debug, PartialEq)]
pub struct CorpusItem {
    pub id: ItemId,
    pub vector: Vec<f32>,
}

impl CorpusItem {
    pub fn new(id: impl Into<ItemId>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
        }
    }
}

/// A query result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: ItemId,
    /// Angular distance to the query, in `[0, 2]`.
    pub distance: f32,
}

/// Forest construction parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of independent trees (`T`).
    pub num_trees: usize,

    /// Maximum items per leaf (`L`).
    pub leaf_size: usize,

    /// Base seed; tree `t` derives its own stream from it.
    pub seed: u64,

    /// Random hyperplane draws per node before falling back to a parity split.
    pub max_split_attempts: usize,

    /// Worker threads for tree construction (`None` = rayon default).
    pub threads: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: 100,
            leaf_size: 16,
            seed: 42,
            max_split_attempts: 8,
            threads: None,
        }
    }
}

impl ForestParams {
    /// Reject parameters a forest cannot be built or stored with.
    ///
    /// Counts are stored as `u32` on disk, so anything larger is refused here
    /// rather than truncated at save time.
    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(SearchError::config("num_trees must be at least 1"));
        }
        if self.leaf_size == 0 {
            return Err(SearchError::config("leaf_size must be at least 1"));
        }
        if u32::try_from(self.num_trees).is_err() {
            return Err(SearchError::config(format!(
                "num_trees {} exceeds {}",
                self.num_trees,
                u32::MAX
            )));
        }
        if u32::try_from(self.leaf_size).is_err() {
            return Err(SearchError::config(format!(
                "leaf_size {} exceeds {}",
                self.leaf_size,
                u32::MAX
            )));
        }
        if self.threads == Some(0) {
            return Err(SearchError::config("threads must be at least 1 when set"));
        }
        Ok(())
    }
}

/// Tree node, stored in a per-tree flat table.
///
/// Child positions index into the same table and are always greater than the
/// parent's own position, so a valid tree cannot contain a cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Splitting hyperplane `{x : dot(normal, x) = offset}`.
    Internal {
        normal: Vec<f32>,
        offset: f32,
        left: u32,
        right: u32,
    },
    /// Dense item indices.
    Leaf { items: Vec<u32> },
}

/// One randomized space-partitioning tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    pub(crate) root: u32,
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of levels on the deepest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut max = 0;
        if let Some(d) = depth.get_mut(self.root as usize) {
            *d = 1;
        }
        // Children always sit after their parent, so one forward pass suffices.
        for (i, node) in self.nodes.iter().enumerate() {
            let here = depth[i];
            max = max.max(here);
            if let Node::Internal { left, right, .. } = node {
                depth[*left as usize] = here + 1;
                depth[*right as usize] = here + 1;
            }
        }
        max
    }
}

/// Immutable ANN index over a fixed corpus.
///
/// `Forest` is `Send + Sync` and never mutated after construction; share it
/// behind an `Arc` and query it from any number of threads.
#[derive(Clone, Debug, PartialEq)]
pub struct Forest {
    pub(crate) dimension: usize,
    pub(crate) leaf_size: usize,
    pub(crate) seed: u64,
    pub(crate) ids: Vec<ItemId>,
    /// Item vectors, row-major `len() × dimension`.
    pub(crate) vectors: Vec<f32>,
    pub(crate) trees: Vec<Tree>,
}

impl Forest {
    /// A forest with no items and no trees. Every query returns nothing.
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            leaf_size: 1,
            seed: 0,
            ids: Vec::new(),
            vectors: Vec::new(),
            trees: Vec::new(),
        }
    }

    /// Assemble a forest from decoded parts, checking every structural invariant.
    ///
    /// # Errors
    ///
    /// [`SearchError::CorruptIndex`] if any child or item index is out of
    /// range, a leaf exceeds `leaf_size`, ids repeat, or lengths disagree.
    pub fn from_parts(
        dimension: usize,
        leaf_size: usize,
        seed: u64,
        ids: Vec<ItemId>,
        vectors: Vec<f32>,
        trees: Vec<Tree>,
    ) -> Result<Self> {
        let forest = Self {
            dimension,
            leaf_size,
            seed,
            ids,
            vectors,
            trees,
        };
        forest.validate()?;
        Ok(forest)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(SearchError::corrupt("dimension is zero"));
        }
        if self.leaf_size == 0 {
            return Err(SearchError::corrupt("leaf size is zero"));
        }
        if self.vectors.len() != self.ids.len() * self.dimension {
            return Err(SearchError::corrupt(format!(
                "{} vector components for {} items of dimension {}",
                self.vectors.len(),
                self.ids.len(),
                self.dimension
            )));
        }
        let mut seen = HashSet::with_capacity(self.ids.len());
        for id in &self.ids {
            if !seen.insert(id) {
                return Err(SearchError::corrupt(format!("duplicate item id {id}")));
            }
        }

        let n = self.ids.len();
        for (t, tree) in self.trees.iter().enumerate() {
            let len = tree.nodes.len();
            if tree.root as usize >= len {
                return Err(SearchError::corrupt(format!(
                    "tree {t}: root {} out of range ({len} nodes)",
                    tree.root
                )));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match node {
                    Node::Internal {
                        normal,
                        left,
                        right,
                        ..
                    } => {
                        if normal.len() != self.dimension {
                            return Err(SearchError::corrupt(format!(
                                "tree {t} node {i}: normal has {} components",
                                normal.len()
                            )));
                        }
                        for &child in [left, right] {
                            let c = child as usize;
                            if c >= len || c <= i {
                                return Err(SearchError::corrupt(format!(
                                    "tree {t} node {i}: child {child} out of range"
                                )));
                            }
                        }
                    }
                    Node::Leaf { items } => {
                        if items.len() > self.leaf_size {
                            return Err(SearchError::corrupt(format!(
                                "tree {t} node {i}: leaf holds {} items, limit {}",
                                items.len(),
                                self.leaf_size
                            )));
                        }
                        if let Some(&bad) = items.iter().find(|&&item| item as usize >= n) {
                            return Err(SearchError::corrupt(format!(
                                "tree {t} node {i}: item {bad} out of range ({n} items)"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Vector dimension `D`.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn item_id(&self, index: u32) -> Option<&ItemId> {
        self.ids.get(index as usize)
    }

    /// Stored (compressed, normalized) vector of item `index`.
    pub fn vector(&self, index: u32) -> Option<&[f32]> {
        let start = index as usize * self.dimension;
        self.vectors.get(start..start + self.dimension)
    }

    /// Classic default: `k` candidates per tree.
    pub fn default_search_budget(&self, k: usize) -> usize {
        k.saturating_mul(self.trees.len()).max(k)
    }

    /// Approximate in-memory footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        let nodes: usize = self
            .trees
            .iter()
            .flat_map(|t| t.nodes.iter())
            .map(|node| match node {
                Node::Internal { normal, .. } => normal.len() * 4 + 12,
                Node::Leaf { items } => items.len() * 4,
            })
            .sum();
        self.vectors.len() * std::mem::size_of::<f32>()
            + self.ids.iter().map(|id| id.as_str().len()).sum::<usize>()
            + nodes
    }

    #[inline]
    pub(crate) fn row(&self, index: u32) -> &[f32] {
        let start = index as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }
}

/// Signed distance-like margin of `x` relative to a split hyperplane.
#[inline]
pub(crate) fn margin(normal: &[f32], offset: f32, x: &[f32]) -> f32 {
    simd::dot(normal, x) - offset
}

/// On-boundary points go right.
#[inline]
pub(crate) fn goes_right(margin: f32) -> bool {
    margin >= 0.0
}

/// SplitMix64 finalizer, used to derive independent per-tree seeds.
pub(crate) fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_tree(items: Vec<u32>) -> Tree {
        Tree {
            root: 0,
            nodes: vec![Node::Leaf { items }],
        }
    }

    #[test]
    fn from_parts_rejects_out_of_range_leaf_item() {
        let err = Forest::from_parts(
            2,
            4,
            0,
            vec!["a".into()],
            vec![1.0, 0.0],
            vec![leaf_tree(vec![0, 3])],
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::CorruptIndex(_)));
    }

    #[test]
    fn from_parts_rejects_backward_child() {
        let tree = Tree {
            root: 0,
            nodes: vec![
                Node::Internal {
                    normal: vec![1.0, 0.0],
                    offset: 0.0,
                    left: 0,
                    right: 1,
                },
                Node::Leaf { items: vec![0] },
            ],
        };
        let err = Forest::from_parts(2, 4, 0, vec!["a".into()], vec![1.0, 0.0], vec![tree])
            .unwrap_err();
        assert!(matches!(err, SearchError::CorruptIndex(_)));
    }

    #[test]
    fn from_parts_rejects_duplicate_ids() {
        let err = Forest::from_parts(
            1,
            4,
            0,
            vec!["a".into(), "a".into()],
            vec![1.0, 1.0],
            vec![leaf_tree(vec![0, 1])],
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::CorruptIndex(_)));
    }

    #[test]
    fn vector_accessor_bounds() {
        let forest = Forest::from_parts(
            2,
            4,
            0,
            vec!["a".into(), "b".into()],
            vec![1.0, 0.0, 0.0, 1.0],
            vec![leaf_tree(vec![0, 1])],
        )
        .unwrap();
        assert_eq!(forest.vector(1), Some(&[0.0, 1.0][..]));
        assert_eq!(forest.vector(2), None);
        assert_eq!(forest.item_id(0).map(ItemId::as_str), Some("a"));
        assert_eq!(forest.trees()[0].depth(), 1);
    }

    #[test]
    fn default_budget_scales_with_trees() {
        let mut forest = Forest::empty(3);
        assert_eq!(forest.default_search_budget(10), 10);
        forest.trees = vec![leaf_tree(vec![]); 5];
        assert_eq!(forest.default_search_budget(10), 50);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn params_beyond_u32_are_rejected() {
        let too_big = u32::MAX as usize + 1;
        for params in [
            ForestParams {
                leaf_size: too_big,
                ..ForestParams::default()
            },
            ForestParams {
                num_trees: too_big,
                ..ForestParams::default()
            },
        ] {
            assert!(matches!(params.validate(), Err(SearchError::Config(_))));
        }
        assert!(ForestParams {
            leaf_size: u32::MAX as usize,
            ..ForestParams::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn boundary_goes_right() {
        assert!(goes_right(0.0));
        assert!(!goes_right(-f32::EPSILON));
    }

    #[test]
    fn splitmix_spreads_consecutive_inputs() {
        assert_ne!(splitmix64(0), splitmix64(1));
        assert_ne!(splitmix64(1), splitmix64(2));
    }
}
