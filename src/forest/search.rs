//! Best-first multi-tree search with exact re-ranking.

use super::{goes_right, margin, Forest, Neighbor, Node};
use crate::distance::angular_distance;
use crate::error::{Result, SearchError};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Frontier entry: a node waiting to be expanded.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Frontier {
    /// Largest hyperplane margin crossed against the query's side on the way here.
    cost: f32,
    tree: u32,
    node: u32,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost; equal costs pop in (tree, node) order so the
        // traversal is deterministic.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Counters from a single query, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Frontier entries popped (internal nodes and leaves).
    pub nodes_visited: usize,
    pub leaves_visited: usize,
    /// Distinct candidates re-ranked with exact distances.
    pub candidates: usize,
}

impl Forest {
    /// Approximate top-`k` neighbors of a unit query vector.
    ///
    /// Gathers at least `search_budget` distinct candidates (or the whole
    /// reachable corpus) before re-ranking; the budget bounds the query's cost.
    ///
    /// # Errors
    ///
    /// - [`SearchError::InvalidQuery`] if `k == 0` or `search_budget == 0`
    /// - [`SearchError::DimensionMismatch`] if `query.len() != self.dimension()`
    ///
    /// An empty forest yields `Ok(vec![])`.
    pub fn query(&self, query: &[f32], k: usize, search_budget: usize) -> Result<Vec<Neighbor>> {
        self.query_with_stats(query, k, search_budget)
            .map(|(neighbors, _)| neighbors)
    }

    /// [`query`](Self::query) plus traversal counters.
    pub fn query_with_stats(
        &self,
        query: &[f32],
        k: usize,
        search_budget: usize,
    ) -> Result<(Vec<Neighbor>, QueryStats)> {
        self.check_query(query, k)?;
        if search_budget == 0 {
            return Err(SearchError::InvalidQuery(
                "search budget must be positive".to_string(),
            ));
        }

        let mut stats = QueryStats::default();
        if self.trees.is_empty() || self.ids.is_empty() {
            return Ok((Vec::new(), stats));
        }

        let mut frontier = BinaryHeap::with_capacity(self.trees.len() * 4);
        for tree in 0..self.trees.len() {
            frontier.push(Frontier {
                cost: 0.0,
                tree: tree as u32,
                node: self.trees[tree].root,
            });
        }

        // Sized by the budget, not the corpus: per-query work stays bounded.
        let expected = search_budget.min(self.ids.len());
        let mut seen: HashSet<u32> = HashSet::with_capacity(expected);
        let mut candidates: Vec<u32> = Vec::with_capacity(expected);

        while candidates.len() < search_budget {
            let Some(entry) = frontier.pop() else {
                break;
            };
            stats.nodes_visited += 1;

            match &self.trees[entry.tree as usize].nodes[entry.node as usize] {
                Node::Leaf { items } => {
                    stats.leaves_visited += 1;
                    for &item in items {
                        if seen.insert(item) {
                            candidates.push(item);
                        }
                    }
                }
                Node::Internal {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let m = margin(normal, *offset, query);
                    let (near, far) = if goes_right(m) {
                        (*right, *left)
                    } else {
                        (*left, *right)
                    };
                    frontier.push(Frontier {
                        cost: entry.cost,
                        tree: entry.tree,
                        node: near,
                    });
                    frontier.push(Frontier {
                        cost: entry.cost.max(m.abs()),
                        tree: entry.tree,
                        node: far,
                    });
                }
            }
        }

        stats.candidates = candidates.len();
        let neighbors = self.rerank(query, candidates, k);
        tracing::trace!(?stats, returned = neighbors.len(), "forest query");
        Ok((neighbors, stats))
    }

    /// Exact top-`k` by scanning every item. Same ordering rules as [`query`](Self::query).
    pub fn exact_query(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_query(query, k)?;
        Ok(self.rerank(query, (0..self.ids.len() as u32).collect(), k))
    }

    fn check_query(&self, query: &[f32], k: usize) -> Result<()> {
        if k == 0 {
            return Err(SearchError::InvalidQuery("k must be positive".to_string()));
        }
        if query.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        Ok(())
    }

    /// Sort candidates by exact distance, ties by ascending id, keep `k`.
    fn rerank(&self, query: &[f32], candidates: Vec<u32>, k: usize) -> Vec<Neighbor> {
        let mut scored: Vec<(f32, u32)> = candidates
            .into_iter()
            .map(|item| (angular_distance(query, self.row(item)), item))
            .collect();
        scored.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| self.ids[a.1 as usize].cmp(&self.ids[b.1 as usize]))
        });
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(distance, item)| Neighbor {
                id: self.ids[item as usize].clone(),
                distance,
            })
            .collect()
    }
}
