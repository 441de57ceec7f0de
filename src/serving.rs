//! Query-time orchestration: raw embedding in, ranked asset URLs out.
//!
//! A [`SearchContext`] pairs a reducer with the forest built from its output.
//! The [`Searcher`] holds the active context behind an [`ArcSwap`]: each query
//! loads one snapshot and uses it to the end, so a rebuild can swap in a new
//! context at any time without blocking or tearing in-flight queries.

use crate::catalog;
use crate::config::EngineConfig;
use crate::distance::normalize;
use crate::error::{Result, SearchError};
use crate::forest::{Forest, ItemId, Neighbor};
use crate::pipeline::IndexArtifacts;
use crate::reduce::ReducerModel;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

/// Image → raw embedding. Implemented outside this crate (a CNN, a remote
/// service, ...).
pub trait Embedder: Send + Sync {
    /// Embed one encoded image. Failures should use [`SearchError::Embedding`].
    fn embed(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Length of every vector [`embed`](Self::embed) returns.
    fn dimension(&self) -> usize;
}

/// An immutable reducer/forest pair that can answer queries.
#[derive(Clone, Debug)]
pub struct SearchContext {
    reducer: Arc<ReducerModel>,
    forest: Arc<Forest>,
}

impl SearchContext {
    /// # Errors
    ///
    /// [`SearchError::Config`] unless `reducer.output_dim() == forest.dimension()`.
    pub fn new(reducer: ReducerModel, forest: Forest) -> Result<Self> {
        if reducer.output_dim() != forest.dimension() {
            return Err(SearchError::config(format!(
                "reducer produces {}-dimensional vectors but the forest indexes {}",
                reducer.output_dim(),
                forest.dimension()
            )));
        }
        Ok(Self {
            reducer: Arc::new(reducer),
            forest: Arc::new(forest),
        })
    }

    pub fn reducer(&self) -> &ReducerModel {
        &self.reducer
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// normalize → reduce → normalize → forest query.
    ///
    /// `k` and `search_budget` are checked before the vector, and the vector
    /// before the forest is consulted, so an empty forest still rejects bad
    /// input.
    pub fn search(&self, raw: &[f32], k: usize, search_budget: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(SearchError::InvalidQuery("k must be positive".to_string()));
        }
        if search_budget == 0 {
            return Err(SearchError::InvalidQuery(
                "search budget must be positive".to_string(),
            ));
        }
        let reduced = self.reducer.transform(&normalize(raw))?;
        self.forest.query(&normalize(&reduced), k, search_budget)
    }
}

/// One ranked result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: ItemId,
    /// `{static_prefix}/{id}`
    pub asset_url: String,
    pub distance: f32,
}

/// Serves queries against a hot-swappable [`SearchContext`].
pub struct Searcher {
    context: ArcSwap<SearchContext>,
    config: EngineConfig,
}

impl Searcher {
    pub fn new(context: SearchContext, config: EngineConfig) -> Self {
        Self {
            context: ArcSwap::from_pointee(context),
            config,
        }
    }

    /// Load the index directory named by `config.index_dir`.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let context = IndexArtifacts::load(&config.index_dir)?.into_context()?;
        Ok(Self::new(context, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The context queries are currently served from.
    pub fn snapshot(&self) -> Arc<SearchContext> {
        self.context.load_full()
    }

    /// Install `next` for all subsequent queries; returns the previous context.
    ///
    /// Queries already running keep the snapshot they started with.
    pub fn swap(&self, next: SearchContext) -> Arc<SearchContext> {
        let items = next.forest().len();
        let trees = next.forest().num_trees();
        let previous = self.context.swap(Arc::new(next));
        tracing::info!(
            items,
            trees,
            previous_items = previous.forest().len(),
            "search context swapped"
        );
        previous
    }

    /// Re-read `config.index_dir` and swap it in. On error the current
    /// context stays active.
    pub fn reload(&self) -> Result<()> {
        let context = IndexArtifacts::load(&self.config.index_dir)?.into_context()?;
        self.swap(context);
        Ok(())
    }

    /// Top-`k` hits for a raw embedding.
    ///
    /// `k` is signed so that out-of-range requests from the transport layer
    /// surface as [`SearchError::InvalidQuery`] rather than wrapping.
    pub fn search(&self, raw: &[f32], k: i64) -> Result<Vec<SearchHit>> {
        let k = checked_k(k)?;
        let context = self.context.load_full();
        let budget = context
            .forest()
            .default_search_budget(k)
            .max(self.config.search_budget);

        let neighbors = context.search(raw, k, budget)?;
        tracing::debug!(k, budget, hits = neighbors.len(), "search");
        Ok(neighbors
            .into_iter()
            .map(|n| SearchHit {
                asset_url: catalog::asset_url(&self.config.static_prefix, &n.id),
                id: n.id,
                distance: n.distance,
            })
            .collect())
    }

    /// Embed `image`, then [`search`](Self::search).
    pub fn search_image(
        &self,
        embedder: &dyn Embedder,
        image: &[u8],
        k: i64,
    ) -> Result<Vec<SearchHit>> {
        checked_k(k)?;
        let raw = embedder.embed(image)?;
        self.search(&raw, k)
    }
}

fn checked_k(k: i64) -> Result<usize> {
    if k <= 0 {
        return Err(SearchError::InvalidQuery(format!(
            "k must be positive, got {k}"
        )));
    }
    usize::try_from(k).map_err(|_| SearchError::InvalidQuery(format!("k = {k} is too large")))
}
