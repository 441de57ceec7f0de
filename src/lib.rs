//! lookalike: content-based image retrieval core.
//!
//! Given a raw image embedding, return the corpus images most similar to it.
//! The crate owns the similarity engine; image decoding, the embedding model,
//! and HTTP transport live outside it.
//!
//! - `reduce/`: PCA fit and projection (`D_raw → D`)
//! - `forest/`: random projection forest build and best-first query
//! - `persistence/`: checksummed binary artifacts and the index manifest
//! - `pipeline`: offline build (`fit → compress → build → save`)
//! - `serving`: hot-swappable query context and result formatting
//!
//! # Critical Nuances
//!
//! ## Normalize Twice
//!
//! Angular distance is only meaningful on unit vectors. Raw embeddings are
//! normalized before PCA, and the projected vectors again afterwards: PCA
//! centers and truncates, so its output is never unit length. Both build and
//! query paths do this; skipping either side silently degrades recall.
//!
//! ## Budget, not `k`, Controls Recall
//!
//! A query collects `search_budget` candidates before exact re-ranking. With
//! `k · num_trees` (the default) recall is usually high; raise the budget,
//! not `k`, when results look wrong.
//!
//! # Example
//!
//! ```
//! use lookalike::{ForestBuilder, ForestParams};
//!
//! let forest = ForestBuilder::new(ForestParams { num_trees: 4, ..Default::default() })
//!     .build_pairs([
//!         ("cat.jpg", vec![1.0, 0.0]),
//!         ("dog.jpg", vec![0.0, 1.0]),
//!     ])
//!     .unwrap();
//! let hits = forest.query(&[0.9, 0.1], 1, forest.default_search_budget(1)).unwrap();
//! assert_eq!(hits[0].id.as_str(), "cat.jpg");
//! ```

pub mod catalog;
pub mod config;
pub mod distance;
pub mod error;
pub mod eval;
pub mod forest;
pub mod persistence;
pub mod pipeline;
pub mod reduce;
pub mod serving;
pub mod simd;

// Re-exports
pub use config::EngineConfig;
pub use error::{Result, SearchError};
pub use forest::{CorpusItem, Forest, ForestBuilder, ForestParams, ItemId, Neighbor, QueryStats};
pub use persistence::IndexManifest;
pub use pipeline::{build_index, BuildParams, IndexArtifacts};
pub use reduce::ReducerModel;
pub use serving::{Embedder, SearchContext, SearchHit, Searcher};
