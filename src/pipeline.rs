//! Offline index build: embeddings in, `reducer.bin` + `forest.bin` +
//! `manifest.json` out.
//!
//! ```text
//! raw embeddings ─ normalize ─▶ fit PCA ─▶ transform ─ normalize ─▶ build forest
//!                                   │                                    │
//!                                   ▼                                    ▼
//!                              reducer.bin                           forest.bin
//!                                            manifest.json (last)
//! ```
//!
//! Every step short-circuits on error. Saving over a live index replaces the
//! three files one at a time, so an interrupted save can leave a new reducer
//! next to an old forest; the manifest's artifact checksums make
//! [`IndexArtifacts::load`] reject such a directory instead of serving it, and
//! a running [`Searcher`](crate::Searcher) keeps its previous context.

use crate::catalog;
use crate::distance::normalize;
use crate::error::{Result, SearchError};
use crate::forest::{CorpusItem, Forest, ForestBuilder, ForestParams, ItemId};
use crate::persistence::{self, format, IndexManifest};
use crate::reduce::ReducerModel;
use crate::serving::{Embedder, SearchContext};
use rayon::prelude::*;
use std::path::Path;

/// Parameters for [`build_index`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildParams {
    /// Target dimension `D` of the PCA reduction.
    pub dimension: usize,
    pub forest: ForestParams,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            dimension: 100,
            forest: ForestParams::default(),
        }
    }
}

/// A reducer, the forest built with it, and the manifest describing both.
#[derive(Clone, Debug)]
pub struct IndexArtifacts {
    pub reducer: ReducerModel,
    pub forest: Forest,
    pub manifest: IndexManifest,
}

/// Fit a reducer on `corpus`, compress it, and build a forest over the result.
///
/// Raw vectors are normalized before fitting and every compressed vector is
/// normalized again before indexing.
///
/// # Errors
///
/// - [`SearchError::EmptyCorpus`] for an empty corpus
/// - [`SearchError::RankDeficiency`] if `corpus.len() < params.dimension`
/// - any error from [`ReducerModel::fit`] or [`ForestBuilder::build`]
pub fn build_index(corpus: Vec<(ItemId, Vec<f32>)>, params: &BuildParams) -> Result<IndexArtifacts> {
    if corpus.is_empty() {
        return Err(SearchError::EmptyCorpus);
    }
    tracing::info!(
        items = corpus.len(),
        dimension = params.dimension,
        trees = params.forest.num_trees,
        "building index"
    );

    let (ids, raw): (Vec<ItemId>, Vec<Vec<f32>>) = corpus
        .into_iter()
        .map(|(id, v)| (id, normalize(&v)))
        .unzip();

    let reducer = ReducerModel::fit(&raw, params.dimension)?;
    let compressed = reducer.transform_batch(&raw)?;
    drop(raw);

    let items = ids
        .into_iter()
        .zip(compressed)
        .map(|(id, v)| CorpusItem::new(id, normalize(&v)))
        .collect();
    let forest = ForestBuilder::new(params.forest.clone()).build(items)?;
    let manifest = IndexManifest::describe(&reducer, &forest);

    tracing::info!(
        items = forest.len(),
        explained = manifest.explained_variance_ratio,
        bytes = forest.size_bytes(),
        "index built"
    );
    Ok(IndexArtifacts {
        reducer,
        forest,
        manifest,
    })
}

/// Embed every image under `root`; ids are the images' relative asset paths.
pub fn embed_corpus(root: &Path, embedder: &dyn Embedder) -> Result<Vec<(ItemId, Vec<f32>)>> {
    let paths = catalog::discover_images(root)?;
    tracing::info!(root = %root.display(), images = paths.len(), "embedding corpus");
    paths
        .par_iter()
        .map(|path| {
            let id = catalog::item_id(root, path)?;
            let bytes = std::fs::read(path)?;
            let vector = embedder.embed(&bytes)?;
            if vector.len() != embedder.dimension() {
                return Err(SearchError::DimensionMismatch {
                    expected: embedder.dimension(),
                    actual: vector.len(),
                });
            }
            Ok((id, vector))
        })
        .collect()
}

impl IndexArtifacts {
    /// Persist into `dir` (created if missing). The manifest is written last
    /// and records the checksum of the exact bytes written for each artifact.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let reducer_bytes = persistence::reducer_to_bytes(&self.reducer);
        let forest_bytes = persistence::forest_to_bytes(&self.forest);
        let manifest = IndexManifest {
            reducer_checksum: format::artifact_checksum(&reducer_bytes),
            forest_checksum: format::artifact_checksum(&forest_bytes),
            ..self.manifest.clone()
        };
        persistence::atomic_write(&dir.join(format::REDUCER_FILE), &reducer_bytes)?;
        persistence::atomic_write(&dir.join(format::FOREST_FILE), &forest_bytes)?;
        persistence::atomic_write(&dir.join(format::MANIFEST_FILE), manifest.to_json()?.as_bytes())?;
        tracing::info!(dir = %dir.display(), "index saved");
        Ok(())
    }

    /// Load and cross-check an index directory written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// [`SearchError::CorruptIndex`] if any artifact is malformed or the
    /// manifest disagrees with the artifacts, including a reducer and forest
    /// of identical shape that come from different builds.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest =
            IndexManifest::from_json(&std::fs::read_to_string(dir.join(format::MANIFEST_FILE))?)?;
        let reducer = persistence::load_reducer(dir.join(format::REDUCER_FILE))?;
        let forest = persistence::load_forest(dir.join(format::FOREST_FILE))?;
        manifest.check(&reducer, &forest)?;
        tracing::info!(
            dir = %dir.display(),
            items = forest.len(),
            trees = forest.num_trees(),
            "index loaded"
        );
        Ok(Self {
            reducer,
            forest,
            manifest,
        })
    }

    /// Wrap the artifacts for serving.
    pub fn into_context(self) -> Result<SearchContext> {
        SearchContext::new(self.reducer, self.forest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::clustered_unit_dataset;

    fn params() -> BuildParams {
        BuildParams {
            dimension: 4,
            forest: ForestParams {
                num_trees: 3,
                leaf_size: 4,
                ..ForestParams::default()
            },
        }
    }

    #[test]
    fn build_produces_consistent_artifacts() {
        let data = clustered_unit_dataset(60, 0, 12, 3, 0.3, 5);
        let artifacts = build_index(data.corpus(), &params()).unwrap();
        assert_eq!(artifacts.reducer.input_dim(), 12);
        assert_eq!(artifacts.reducer.output_dim(), 4);
        assert_eq!(artifacts.forest.dimension(), 4);
        assert_eq!(artifacts.forest.len(), 60);
        artifacts
            .manifest
            .check(&artifacts.reducer, &artifacts.forest)
            .unwrap();
        for i in 0..60 {
            let v = artifacts.forest.vector(i).unwrap();
            assert!(crate::distance::is_unit(v, 1e-4));
        }
    }

    #[test]
    fn empty_and_tiny_corpora_fail() {
        assert!(matches!(
            build_index(Vec::new(), &params()),
            Err(SearchError::EmptyCorpus)
        ));
        let tiny = vec![
            (ItemId::from("a"), vec![1.0; 12]),
            (ItemId::from("b"), vec![0.5; 12]),
        ];
        assert!(matches!(
            build_index(tiny, &params()),
            Err(SearchError::RankDeficiency {
                samples: 2,
                required: 4
            })
        ));
    }

    #[test]
    fn failed_save_leaves_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let data = clustered_unit_dataset(30, 0, 6, 2, 0.3, 1);
        let artifacts = build_index(data.corpus(), &params()).unwrap();
        // A directory squatting on the forest path makes the rename fail.
        std::fs::create_dir_all(dir.path().join(format::FOREST_FILE).join("x")).unwrap();
        assert!(artifacts.save(dir.path()).is_err());
        assert!(!dir.path().join(format::MANIFEST_FILE).exists());
    }
}
