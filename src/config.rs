//! Engine configuration, loaded from a JSON file.
//!
//! ```json
//! {
//!   "corpus_root": "data/raw",
//!   "index_dir": "data/index",
//!   "static_prefix": "/static",
//!   "dimension": 100,
//!   "forest": { "num_trees": 100, "leaf_size": 16, "seed": 42 },
//!   "search_budget": 0,
//!   "default_k": 10
//! }
//! ```
//!
//! Every field is optional; missing fields take the [`Default`] values.

use crate::error::{Result, SearchError};
use crate::forest::ForestParams;
use crate::pipeline::BuildParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for building and serving an index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory scanned for images; item ids are relative to it.
    pub corpus_root: PathBuf,
    /// Where `reducer.bin`, `forest.bin` and `manifest.json` live.
    pub index_dir: PathBuf,
    /// URL prefix under which `corpus_root` is served.
    pub static_prefix: String,
    /// Target dimension of the PCA reduction.
    pub dimension: usize,
    pub forest: ForestParams,
    /// Minimum candidates gathered per query. The effective budget is
    /// `max(k * num_trees, search_budget)`.
    pub search_budget: usize,
    /// Result count used when a caller does not ask for one.
    pub default_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            corpus_root: PathBuf::from("data/raw"),
            index_dir: PathBuf::from("data/index"),
            static_prefix: "/static".to_string(),
            dimension: 100,
            forest: ForestParams::default(),
            search_budget: 0,
            default_k: 10,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)
            .map_err(|e| SearchError::config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Parse and validate a JSON config string.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| SearchError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(SearchError::config("dimension must be at least 1"));
        }
        if self.default_k == 0 {
            return Err(SearchError::config("default_k must be at least 1"));
        }
        self.forest.validate()?;
        Ok(())
    }

    /// Parameters for an offline build with this configuration.
    pub fn build_params(&self) -> BuildParams {
        BuildParams {
            dimension: self.dimension,
            forest: self.forest.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_all_defaults() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_forest_section_keeps_other_defaults() {
        let config =
            EngineConfig::from_json(r#"{"dimension": 64, "forest": {"num_trees": 10}}"#).unwrap();
        assert_eq!(config.dimension, 64);
        assert_eq!(config.forest.num_trees, 10);
        assert_eq!(config.forest.leaf_size, ForestParams::default().leaf_size);
        assert_eq!(config.static_prefix, "/static");
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for json in [
            r#"{"dimension": 0}"#,
            r#"{"forest": {"num_trees": 0}}"#,
            r#"{"forest": {"leaf_size": 4294967296}}"#,
            r#"{"forest": {"threads": 0}}"#,
            r#"{"default_k": 0}"#,
            r#"{"dimensoin": 10}"#,
            "not json",
        ] {
            assert!(
                matches!(EngineConfig::from_json(json), Err(SearchError::Config(_))),
                "{json}"
            );
        }
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"static_prefix": "/img", "search_budget": 500}"#).unwrap();
        let config = EngineConfig::from_path(&path).unwrap();
        assert_eq!(config.static_prefix, "/img");
        assert_eq!(config.search_budget, 500);
        assert_eq!(config.build_params().dimension, 100);
    }
}
