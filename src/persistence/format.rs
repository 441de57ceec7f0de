//! On-disk layout of an index directory.
//!
//! # File Layout
//!
//! ```text
//! index/
//! ├── reducer.bin     # PCA projection (LKRD)
//! ├── forest.bin      # trees + item table (LKFR)
//! └── manifest.json   # written last; ties the two together
//! ```
//!
//! The manifest records the CRC32 of each artifact's exact bytes, so a
//! reducer and a forest from two different builds are rejected on load even
//! when every shape field agrees.
//!
//! # Forest Format
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ "LKFR" | version u32                    │
//! │ T u32 | D u32 | L u32 | seed u64 | N u32│
//! ├─────────────────────────────────────────┤
//! │ N × (len u32, UTF-8 id)                 │
//! ├─────────────────────────────────────────┤
//! │ N × D f32 item vectors                  │
//! ├─────────────────────────────────────────┤
//! │ T × (root u32, count u32, nodes)        │
//! │   leaf:     0u8, n u32, n × u32         │
//! │   internal: 1u8, D × f32, f32, u32, u32 │
//! ├─────────────────────────────────────────┤
//! │ CRC32 of all preceding bytes            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Reducer Format
//!
//! ```text
//! "LKRD" | version u32 | D_raw u32 | D u32
//! mean (D_raw f32) | explained variance (D f32) | total variance f32
//! components (D × D_raw f32, row-major) | CRC32
//! ```

use super::forest::forest_to_bytes;
use super::reducer::reducer_to_bytes;
use crate::error::{Result, SearchError};
use crate::forest::Forest;
use crate::reduce::ReducerModel;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Magic bytes for forest files.
pub const FOREST_MAGIC: &[u8; 4] = b"LKFR";

/// Magic bytes for reducer files.
pub const REDUCER_MAGIC: &[u8; 4] = b"LKRD";

/// Current format version (all three artifacts).
pub const FORMAT_VERSION: u32 = 1;

pub const REDUCER_FILE: &str = "reducer.bin";
pub const FOREST_FILE: &str = "forest.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

pub(crate) const TAG_LEAF: u8 = 0;
pub(crate) const TAG_INTERNAL: u8 = 1;

/// Manifest for the index directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Format version
    pub version: u32,
    /// Raw embedding dimension accepted by the reducer
    pub input_dim: usize,
    /// Compressed dimension stored in the forest
    pub dimension: usize,
    pub num_trees: usize,
    pub leaf_size: usize,
    pub seed: u64,
    pub num_items: usize,
    /// Fraction of training variance kept by the reducer
    pub explained_variance_ratio: f32,
    /// CRC32 of the encoded `reducer.bin`
    pub reducer_checksum: u32,
    /// CRC32 of the encoded `forest.bin`
    pub forest_checksum: u32,
    /// Creation timestamp (unix seconds)
    pub created_at: u64,
}

/// CRC32 over a whole encoded artifact (body and footer).
pub(crate) fn artifact_checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

impl IndexManifest {
    /// Describe a freshly built reducer/forest pair.
    pub fn describe(reducer: &ReducerModel, forest: &Forest) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: FORMAT_VERSION,
            input_dim: reducer.input_dim(),
            dimension: forest.dimension(),
            num_trees: forest.num_trees(),
            leaf_size: forest.leaf_size(),
            seed: forest.seed(),
            num_items: forest.len(),
            explained_variance_ratio: reducer.explained_variance_ratio(),
            reducer_checksum: artifact_checksum(&reducer_to_bytes(reducer)),
            forest_checksum: artifact_checksum(&forest_to_bytes(forest)),
            created_at,
        }
    }

    /// Check that loaded artifacts are the ones this manifest was written for.
    pub fn check(&self, reducer: &ReducerModel, forest: &Forest) -> Result<()> {
        let mismatch = |field: &str, recorded: String, found: String| {
            Err(SearchError::corrupt(format!(
                "manifest records {field} = {recorded}, artifacts have {found}"
            )))
        };

        if self.version != FORMAT_VERSION {
            return mismatch("version", self.version.to_string(), FORMAT_VERSION.to_string());
        }
        if self.input_dim != reducer.input_dim() {
            return mismatch(
                "input_dim",
                self.input_dim.to_string(),
                reducer.input_dim().to_string(),
            );
        }
        if self.dimension != reducer.output_dim() || self.dimension != forest.dimension() {
            return mismatch(
                "dimension",
                self.dimension.to_string(),
                format!("{} (reducer) / {} (forest)", reducer.output_dim(), forest.dimension()),
            );
        }
        if self.num_trees != forest.num_trees() {
            return mismatch(
                "num_trees",
                self.num_trees.to_string(),
                forest.num_trees().to_string(),
            );
        }
        if self.leaf_size != forest.leaf_size() {
            return mismatch(
                "leaf_size",
                self.leaf_size.to_string(),
                forest.leaf_size().to_string(),
            );
        }
        if self.seed != forest.seed() {
            return mismatch("seed", self.seed.to_string(), forest.seed().to_string());
        }
        if self.num_items != forest.len() {
            return mismatch("num_items", self.num_items.to_string(), forest.len().to_string());
        }

        // Encoding is deterministic, so re-encoding reproduces the saved bytes.
        let reducer_checksum = artifact_checksum(&reducer_to_bytes(reducer));
        if self.reducer_checksum != reducer_checksum {
            return mismatch(
                "reducer_checksum",
                format!("{:08x}", self.reducer_checksum),
                format!("{reducer_checksum:08x}"),
            );
        }
        let forest_checksum = artifact_checksum(&forest_to_bytes(forest));
        if self.forest_checksum != forest_checksum {
            return mismatch(
                "forest_checksum",
                format!("{:08x}", self.forest_checksum),
                format!("{forest_checksum:08x}"),
            );
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SearchError::corrupt(format!("manifest: {e}")))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| SearchError::corrupt(format!("manifest: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> IndexManifest {
        IndexManifest {
            version: FORMAT_VERSION,
            input_dim: 2048,
            dimension: 100,
            num_trees: 100,
            leaf_size: 16,
            seed: 42,
            num_items: 5000,
            explained_variance_ratio: 0.83,
            reducer_checksum: 0x1234_abcd,
            forest_checksum: 0xdead_beef,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn json_roundtrip() {
        let m = manifest();
        let json = m.to_json().unwrap();
        assert!(json.contains("\"num_trees\": 100"));
        assert_eq!(IndexManifest::from_json(&json).unwrap(), m);
    }

    #[test]
    fn check_compares_artifact_checksums() {
        let reducer = ReducerModel::from_parts(vec![0.0; 2], vec![1.0, 0.0], vec![1.0], 1.0).unwrap();
        let forest = Forest::from_parts(
            1,
            4,
            7,
            vec!["a".into()],
            vec![1.0],
            vec![crate::forest::Tree {
                root: 0,
                nodes: vec![crate::forest::Node::Leaf { items: vec![0] }],
            }],
        )
        .unwrap();
        let m = IndexManifest::describe(&reducer, &forest);
        m.check(&reducer, &forest).unwrap();

        // Same shape, different projection.
        let other = ReducerModel::from_parts(vec![0.0; 2], vec![0.0, 1.0], vec![1.0], 1.0).unwrap();
        let err = m.check(&other, &forest).unwrap_err();
        assert!(err.to_string().contains("reducer_checksum"), "{err}");
    }

    #[test]
    fn garbage_json_is_corrupt() {
        assert!(matches!(
            IndexManifest::from_json("{\"version\": 1"),
            Err(SearchError::CorruptIndex(_))
        ));
    }
}
