//! Forest serialization.

use super::codec::{Decoder, Encoder};
use super::format::{FORMAT_VERSION, FOREST_MAGIC, TAG_INTERNAL, TAG_LEAF};
use crate::error::{Result, SearchError};
use crate::forest::{Forest, ItemId, Node, Tree};
use std::path::Path;

/// Encode a forest in the `LKFR` format.
pub fn forest_to_bytes(forest: &Forest) -> Vec<u8> {
    let mut enc = Encoder::new(FOREST_MAGIC, FORMAT_VERSION, forest.size_bytes());
    enc.count(forest.num_trees());
    enc.count(forest.dimension());
    enc.count(forest.leaf_size());
    enc.u64(forest.seed());
    enc.count(forest.len());

    for id in forest.ids() {
        enc.str(id.as_str());
    }
    enc.f32s(&forest.vectors);

    for tree in forest.trees() {
        enc.u32(tree.root());
        enc.count(tree.nodes().len());
        for node in tree.nodes() {
            match node {
                Node::Leaf { items } => {
                    enc.u8(TAG_LEAF);
                    enc.count(items.len());
                    for &item in items {
                        enc.u32(item);
                    }
                }
                Node::Internal {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    enc.u8(TAG_INTERNAL);
                    enc.f32s(normal);
                    enc.f32(*offset);
                    enc.u32(*left);
                    enc.u32(*right);
                }
            }
        }
    }
    enc.finish()
}

/// Decode and validate an `LKFR` forest.
///
/// # Errors
///
/// [`SearchError::CorruptIndex`] on bad magic, version, or checksum,
/// truncation, trailing bytes, or any structural violation
/// (see [`Forest::from_parts`]).
pub fn forest_from_bytes(bytes: &[u8]) -> Result<Forest> {
    let mut dec = Decoder::open(bytes, "forest", FOREST_MAGIC, FORMAT_VERSION)?;
    let num_trees = dec.count()?;
    let dimension = dec.count()?;
    let leaf_size = dec.count()?;
    let seed = dec.u64()?;
    let n = dec.count()?;
    if dimension == 0 {
        return Err(SearchError::corrupt("forest: dimension is zero"));
    }

    // Each id costs at least its length prefix.
    dec.expect_at_least(n, 4)?;
    let ids = (0..n)
        .map(|_| dec.string().map(ItemId::from))
        .collect::<Result<Vec<_>>>()?;

    let count = n
        .checked_mul(dimension)
        .ok_or_else(|| SearchError::corrupt("forest: vector table overflows"))?;
    let vectors = dec.f32s(count)?;

    // root + node count per tree
    dec.expect_at_least(num_trees, 8)?;
    let mut trees = Vec::with_capacity(num_trees);
    for _ in 0..num_trees {
        trees.push(read_tree(&mut dec, dimension)?);
    }
    dec.finish()?;

    Forest::from_parts(dimension, leaf_size, seed, ids, vectors, trees)
}

fn read_tree(dec: &mut Decoder<'_>, dimension: usize) -> Result<Tree> {
    let root = dec.u32()?;
    let count = dec.count()?;
    // Smallest node is an empty leaf: tag + count.
    dec.expect_at_least(count, 5)?;

    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let node = match dec.u8()? {
            TAG_LEAF => {
                let len = dec.count()?;
                dec.expect_at_least(len, 4)?;
                let items = (0..len).map(|_| dec.u32()).collect::<Result<Vec<_>>>()?;
                Node::Leaf { items }
            }
            TAG_INTERNAL => Node::Internal {
                normal: dec.f32s(dimension)?,
                offset: dec.f32()?,
                left: dec.u32()?,
                right: dec.u32()?,
            },
            tag => {
                return Err(SearchError::corrupt(format!("forest: unknown node tag {tag}")));
            }
        };
        nodes.push(node);
    }
    Ok(Tree { root, nodes })
}

/// Write a forest atomically to `path`.
pub fn save_forest(forest: &Forest, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = forest_to_bytes(forest);
    super::atomic_write(path, &bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "forest saved");
    Ok(())
}

/// Read and validate a forest from `path`.
pub fn load_forest(path: impl AsRef<Path>) -> Result<Forest> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let forest = forest_from_bytes(&bytes)?;
    tracing::debug!(
        path = %path.display(),
        items = forest.len(),
        trees = forest.num_trees(),
        "forest loaded"
    );
    Ok(forest)
}
