//! Reducer serialization.

use super::codec::{Decoder, Encoder};
use super::format::{FORMAT_VERSION, REDUCER_MAGIC};
use crate::error::{Result, SearchError};
use crate::reduce::ReducerModel;
use std::path::Path;

/// Encode a reducer in the `LKRD` format.
pub fn reducer_to_bytes(model: &ReducerModel) -> Vec<u8> {
    let size = 4 * (model.mean().len() + model.components().len() + model.output_dim() + 3);
    let mut enc = Encoder::new(REDUCER_MAGIC, FORMAT_VERSION, size);
    enc.count(model.input_dim());
    enc.count(model.output_dim());
    enc.f32s(model.mean());
    enc.f32s(model.explained_variance());
    enc.f32(model.total_variance());
    enc.f32s(model.components());
    enc.finish()
}

/// Decode and validate an `LKRD` reducer.
pub fn reducer_from_bytes(bytes: &[u8]) -> Result<ReducerModel> {
    let mut dec = Decoder::open(bytes, "reducer", REDUCER_MAGIC, FORMAT_VERSION)?;
    let input_dim = dec.count()?;
    let output_dim = dec.count()?;
    if input_dim == 0 || output_dim == 0 || output_dim > input_dim {
        return Err(SearchError::corrupt(format!(
            "reducer: invalid shape {output_dim} x {input_dim}"
        )));
    }

    let mean = dec.f32s(input_dim)?;
    let explained_variance = dec.f32s(output_dim)?;
    let total_variance = dec.f32()?;
    let components = dec.f32s(output_dim * input_dim)?;
    dec.finish()?;

    ReducerModel::from_parts(mean, components, explained_variance, total_variance).map_err(
        |e| match e {
            SearchError::Config(msg) => SearchError::corrupt(format!("reducer: {msg}")),
            other => other,
        },
    )
}

/// Write a reducer atomically to `path`.
pub fn save_reducer(model: &ReducerModel, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    super::atomic_write(path, &reducer_to_bytes(model))?;
    tracing::debug!(path = %path.display(), "reducer saved");
    Ok(())
}

/// Read and validate a reducer from `path`.
pub fn load_reducer(path: impl AsRef<Path>) -> Result<ReducerModel> {
    let path = path.as_ref();
    let model = reducer_from_bytes(&std::fs::read(path)?)?;
    tracing::debug!(
        path = %path.display(),
        input_dim = model.input_dim(),
        output_dim = model.output_dim(),
        "reducer loaded"
    );
    Ok(model)
}
