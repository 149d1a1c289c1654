use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::tree::ConfigNode;

/// Errors that can occur while writing JSON from a [`ConfigNode`] tree.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to serialize JSON bytes.
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Failed to write output file.
    #[error("failed to write JSON file: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a [`ConfigNode`] tree into indented JSON bytes.
pub fn write(node: &ConfigNode) -> Result<Vec<u8>, WriteError> {
    Ok(serde_json::to_vec_pretty(node)?)
}

/// Serialize a [`ConfigNode`] tree and write it to `path`.
pub fn write_file(node: &ConfigNode, path: &Path) -> Result<(), WriteError> {
    let bytes = write(node)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Serialize a tree into indented JSON text.
pub fn to_pretty_json(node: &ConfigNode) -> Result<String, WriteError> {
    Ok(serde_json::to_string_pretty(node)?)
}

/// Serialize a tree into compact JSON with map keys in sorted order.
///
/// Two trees that compare equal always produce the same string.
pub fn to_canonical_json(node: &ConfigNode) -> Result<String, WriteError> {
    Ok(serde_json::to_string(node)?)
}
