//! Mutation patch generation.

use serde::Serialize;

use crate::error::{Error, Result};

/// Diff the pre-mutation object against the mutated one.
///
/// Both sides go through the same encoding, so fields the type drops on
/// decode (explicit nulls, unknown keys) never show up as removals. The
/// patch is empty when both encode to the same document.
pub fn create_patch<K: Serialize>(original: &K, mutated: &K) -> Result<json_patch::Patch> {
    let original = serde_json::to_value(original)
        .map_err(|e| Error::Patch(format!("original object cannot be encoded: {e}")))?;
    let mutated = serde_json::to_value(mutated)
        .map_err(|e| Error::Patch(format!("mutated object cannot be encoded: {e}")))?;

    Ok(json_patch::diff(&original, &mutated))
}
