use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// One record of a collection as it moves through the pipeline.
///
/// The payload is carried as raw JSON bytes and is never parsed or reshaped
/// between source and sink; only `collection` and `id` are ever inspected.
/// On disk a document is one newline-terminated JSON object with exactly
/// these three fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Name of the index the record belongs to.
    pub collection: String,
    /// Stable external identifier, unique within the collection. Writes keyed
    /// on it are idempotent upserts.
    pub id: String,
    /// The record body, passed through untouched.
    pub payload: Box<RawValue>,
}

impl Document {
    /// Number of payload bytes, used for byte-based progress accounting.
    pub fn payload_len(&self) -> u64 {
        self.payload.get().len() as u64
    }
}
