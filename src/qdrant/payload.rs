//! Point identifiers, collection names, and payload hashing.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic Qdrant point id for an application chunk id.
///
/// Qdrant accepts unsigned integers or UUIDs as keys. The first 16 bytes of SHA-256(chunk id)
/// are stamped with version 5 / RFC 4122 variant bits so the result is a well-formed UUID and
/// the same chunk id always maps to the same point.
pub fn point_id_for_chunk(chunk_id: &str) -> String {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x50;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes).to_string()
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Vector-store collection for an embedding model: `<prefix>_<model>` with the model reduced to
/// lowercase ASCII alphanumerics and underscores.
pub fn collection_name_for_model(prefix: &str, model: &str) -> String {
    let model = model.trim();
    let model = model.strip_suffix(":latest").unwrap_or(model);
    let sanitized: String = model
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", prefix.trim_end_matches('_'), sanitized)
}
