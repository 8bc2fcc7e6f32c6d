//! Filter helpers for scoping Qdrant queries to collections and documents.

use serde_json::{Value, json};

use super::types::SearchFilterArgs;

/// Compose the standard Qdrant filter payload from optional search arguments.
pub fn build_search_filter(args: &SearchFilterArgs) -> Option<Value> {
    let mut must: Vec<Value> = Vec::new();

    if let Some(collection_id) = args.collection_id.as_deref().and_then(non_empty) {
        must.push(match_value("collectionId", collection_id));
    }

    if let Some(document_id) = args.document_id.as_deref().and_then(non_empty) {
        must.push(match_value("documentId", document_id));
    }

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

/// Filter matching every point that belongs to `document_id`.
pub fn document_filter(document_id: &str) -> Value {
    json!({ "must": [match_value("documentId", document_id)] })
}

fn match_value(key: &str, value: &str) -> Value {
    json!({
        "key": key,
        "match": { "value": value }
    })
}

fn non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
