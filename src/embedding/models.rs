use super::EmbeddingError;

const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
    ("nomic-embed-text", 768),
    ("mxbai-embed-large", 1024),
    ("all-minilm", 384),
    ("bge-m3", 1024),
    ("snowflake-arctic-embed", 1024),
];

/// Vector dimension produced by `model`.
///
/// Ollama's implicit `:latest` tag is ignored.
pub fn dimension_for(model: &str) -> Result<usize, EmbeddingError> {
    let normalized = model.trim();
    let normalized = normalized.strip_suffix(":latest").unwrap_or(normalized);
    MODEL_DIMENSIONS
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, dimension)| *dimension)
        .ok_or_else(|| EmbeddingError::UnsupportedModel(model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_resolve() {
        assert_eq!(dimension_for("text-embedding-3-small").unwrap(), 1536);
        assert_eq!(dimension_for("text-embedding-3-large").unwrap(), 3072);
        assert_eq!(dimension_for("nomic-embed-text:latest").unwrap(), 768);
    }

    #[test]
    fn unknown_models_fail() {
        assert!(matches!(
            dimension_for("mystery-model"),
            Err(EmbeddingError::UnsupportedModel(name)) if name == "mystery-model"
        ));
    }
}
