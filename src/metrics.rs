use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_completed: AtomicU64,
    documents_failed: AtomicU64,
    chunks_indexed: AtomicU64,
    provider_tokens: AtomicU64,
    embeddings_regenerated: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that reached `COMPLETED` and the number of chunks it holds.
    pub fn record_completed(&self, chunk_count: u64) {
        self.documents_completed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a failed pipeline run.
    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record provider-reported token usage.
    pub fn record_tokens(&self, total_tokens: u64) {
        self.provider_tokens
            .fetch_add(total_tokens, Ordering::Relaxed);
    }

    /// Record that embeddings had to be regenerated on resume before indexing.
    pub fn record_regenerated(&self) {
        self.embeddings_regenerated.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_completed: self.documents_completed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            provider_tokens: self.provider_tokens.load(Ordering::Relaxed),
            embeddings_regenerated: self.embeddings_regenerated.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that completed all four stages since startup.
    pub documents_completed: u64,
    /// Pipeline runs that ended in failure (one per attempt).
    pub documents_failed: u64,
    /// Total chunks indexed across completed documents.
    pub chunks_indexed: u64,
    /// Tokens reported by the embedding provider.
    pub provider_tokens: u64,
    /// Resumed runs that re-embedded stored chunks before indexing.
    pub embeddings_regenerated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_completed(2);
        metrics.record_completed(3);
        metrics.record_failed();
        metrics.record_tokens(40);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_completed, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.provider_tokens, 40);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
