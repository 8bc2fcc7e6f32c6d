#![deny(missing_docs)]

//! Resumable document ingestion: extraction, chunking, embedding, and Qdrant indexing.

/// HTTP routing and operator handlers.
pub mod api;
/// Blob storage for uploaded document bytes.
pub mod blob;
/// Environment-driven configuration management.
pub mod config;
/// Embedding service and provider adapters.
pub mod embedding;
/// Text extraction from stored bytes.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Chunking and the resumable pipeline orchestrator.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Queue transport, dispatcher, and consumer.
pub mod queue;
/// Operator-facing service.
pub mod service;
/// Relational record store.
pub mod store;
