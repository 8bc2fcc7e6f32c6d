//! Document processing pipeline: cleaning, chunking, and the resumable orchestrator.

pub mod chunking;
mod orchestrator;
pub mod sanitize;
pub mod tokens;
pub mod types;

pub use chunking::ChunkingService;
pub use orchestrator::{OrchestratorSettings, PipelineComponents, PipelineOrchestrator};
pub use types::{
    ChunkRecord, ChunkingError, ChunkingMode, PipelineError, PipelineOutcome, VerificationReport,
};
