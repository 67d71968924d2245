//! Query pipeline orchestration

pub mod orchestrator;
pub mod state;

pub use orchestrator::{
    PipelineServices, QueryPipeline, RetrievalPolicy, GENERIC_ERROR_MESSAGE, STREAM_BUFFER,
};
pub use state::{QueryStage, StageTracker};
