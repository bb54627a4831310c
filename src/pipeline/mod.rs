//! Page-by-page document pipeline

pub mod cancel;
pub mod orchestrator;

pub use cancel::CancellationToken;
pub use orchestrator::{
    resolve_page_range, CostReport, PipelineOrchestrator, PipelineReport, RunOptions,
};
