//! Text preparation: chunking for the API limit and cleanup of model output

pub mod chunker;
pub mod repetition;
