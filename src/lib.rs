//! Tamil Translate - resumable OCR and translation of Devanagari PDFs
//!
//! Scanned Sanskrit or Hindi pages are recognized with tesseract, translated
//! to English and Tamil in bounded chunks, and every completed stage is
//! persisted so interrupted runs resume without paying twice.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod pipeline;
pub mod processors;
pub mod state;
pub mod text;
pub mod translation;

// Re-export key types for convenience
pub use crate::core::{
    client::{SarvamBackend, TranslationBackend, TranslationClient},
    config::PipelineConfig,
    errors::{PipelineError, StateError, TranslationError},
    models::{Language, TranslationOptions, TranslationResult},
};

pub use pipeline::{CancellationToken, CostReport, PipelineOrchestrator, PipelineReport, RunOptions};
pub use state::{DocumentState, PageState, StateStore};
pub use text::{chunker::Chunker, repetition::RepetitionGuard};
pub use translation::{LanguagePlan, TranslationOrchestrator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
