//! Concurrent page translation

pub mod orchestrator;

pub use orchestrator::{LanguagePlan, PageTranslation, StageTranslation, TranslationOrchestrator};
