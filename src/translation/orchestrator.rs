//! Page-level translation: chunk, translate concurrently, reassemble

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::core::client::{TranslationBackend, TranslationClient};
use crate::core::config::PipelineConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{billable_chars, CostEstimate, Language, TranslationOptions};
use crate::text::chunker::{rejoin, Chunk, Chunker};

/// Which languages a page goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePlan {
    pub source: Language,
    /// Tamil is translated from the English result instead of the source
    pub two_step: bool,
}

impl LanguagePlan {
    /// Source → English → Tamil
    pub fn two_step(source: Language) -> Self {
        Self {
            source,
            two_step: true,
        }
    }

    /// Source → English and Source → Tamil
    pub fn direct(source: Language) -> Self {
        Self {
            source,
            two_step: false,
        }
    }

    /// Language and text the Tamil stage reads from
    pub fn tamil_input<'a>(&self, source_text: &'a str, english_text: &'a str) -> (Language, &'a str) {
        if self.two_step && self.source != Language::English {
            (Language::English, english_text)
        } else {
            (self.source, source_text)
        }
    }
}

/// Result of translating one text in one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTranslation {
    pub text: String,
    pub source_lang: Language,
    pub target_lang: Language,
    pub chunks: usize,
    pub billed_chars: u64,
    pub cost_inr: f64,
    pub retries: u32,
    pub repetition_truncations: u32,
}

/// Both outputs of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTranslation {
    pub english: StageTranslation,
    pub tamil: StageTranslation,
    pub cost_inr: f64,
}

impl PageTranslation {
    pub fn english_text(&self) -> &str {
        &self.english.text
    }

    pub fn tamil_text(&self) -> &str {
        &self.tamil.text
    }
}

/// Drives chunked, concurrent translation of page text
#[derive(Debug)]
pub struct TranslationOrchestrator<B> {
    client: TranslationClient<B>,
    chunker: Chunker,
    max_workers: usize,
    options: TranslationOptions,
}

impl<B: TranslationBackend> TranslationOrchestrator<B> {
    pub fn new(
        client: TranslationClient<B>,
        chunker: Chunker,
        max_workers: usize,
        options: TranslationOptions,
    ) -> Self {
        Self {
            client,
            chunker,
            max_workers: max_workers.max(1),
            options,
        }
    }

    /// Build the client and chunker from configuration
    pub fn from_config(backend: B, config: &PipelineConfig) -> anyhow::Result<Self> {
        let client = TranslationClient::new(backend, config.retry_policy(), config.cost_rate());
        Ok(Self::new(
            client,
            Chunker::new(config.max_chunk_size),
            config.max_workers,
            config.translation_options()?,
        ))
    }

    pub fn client(&self) -> &TranslationClient<B> {
        &self.client
    }

    /// Exact cost of translating `text`, using the same chunking as [`Self::translate_text`]
    pub fn estimate(&self, text: &str) -> CostEstimate {
        let (chunks, chars) = self
            .chunker
            .split(text)
            .fold((0, 0), |(n, chars), chunk| (n + 1, chars + billable_chars(chunk.text)));

        CostEstimate {
            chunks,
            chars,
            cost_inr: self.client.rate().cost_of(chars),
        }
    }

    /// Translate a whole text in one direction.
    ///
    /// All chunks run concurrently, bounded by `max_workers`. If any chunk
    /// fails the whole stage fails.
    pub async fn translate_text(
        &self,
        text: &str,
        source_lang: Language,
        target_lang: Language,
    ) -> Result<StageTranslation> {
        if source_lang == target_lang {
            return Ok(StageTranslation {
                text: text.trim().to_string(),
                source_lang,
                target_lang,
                chunks: 0,
                billed_chars: 0,
                cost_inr: 0.0,
                retries: 0,
                repetition_truncations: 0,
            });
        }

        let start_time = Instant::now();
        let chunks: Vec<Chunk<'_>> = self.chunker.split(text).collect();
        info!(
            "Translating {} chars in {} chunks ({} → {})",
            text.chars().count(),
            chunks.len(),
            source_lang,
            target_lang
        );

        let client = &self.client;
        let options = &self.options;
        let mut pending = stream::iter(chunks.iter().copied())
            .map(|chunk| async move {
                let result = client
                    .translate(chunk.index, chunk.text, source_lang, target_lang, options.clone())
                    .await;
                (chunk.index, result)
            })
            .buffer_unordered(self.max_workers);

        let mut results = Vec::with_capacity(chunks.len());
        let mut errors = Vec::new();
        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(result) => results.push(result),
                // Dropping the stream cancels the chunks still in flight
                Err(e) if e.is_fatal_for_job() => {
                    error!("Chunk {} failed fatally, abandoning the stage: {}", index, e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Chunk {} translation failed: {}", index, e);
                    errors.push((index, e));
                }
            }
        }

        if !errors.is_empty() {
            let failed_chunks = errors.len();
            errors.sort_by_key(|(index, _)| *index);
            let (chunk_index, source) = errors.swap_remove(0);
            return Err(TranslationError::ChunkFailed {
                chunk_index,
                failed_chunks,
                source: Box::new(source),
            });
        }

        // Completion order is arbitrary; output order is not
        results.sort_by_key(|r| r.chunk_index);
        let translated = results;

        let billed_chars: u64 = translated.iter().map(|r| r.billed_chars).sum();
        let stage = StageTranslation {
            text: rejoin(
                translated
                    .iter()
                    .zip(&chunks)
                    .map(|(r, chunk)| (r.translation.as_str(), chunk.boundary)),
            ),
            source_lang,
            target_lang,
            chunks: translated.len(),
            billed_chars,
            cost_inr: self.client.rate().cost_of(billed_chars),
            retries: translated.iter().map(|r| r.retries).sum(),
            repetition_truncations: translated.iter().filter(|r| r.repetition_truncated).count() as u32,
        };

        debug!(
            "Stage {} → {} done: {} chunks, ₹{:.2}, {:?}",
            source_lang,
            target_lang,
            stage.chunks,
            stage.cost_inr,
            start_time.elapsed()
        );

        Ok(stage)
    }

    /// Translate a page to English and Tamil following `plan`
    pub async fn translate_page(&self, page_text: &str, plan: LanguagePlan) -> Result<PageTranslation> {
        let english = self
            .translate_text(page_text, plan.source, Language::English)
            .await?;

        let (tamil_source, tamil_input) = plan.tamil_input(page_text, &english.text);
        let tamil = self
            .translate_text(tamil_input, tamil_source, Language::Tamil)
            .await?;

        let cost_inr = english.cost_inr + tamil.cost_inr;
        Ok(PageTranslation {
            english,
            tamil,
            cost_inr,
        })
    }
}
