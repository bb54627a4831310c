//! Resumable OCR → English → Tamil pipeline over one PDF
//!
//! Pages run one at a time. Each completed stage is persisted before the
//! next one starts, so a crash or Ctrl-C loses at most the stage in flight.

use indicatif::ProgressBar;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::config::PipelineConfig;
use crate::core::cost_tracker::CostTracker;
use crate::core::client::TranslationBackend;
use crate::core::errors::{PipelineError, TranslationError};
use crate::core::models::{CostEstimate, Language};
use crate::pipeline::cancel::CancellationToken;
use crate::processors::ocr::OcrEngine;
use crate::processors::render::DocumentRenderer;
use crate::state::store::{
    DocumentState, FailureKind, LoadOutcome, StageResult, StateStore,
};
use crate::translation::orchestrator::{LanguagePlan, StageTranslation, TranslationOrchestrator};

/// Per-run knobs
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Inclusive, 1-indexed; `None` means the first `default_pages`
    pub page_range: Option<(u32, u32)>,
    pub default_pages: u32,
    pub resume: bool,
    /// Re-evaluate quality-gate failures against the current threshold
    pub retry_failed: bool,
    pub min_confidence: f64,
    pub plan: LanguagePlan,
    pub budget_inr: Option<f64>,
    pub output_dir: PathBuf,
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let plan = if config.two_step_tamil {
            LanguagePlan::two_step(config.source_language)
        } else {
            LanguagePlan::direct(config.source_language)
        };

        Self {
            page_range: None,
            default_pages: config.default_test_pages,
            resume: config.resume,
            retry_failed: config.retry_failed,
            min_confidence: config.min_ocr_confidence,
            plan,
            budget_inr: config.max_cost_inr,
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn with_page_range(mut self, range: Option<(u32, u32)>) -> Self {
        self.page_range = range;
        self
    }
}

/// Outcome of a real run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub pdf_path: PathBuf,
    pub page_range: (u32, u32),
    /// Pages that reached `done` in this run
    pub pages_completed: usize,
    /// Pages left failed after this run
    pub pages_failed: usize,
    /// Pages already done before this run
    pub pages_skipped: usize,
    pub run_cost_inr: f64,
    /// All recorded spend for the document, across runs
    pub total_cost_inr: f64,
    pub repetition_truncations: u32,
    pub cancelled: bool,
    pub budget_exhausted: bool,
    pub outputs: Vec<(Language, PathBuf)>,
    pub elapsed_secs: f64,
}

/// Outcome of a dry run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub pdf_path: PathBuf,
    pub page_range: (u32, u32),
    pub pages_estimated: usize,
    pub pages_already_done: usize,
    /// Pages without usable OCR (failed gate or OCR error)
    pub pages_unavailable: usize,
    pub english: CostEstimate,
    pub tamil: CostEstimate,
    pub total_inr: f64,
    /// False when OCR text stood in for English text that does not exist yet
    pub exact: bool,
    pub budget_inr: Option<f64>,
    pub cancelled: bool,
}

impl CostReport {
    pub fn within_budget(&self) -> bool {
        self.budget_inr.map_or(true, |b| self.total_inr <= b + 1e-9)
    }
}

enum PageOutcome {
    Completed,
    AlreadyDone,
    Failed,
    Cancelled,
    BudgetExhausted,
}

enum OcrStatus {
    Ready(String),
    Unavailable,
}

/// Drives pages through OCR, English and Tamil with persisted progress
pub struct PipelineOrchestrator<B, O, R> {
    translator: TranslationOrchestrator<B>,
    ocr: O,
    renderer: R,
    store: StateStore,
    options: RunOptions,
    progress: ProgressBar,
    tracker: Option<CostTracker>,
}

impl<B, O, R> PipelineOrchestrator<B, O, R>
where
    B: TranslationBackend,
    O: OcrEngine,
    R: DocumentRenderer,
{
    pub fn new(
        translator: TranslationOrchestrator<B>,
        ocr: O,
        renderer: R,
        store: StateStore,
        options: RunOptions,
    ) -> Self {
        Self {
            translator,
            ocr,
            renderer,
            store,
            options,
            progress: ProgressBar::hidden(),
            tracker: None,
        }
    }

    /// Share spend (and the budget) with other runs, e.g. across a batch
    pub fn with_cost_tracker(mut self, tracker: CostTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Report page progress on `bar`
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn translator(&self) -> &TranslationOrchestrator<B> {
        &self.translator
    }

    /// Process the configured page range of `pdf`
    pub async fn run(&self, pdf: &Path, cancel: &CancellationToken) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let (mut state, range) = self.prepare(pdf).await?;
        let tracker = self
            .tracker
            .clone()
            .unwrap_or_else(|| CostTracker::new(self.options.budget_inr));
        let spent_before = tracker.spent().await;

        info!(
            "Processing {} pages {}-{} ({} pending)",
            pdf.display(),
            range.0,
            range.1,
            state.pending_pages().len()
        );
        self.progress.set_length((range.1 - range.0 + 1) as u64);

        let mut report = PipelineReport {
            pdf_path: pdf.to_path_buf(),
            page_range: range,
            pages_completed: 0,
            pages_failed: 0,
            pages_skipped: 0,
            run_cost_inr: 0.0,
            total_cost_inr: 0.0,
            repetition_truncations: 0,
            cancelled: false,
            budget_exhausted: false,
            outputs: Vec::new(),
            elapsed_secs: 0.0,
        };
        let mut worked = false;

        for page in range.0..=range.1 {
            if cancel.is_cancelled() {
                warn!("Cancelled before page {}", page);
                report.cancelled = true;
                break;
            }
            self.progress.set_message(format!("page {}", page));

            let page_started = Instant::now();
            let outcome = self
                .process_page(&mut state, pdf, page, &tracker, cancel, &mut report.repetition_truncations)
                .await?;
            if !matches!(outcome, PageOutcome::AlreadyDone) {
                state.add_processing_time(page, page_started.elapsed().as_secs_f64());
                worked = true;
            }

            match outcome {
                PageOutcome::Completed => report.pages_completed += 1,
                PageOutcome::AlreadyDone => report.pages_skipped += 1,
                PageOutcome::Failed => report.pages_failed += 1,
                PageOutcome::Cancelled => {
                    warn!("Cancelled during page {}", page);
                    report.cancelled = true;
                    break;
                }
                PageOutcome::BudgetExhausted => {
                    report.budget_exhausted = true;
                    break;
                }
            }
            self.progress.inc(1);
        }

        if worked {
            self.store.save(&mut state)?;
        }
        self.progress.finish_and_clear();

        report.outputs = self.render_outputs(&state, pdf, range).await?;
        report.run_cost_inr = tracker.spent().await - spent_before;
        report.total_cost_inr = state.total_cost();
        report.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            "Run finished: {} completed, {} failed, {} skipped, ₹{:.2} this run (₹{:.2} total)",
            report.pages_completed,
            report.pages_failed,
            report.pages_skipped,
            report.run_cost_inr,
            report.total_cost_inr
        );
        Ok(report)
    }

    /// Estimate the remaining translation cost without calling the API.
    ///
    /// Missing OCR is still run and persisted.
    pub async fn dry_run(&self, pdf: &Path, cancel: &CancellationToken) -> Result<CostReport, PipelineError> {
        let (mut state, range) = self.prepare(pdf).await?;
        let plan = self.options.plan;

        let mut report = CostReport {
            pdf_path: pdf.to_path_buf(),
            page_range: range,
            pages_estimated: 0,
            pages_already_done: 0,
            pages_unavailable: 0,
            english: CostEstimate::default(),
            tamil: CostEstimate::default(),
            total_inr: 0.0,
            exact: true,
            budget_inr: self.options.budget_inr,
            cancelled: false,
        };

        for page in range.0..=range.1 {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if state.page(page).is_some_and(|p| p.is_fully_completed()) {
                report.pages_already_done += 1;
                continue;
            }

            let ocr_text = match self.ensure_ocr(&mut state, pdf, page).await? {
                OcrStatus::Ready(text) => text,
                OcrStatus::Unavailable => {
                    report.pages_unavailable += 1;
                    continue;
                }
            };

            let (english_done, english_text, tamil_done) = match state.page(page) {
                Some(p) => (p.english_completed, p.english_text.clone(), p.tamil_completed),
                None => (false, None, false),
            };

            if !english_done {
                report.english = report.english.add(&self.translator.estimate(&ocr_text));
            }
            if !tamil_done {
                let english_for_tamil = match english_text {
                    Some(text) => text,
                    None => {
                        if plan.two_step {
                            report.exact = false;
                        }
                        ocr_text.clone()
                    }
                };
                let (_, input) = plan.tamil_input(&ocr_text, &english_for_tamil);
                report.tamil = report.tamil.add(&self.translator.estimate(input));
            }
            report.pages_estimated += 1;
        }

        report.total_inr = report.english.cost_inr + report.tamil.cost_inr;
        info!(
            "Dry run: {} pages to translate, estimated ₹{:.2} (English ₹{:.2}, Tamil ₹{:.2}{})",
            report.pages_estimated,
            report.total_inr,
            report.english.cost_inr,
            report.tamil.cost_inr,
            if report.exact { "" } else { ", Tamil approximated" }
        );
        Ok(report)
    }

    /// Load or create state and settle the page range
    async fn prepare(&self, pdf: &Path) -> Result<(DocumentState, (u32, u32)), PipelineError> {
        let total_pages = self.ocr.page_count(pdf).await?;
        let range = resolve_page_range(self.options.page_range, total_pages, self.options.default_pages)?;

        let outcome = if self.options.resume {
            self.store.inspect(pdf)?
        } else {
            if self.store.clear(pdf)? {
                info!("Starting fresh: previous state removed");
            }
            LoadOutcome::NotFound
        };

        let state = match outcome {
            LoadOutcome::Found(mut state) => {
                if state.page_range() != range || state.total_pages != total_pages {
                    info!(
                        "Page range changed from {:?} to {:?}; keeping existing page progress",
                        state.page_range(),
                        range
                    );
                    state.set_page_range(range);
                    state.total_pages = total_pages;
                    self.store.save(&mut state)?;
                }
                state
            }
            LoadOutcome::Stale {
                state,
                current_checksum,
            } => {
                return Err(PipelineError::StaleState {
                    path: pdf.to_path_buf(),
                    recorded: state.pdf_checksum,
                    current: current_checksum,
                });
            }
            LoadOutcome::NotFound => self.store.create(pdf, total_pages, range)?,
        };

        Ok((state, range))
    }

    async fn process_page(
        &self,
        state: &mut DocumentState,
        pdf: &Path,
        page: u32,
        tracker: &CostTracker,
        cancel: &CancellationToken,
        truncations: &mut u32,
    ) -> Result<PageOutcome, PipelineError> {
        if state.page(page).is_some_and(|p| p.is_fully_completed()) {
            debug!("Page {} already done", page);
            return Ok(PageOutcome::AlreadyDone);
        }

        let ocr_text = match self.ensure_ocr(state, pdf, page).await? {
            OcrStatus::Ready(text) => text,
            OcrStatus::Unavailable => return Ok(PageOutcome::Failed),
        };

        let plan = self.options.plan;
        let english_done = state.page(page).is_some_and(|p| p.english_completed);
        if !english_done {
            if cancel.is_cancelled() {
                return Ok(PageOutcome::Cancelled);
            }
            if !self.fits_budget(tracker, &ocr_text, page).await {
                return Ok(PageOutcome::BudgetExhausted);
            }

            let result = self
                .translator
                .translate_text(&ocr_text, plan.source, Language::English)
                .await;
            match self.record_stage(state, page, tracker, result, Language::English).await? {
                Some(count) => *truncations += count,
                None => return Ok(PageOutcome::Failed),
            }
        }

        if cancel.is_cancelled() {
            return Ok(PageOutcome::Cancelled);
        }

        let english_text = state
            .page(page)
            .and_then(|p| p.english_text.clone())
            .unwrap_or_default();
        let (tamil_source, tamil_input) = plan.tamil_input(&ocr_text, &english_text);
        if !self.fits_budget(tracker, tamil_input, page).await {
            return Ok(PageOutcome::BudgetExhausted);
        }

        let result = self
            .translator
            .translate_text(tamil_input, tamil_source, Language::Tamil)
            .await;
        match self.record_stage(state, page, tracker, result, Language::Tamil).await? {
            Some(count) => *truncations += count,
            None => return Ok(PageOutcome::Failed),
        }

        info!("Page {} done", page);
        Ok(PageOutcome::Completed)
    }

    /// Make sure the page has OCR text that passed the quality gate
    async fn ensure_ocr(
        &self,
        state: &mut DocumentState,
        pdf: &Path,
        page: u32,
    ) -> Result<OcrStatus, PipelineError> {
        let current = state.page_mut(page).clone();

        if current
            .failure
            .as_ref()
            .is_some_and(|f| f.kind == FailureKind::QualityGate)
        {
            if !self.options.retry_failed {
                debug!("Page {} failed the quality gate earlier; skipping", page);
                return Ok(OcrStatus::Unavailable);
            }
            let text = current.ocr_text.as_deref().unwrap_or_default();
            if let Some(reason) = self.quality_gate(text, current.ocr_confidence) {
                info!("Page {} still below the quality gate: {}", page, reason);
                return Ok(OcrStatus::Unavailable);
            }
            info!("Page {} now passes the quality gate", page);
            self.store.update(state, page, StageResult::ClearFailure)?;
        }

        if current.ocr_completed {
            return Ok(OcrStatus::Ready(current.ocr_text.unwrap_or_default()));
        }

        let ocr = match self.ocr.recognize(pdf, page).await {
            Ok(ocr) => ocr,
            Err(e) => {
                warn!("OCR failed for page {}: {}", page, e);
                self.store.update(
                    state,
                    page,
                    StageResult::Failed {
                        kind: FailureKind::Ocr,
                        message: e.to_string(),
                    },
                )?;
                return Ok(OcrStatus::Unavailable);
            }
        };

        self.store.update(
            state,
            page,
            StageResult::Ocr {
                text: ocr.text.clone(),
                confidence: ocr.confidence,
            },
        )?;

        if let Some(reason) = self.quality_gate(&ocr.text, ocr.confidence) {
            warn!("Page {} failed the quality gate: {}", page, reason);
            self.store.update(
                state,
                page,
                StageResult::Failed {
                    kind: FailureKind::QualityGate,
                    message: reason,
                },
            )?;
            return Ok(OcrStatus::Unavailable);
        }

        Ok(OcrStatus::Ready(ocr.text))
    }

    fn quality_gate(&self, text: &str, confidence: f64) -> Option<String> {
        if text.trim().is_empty() {
            return Some("OCR produced no text".to_string());
        }
        if confidence < self.options.min_confidence {
            return Some(format!(
                "OCR confidence {:.2} below threshold {:.2}",
                confidence, self.options.min_confidence
            ));
        }
        None
    }

    async fn fits_budget(&self, tracker: &CostTracker, text: &str, page: u32) -> bool {
        let estimate = self.translator.estimate(text);
        if tracker.can_spend(estimate.cost_inr).await {
            return true;
        }
        warn!(
            "Budget exhausted before page {}: next stage needs ₹{:.2}, ₹{:.2} left",
            page,
            estimate.cost_inr,
            tracker.remaining().await.unwrap_or(0.0)
        );
        false
    }

    /// Persist a stage result; `Some(truncations)` on success, `None` when the page failed
    async fn record_stage(
        &self,
        state: &mut DocumentState,
        page: u32,
        tracker: &CostTracker,
        result: Result<StageTranslation, TranslationError>,
        language: Language,
    ) -> Result<Option<u32>, PipelineError> {
        let stage = match result {
            Ok(stage) => stage,
            Err(e) if e.is_fatal_for_job() => {
                return Err(PipelineError::Fatal { page, source: e });
            }
            Err(e) => {
                warn!("{} translation failed for page {}: {}", language, page, e);
                self.store.update(
                    state,
                    page,
                    StageResult::Failed {
                        kind: failure_kind(&e),
                        message: e.to_string(),
                    },
                )?;
                return Ok(None);
            }
        };

        tracker.record(language, stage.billed_chars, stage.cost_inr).await;
        if tracker.is_low().await {
            warn!("Less than 10% of the budget remains");
        }
        let truncations = stage.repetition_truncations;
        let result = match language {
            Language::Tamil => StageResult::Tamil {
                text: stage.text,
                cost_inr: stage.cost_inr,
                chars: stage.billed_chars,
                truncations,
            },
            _ => StageResult::English {
                text: stage.text,
                cost_inr: stage.cost_inr,
                chars: stage.billed_chars,
                truncations,
            },
        };
        self.store.update(state, page, result)?;
        Ok(Some(truncations))
    }

    async fn render_outputs(
        &self,
        state: &DocumentState,
        pdf: &Path,
        range: (u32, u32),
    ) -> Result<Vec<(Language, PathBuf)>, PipelineError> {
        let mut outputs = Vec::new();

        for language in [Language::English, Language::Tamil] {
            let pages: Vec<(u32, String)> = (range.0..=range.1)
                .filter_map(|n| state.page(n))
                .filter_map(|p| {
                    let text = match language {
                        Language::Tamil if p.tamil_completed => p.tamil_text.as_ref(),
                        Language::English if p.english_completed => p.english_text.as_ref(),
                        _ => None,
                    };
                    text.map(|t| (p.page_num, t.clone()))
                })
                .collect();

            if pages.is_empty() {
                continue;
            }

            let path = self
                .renderer
                .render(language, pdf, &pages, &self.options.output_dir)
                .await
                .map_err(|e| PipelineError::Render {
                    language: language.to_string(),
                    message: e.to_string(),
                })?;
            outputs.push((language, path));
        }

        Ok(outputs)
    }
}

/// Resolve the requested range against the document, defaulting to the first pages
pub fn resolve_page_range(
    requested: Option<(u32, u32)>,
    total_pages: u32,
    default_pages: u32,
) -> Result<(u32, u32), PipelineError> {
    if total_pages == 0 {
        return Err(PipelineError::Config {
            message: "PDF has no pages".to_string(),
        });
    }

    let (start, end) = requested.unwrap_or((1, default_pages.max(1)));
    let start = start.max(1);
    let end = end.min(total_pages);
    if start > end {
        return Err(PipelineError::Config {
            message: format!(
                "Page range {}-{} is outside the document (1-{})",
                start, end, total_pages
            ),
        });
    }
    Ok((start, end))
}

fn failure_kind(error: &TranslationError) -> FailureKind {
    match error {
        TranslationError::ChunkFailed { source, .. } => failure_kind(source),
        TranslationError::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
        TranslationError::BadRequest { .. } => FailureKind::Request,
        _ => FailureKind::Translation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_is_first_pages() {
        assert_eq!(resolve_page_range(None, 100, 10).unwrap(), (1, 10));
        assert_eq!(resolve_page_range(None, 4, 10).unwrap(), (1, 4));
    }

    #[test]
    fn test_requested_range_is_clamped() {
        assert_eq!(resolve_page_range(Some((0, 500)), 42, 10).unwrap(), (1, 42));
        assert_eq!(resolve_page_range(Some((5, 7)), 42, 10).unwrap(), (5, 7));
        assert!(resolve_page_range(Some((50, 60)), 42, 10).is_err());
        assert!(resolve_page_range(None, 0, 10).is_err());
    }

    #[test]
    fn test_failure_kind_looks_through_chunk_failure() {
        let exhausted = TranslationError::ChunkFailed {
            chunk_index: 1,
            failed_chunks: 1,
            source: Box::new(TranslationError::RetriesExhausted {
                attempts: 3,
                last: Box::new(TranslationError::TimeoutError),
            }),
        };
        assert_eq!(failure_kind(&exhausted), FailureKind::RetriesExhausted);

        let rejected = TranslationError::ChunkFailed {
            chunk_index: 0,
            failed_chunks: 2,
            source: Box::new(TranslationError::from_status(422, "bad".into())),
        };
        assert_eq!(failure_kind(&rejected), FailureKind::Request);
    }

    #[test]
    fn test_cost_report_budget_check() {
        let report = CostReport {
            pdf_path: PathBuf::from("a.pdf"),
            page_range: (1, 1),
            pages_estimated: 1,
            pages_already_done: 0,
            pages_unavailable: 0,
            english: CostEstimate::default(),
            tamil: CostEstimate::default(),
            total_inr: 12.0,
            exact: true,
            budget_inr: Some(10.0),
            cancelled: false,
        };
        assert!(!report.within_budget());
        assert!(CostReport { budget_inr: None, ..report }.within_budget());
    }
}
