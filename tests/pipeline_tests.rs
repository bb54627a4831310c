//! End-to-end pipeline runs against mock OCR and a mock translation API

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use tamil_translate::core::errors::{OcrError, PipelineError, Result as TranslationResult};
use tamil_translate::core::models::{CostRate, TranslationRequest};
use tamil_translate::core::retry::RetryPolicy;
use tamil_translate::pipeline::{CancellationToken, PipelineOrchestrator, RunOptions};
use tamil_translate::processors::{OcrEngine, OcrPage, PlainTextRenderer};
use tamil_translate::state::{FailureKind, PageStatus, StateStore};
use tamil_translate::{
    Chunker, Language, LanguagePlan, PipelineConfig, TranslationBackend, TranslationClient,
    TranslationError, TranslationOrchestrator, TranslationOptions,
};

#[derive(Debug, Default)]
struct MockBackend {
    calls: AtomicU32,
    fail_status: Option<u16>,
    fail_target: Option<Language>,
    cancel_on_call: Option<CancellationToken>,
}

impl MockBackend {
    fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Default::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    async fn translate(&self, request: &TranslationRequest) -> TranslationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if let Some(status) = self.fail_status {
            if self.fail_target.map_or(true, |t| t == request.target_lang) {
                return Err(TranslationError::from_status(status, "mock failure".into()));
            }
        }
        Ok(format!("{}:{}", request.target_lang.code(), request.text))
    }
}

#[derive(Clone)]
struct MockOcr {
    pages: Arc<HashMap<u32, (String, f64)>>,
    total: u32,
    calls: Arc<Mutex<Vec<u32>>>,
    failing: Arc<HashSet<u32>>,
}

impl MockOcr {
    fn new(total: u32) -> Self {
        let pages = (1..=total)
            .map(|n| (n, (format!("पृष्ठ {} धर्मक्षेत्रे कुरुक्षेत्रे समवेता युयुत्सवः", n), 0.92)))
            .collect();
        Self {
            pages: Arc::new(pages),
            total,
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(HashSet::new()),
        }
    }

    fn with_page(mut self, page: u32, text: &str, confidence: f64) -> Self {
        Arc::make_mut(&mut self.pages).insert(page, (text.to_string(), confidence));
        self
    }

    fn failing_on(mut self, page: u32) -> Self {
        Arc::make_mut(&mut self.failing).insert(page);
        self
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn page_count(&self, _pdf: &Path) -> Result<u32, OcrError> {
        Ok(self.total)
    }

    async fn recognize(&self, _pdf: &Path, page: u32) -> Result<OcrPage, OcrError> {
        self.calls.lock().unwrap().push(page);
        if self.failing.contains(&page) {
            return Err(OcrError::ToolFailed {
                tool: "tesseract".into(),
                message: "mock crash".into(),
            });
        }
        let (text, confidence) = self.pages.get(&page).cloned().unwrap_or_default();
        Ok(OcrPage { text, confidence })
    }
}

struct Fixture {
    dir: TempDir,
    pdf: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("gita.pdf");
        std::fs::write(&pdf, b"%PDF-1.4 scanned gita").unwrap();
        Self { dir, pdf }
    }

    fn options(&self) -> RunOptions {
        let config = PipelineConfig {
            output_dir: self.dir.path().join("out"),
            ..Default::default()
        };
        RunOptions::from_config(&config)
    }

    fn store(&self) -> StateStore {
        StateStore::new(self.dir.path().join("state"))
    }

    fn pipeline(
        &self,
        backend: &Arc<MockBackend>,
        ocr: &MockOcr,
        options: RunOptions,
    ) -> PipelineOrchestrator<Arc<MockBackend>, MockOcr, PlainTextRenderer> {
        let client = TranslationClient::new(Arc::clone(backend), RetryPolicy::default(), CostRate::default());
        let translator =
            TranslationOrchestrator::new(client, Chunker::new(40), 3, TranslationOptions::default());
        PipelineOrchestrator::new(translator, ocr.clone(), PlainTextRenderer, self.store(), options)
    }

    fn output(&self, language: Language) -> String {
        self.output_of(&self.pdf, language)
    }

    fn output_of(&self, pdf: &Path, language: Language) -> String {
        let path = PlainTextRenderer::output_path(language, pdf, &self.dir.path().join("out"));
        std::fs::read_to_string(path).unwrap()
    }
}

#[tokio::test]
async fn test_full_run_produces_both_outputs() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(3);

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.page_range, (1, 3));
    assert_eq!(report.pages_completed, 3);
    assert_eq!(report.pages_failed, 0);
    assert!(report.run_cost_inr > 0.0);
    assert_eq!(report.outputs.len(), 2);

    let tamil = fx.output(Language::Tamil);
    assert!(tamil.starts_with("gita (Tamil Translation)"));
    let p1 = tamil.find("--- Page 1 ---").unwrap();
    let p3 = tamil.find("--- Page 3 ---").unwrap();
    assert!(p1 < p3);
    // two-step: Tamil is translated from the English output
    assert!(tamil.contains("ta-IN:en-IN:"));
}

#[tokio::test]
async fn test_resume_makes_no_calls_and_reproduces_outputs() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(3);

    fx.pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    let calls_after_first = backend.calls();
    let ocr_after_first = ocr.calls().len();
    let english = fx.output(Language::English);
    let tamil = fx.output(Language::Tamil);

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(backend.calls(), calls_after_first);
    assert_eq!(ocr.calls().len(), ocr_after_first);
    assert_eq!(report.pages_skipped, 3);
    assert_eq!(report.pages_completed, 0);
    assert_eq!(report.run_cost_inr, 0.0);
    assert_eq!(fx.output(Language::English), english);
    assert_eq!(fx.output(Language::Tamil), tamil);
}

#[tokio::test]
async fn test_changed_pdf_requires_fresh_start() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(2);

    fx.pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    std::fs::write(&fx.pdf, b"%PDF-1.4 rescanned gita").unwrap();

    let err = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::StaleState { .. }));

    let mut fresh = fx.options();
    fresh.resume = false;
    let report = fx
        .pipeline(&backend, &ocr, fresh)
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_completed, 2);
    assert_eq!(report.pages_skipped, 0);
}

#[tokio::test]
async fn test_low_confidence_page_is_gated_until_retry_failed() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(3).with_page(2, "धुंधला पाठ", 0.55);

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_completed, 2);
    assert_eq!(report.pages_failed, 1);

    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    let page = state.page(2).unwrap();
    assert_eq!(page.status(), PageStatus::Failed(FailureKind::QualityGate));
    assert!(page.ocr_completed);
    assert!(!page.english_completed);

    // a plain rerun leaves the gated page alone
    let calls = backend.calls();
    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_failed, 1);
    assert_eq!(backend.calls(), calls);

    // retry_failed re-checks the stored OCR against a lower threshold
    let mut retry = fx.options();
    retry.retry_failed = true;
    retry.min_confidence = 0.5;
    let report = fx
        .pipeline(&backend, &ocr, retry)
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_completed, 1);
    assert_eq!(ocr.calls().iter().filter(|p| **p == 2).count(), 1);
}

#[tokio::test]
async fn test_empty_ocr_fails_quality_gate() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(1).with_page(1, "  \n ", 0.99);

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_failed, 1);
    assert_eq!(backend.calls(), 0);
    assert!(report.outputs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_page_fails_after_three_attempts() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::failing(429));
    let ocr = MockOcr::new(1).with_page(1, "छोटा पाठ", 0.95);
    let mut options = fx.options();
    options.page_range = Some((1, 1));

    let started = tokio::time::Instant::now();
    let report = fx
        .pipeline(&backend, &ocr, options)
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(backend.calls(), 3);
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert_eq!(report.pages_failed, 1);

    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    let page = state.page(1).unwrap();
    assert_eq!(page.status(), PageStatus::Failed(FailureKind::RetriesExhausted));
    assert!(page.error.is_some());
}

#[tokio::test]
async fn test_bad_request_fails_page_and_continues() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::failing(400));
    let ocr = MockOcr::new(2);

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_failed, 2);
    assert_eq!(ocr.calls(), vec![1, 2]);
    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    assert_eq!(
        state.page(2).unwrap().status(),
        PageStatus::Failed(FailureKind::Request)
    );
}

#[tokio::test]
async fn test_tamil_never_completes_without_english() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend {
        fail_status: Some(400),
        fail_target: Some(Language::Tamil),
        ..Default::default()
    });
    let ocr = MockOcr::new(3);

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_failed, 3);

    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    for page in state.pages.values() {
        assert!(!page.tamil_completed || page.english_completed);
        assert!(page.english_completed);
        assert!(!page.tamil_completed);
    }

    // a healthy rerun only translates Tamil
    let healthy = Arc::new(MockBackend::default());
    let report = fx
        .pipeline(&healthy, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_completed, 3);

    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    let expected_tamil_calls: usize = state
        .pages
        .values()
        .map(|p| Chunker::new(40).split(p.english_text.as_deref().unwrap()).count())
        .sum();
    assert_eq!(healthy.calls() as usize, expected_tamil_calls);
}

#[tokio::test]
async fn test_auth_failure_aborts_run() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::failing(401));
    let ocr = MockOcr::new(3);

    let err = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Fatal { page: 1, .. }));
    assert_eq!(ocr.calls(), vec![1]);

    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    let page = state.page(1).unwrap();
    assert!(page.ocr_completed);
    assert!(page.failure.is_none());
}

#[tokio::test]
async fn test_cancellation_keeps_finished_stage() {
    let fx = Fixture::new();
    let cancel = CancellationToken::new();
    let backend = Arc::new(MockBackend {
        cancel_on_call: Some(cancel.clone()),
        ..Default::default()
    });
    let ocr = MockOcr::new(3);

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.pages_completed, 0);
    assert_eq!(ocr.calls(), vec![1]);

    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    let page = state.page(1).unwrap();
    assert!(page.english_completed);
    assert!(!page.tamil_completed);
}

#[tokio::test]
async fn test_cancelled_before_start_does_nothing() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(3);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = fx
        .pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(ocr.calls().is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_budget_stops_before_overspending() {
    let fx = Fixture::new();
    let ocr = MockOcr::new(3);

    // Price one page with an unlimited dry run
    let pricing = Arc::new(MockBackend::default());
    let mut one_page = fx.options();
    one_page.page_range = Some((1, 1));
    one_page.plan = LanguagePlan::direct(Language::Sanskrit);
    let page_cost = fx
        .pipeline(&pricing, &ocr, one_page)
        .dry_run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap()
        .total_inr;

    let backend = Arc::new(MockBackend::default());
    let mut options = fx.options();
    options.plan = LanguagePlan::direct(Language::Sanskrit);
    options.budget_inr = Some(page_cost * 1.2);
    let report = fx
        .pipeline(&backend, &ocr, options)
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.budget_exhausted);
    assert_eq!(report.pages_completed, 1);
    assert!(report.run_cost_inr <= page_cost * 1.2 + 1e-9);
}

#[tokio::test]
async fn test_dry_run_matches_real_cost() {
    let fx = Fixture::new();
    let ocr = MockOcr::new(4);
    let mut options = fx.options();
    options.plan = LanguagePlan::direct(Language::Sanskrit);

    let backend = Arc::new(MockBackend::default());
    let estimate = fx
        .pipeline(&backend, &ocr, options.clone())
        .dry_run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(backend.calls(), 0);
    assert!(estimate.exact);
    assert_eq!(estimate.pages_estimated, 4);

    let report = fx
        .pipeline(&backend, &ocr, options)
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(estimate.total_inr, report.run_cost_inr);
    // OCR from the dry run was persisted and reused
    assert_eq!(ocr.calls(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_two_step_dry_run_estimates_english_exactly() {
    let fx = Fixture::new();
    let ocr = MockOcr::new(2);
    let backend = Arc::new(MockBackend::default());

    let estimate = fx
        .pipeline(&backend, &ocr, fx.options())
        .dry_run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!estimate.exact);

    fx.pipeline(&backend, &ocr, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    assert_eq!(estimate.english.cost_inr, state.english_cost());
}

#[tokio::test]
async fn test_ocr_failure_is_retried_next_run() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let flaky = MockOcr::new(2).failing_on(2);

    let report = fx
        .pipeline(&backend, &flaky, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_failed, 1);
    let state = fx.store().load(&fx.pdf).unwrap().unwrap();
    assert_eq!(state.page(2).unwrap().status(), PageStatus::Failed(FailureKind::Ocr));

    let fixed = MockOcr::new(2);
    let report = fx
        .pipeline(&backend, &fixed, fx.options())
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.pages_completed, 1);
    assert_eq!(report.pages_skipped, 1);
    assert_eq!(fixed.calls(), vec![2]);
}

#[tokio::test]
async fn test_wider_range_reuses_progress() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(5);

    let mut first = fx.options();
    first.page_range = Some((1, 2));
    fx.pipeline(&backend, &ocr, first)
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    let mut second = fx.options();
    second.page_range = Some((1, 4));
    let report = fx
        .pipeline(&backend, &ocr, second)
        .run(&fx.pdf, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages_skipped, 2);
    assert_eq!(report.pages_completed, 2);
    assert_eq!(ocr.calls(), vec![1, 2, 3, 4]);
    assert!(fx.output(Language::English).contains("--- Page 4 ---"));
}

#[tokio::test]
async fn test_same_named_pdfs_keep_separate_progress() {
    let fx = Fixture::new();
    let backend = Arc::new(MockBackend::default());
    let ocr = MockOcr::new(2);

    let mut pdfs = Vec::new();
    for (dir, content) in [("a", "first scan"), ("b", "second scan")] {
        let folder = fx.dir.path().join(dir);
        std::fs::create_dir_all(&folder).unwrap();
        let pdf = folder.join("book.pdf");
        std::fs::write(&pdf, content).unwrap();
        pdfs.push(pdf);
    }

    for pdf in &pdfs {
        let report = fx
            .pipeline(&backend, &ocr, fx.options())
            .run(pdf, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.pages_completed, 2);
    }

    let store = fx.store();
    assert_ne!(store.state_path(&pdfs[0]), store.state_path(&pdfs[1]));
    for pdf in &pdfs {
        let state = store.load(pdf).unwrap().unwrap();
        assert_eq!(state.completed_pages(), vec![1, 2]);
    }

    // clearing one document leaves the other resumable
    assert!(store.clear(&pdfs[1]).unwrap());
    assert!(store.load(&pdfs[0]).unwrap().is_some());

    let a = fx.output_of(&pdfs[0], Language::English);
    assert!(a.starts_with("book (English Translation)"));
    assert_ne!(
        PlainTextRenderer::output_path(Language::English, &pdfs[0], fx.dir.path()),
        PlainTextRenderer::output_path(Language::English, &pdfs[1], fx.dir.path())
    );
}
