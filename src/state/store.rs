//! Crash-safe progress record for one PDF
//!
//! One JSON file per source document at `<state_dir>/<stem>-<hash>.state.json`,
//! the hash taken over the document's canonical path.
//! Every write goes to a temp file in the same directory, is synced, then
//! renamed over the canonical file; the previous file is kept as
//! `<stem>-<hash>.state.backup` and used when the canonical file fails to parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::errors::StateError;
use crate::processors::pdf::document_key;

/// Schema version written to every state file
pub const STATE_VERSION: &str = "1.0";

const CHECKSUM_BUF_SIZE: usize = 64 * 1024;

type Result<T> = std::result::Result<T, StateError>;

/// Why a page is marked failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// OCR confidence under the threshold or no text; only retried on request
    QualityGate,
    /// OCR tool failed
    Ocr,
    /// API rejected the request
    Request,
    /// Transient errors outlasted the retry budget
    RetriesExhausted,
    /// Any other translation failure
    Translation,
}

impl FailureKind {
    /// Whether a normal resume picks the page up again
    pub fn retried_on_resume(&self) -> bool {
        !matches!(self, FailureKind::QualityGate)
    }
}

/// Failure record kept alongside the page's progress flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Where a page sits in `pending → ocr_done → english_done → done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    OcrDone,
    EnglishDone,
    Done,
    Failed(FailureKind),
}

/// Persisted progress of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub page_num: u32,
    #[serde(default)]
    pub ocr_completed: bool,
    #[serde(default)]
    pub english_completed: bool,
    #[serde(default)]
    pub tamil_completed: bool,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub english_text: Option<String>,
    #[serde(default)]
    pub tamil_text: Option<String>,
    #[serde(default)]
    pub ocr_confidence: f64,
    #[serde(default)]
    pub cost_english: f64,
    #[serde(default)]
    pub cost_tamil: f64,
    #[serde(default)]
    pub chars_english: u64,
    #[serde(default)]
    pub chars_tamil: u64,
    #[serde(default)]
    pub repetition_truncations: u32,
    #[serde(default)]
    pub failure: Option<PageFailure>,
    #[serde(default)]
    pub error: Option<String>,
    /// Seconds spent on this page across runs
    #[serde(default)]
    pub processing_time: f64,
}

impl PageState {
    pub fn new(page_num: u32) -> Self {
        Self {
            page_num,
            ocr_completed: false,
            english_completed: false,
            tamil_completed: false,
            ocr_text: None,
            english_text: None,
            tamil_text: None,
            ocr_confidence: 0.0,
            cost_english: 0.0,
            cost_tamil: 0.0,
            chars_english: 0,
            chars_tamil: 0,
            repetition_truncations: 0,
            failure: None,
            error: None,
            processing_time: 0.0,
        }
    }

    pub fn is_fully_completed(&self) -> bool {
        self.ocr_completed && self.english_completed && self.tamil_completed
    }

    pub fn total_cost(&self) -> f64 {
        self.cost_english + self.cost_tamil
    }

    pub fn status(&self) -> PageStatus {
        if self.is_fully_completed() {
            return PageStatus::Done;
        }
        if let Some(failure) = &self.failure {
            return PageStatus::Failed(failure.kind);
        }
        if self.english_completed {
            PageStatus::EnglishDone
        } else if self.ocr_completed {
            PageStatus::OcrDone
        } else {
            PageStatus::Pending
        }
    }

    fn clear_failure(&mut self) {
        self.failure = None;
        self.error = None;
    }
}

/// Persisted progress of one PDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pub version: String,
    pub pdf_path: PathBuf,
    pub pdf_checksum: String,
    pub total_pages: u32,
    pub page_range_start: u32,
    pub page_range_end: u32,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Keyed by page number; serialized with string keys
    #[serde(default)]
    pub pages: BTreeMap<u32, PageState>,
}

impl DocumentState {
    pub fn new(pdf_path: PathBuf, pdf_checksum: String, total_pages: u32, range: (u32, u32)) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION.to_string(),
            pdf_path,
            pdf_checksum,
            total_pages,
            page_range_start: range.0,
            page_range_end: range.1,
            started_at: now,
            last_updated: now,
            pages: BTreeMap::new(),
        }
    }

    pub fn page(&self, page_num: u32) -> Option<&PageState> {
        self.pages.get(&page_num)
    }

    /// Get or create a page entry
    pub fn page_mut(&mut self, page_num: u32) -> &mut PageState {
        self.pages
            .entry(page_num)
            .or_insert_with(|| PageState::new(page_num))
    }

    pub fn page_range(&self) -> (u32, u32) {
        (self.page_range_start, self.page_range_end)
    }

    /// Point the run at another range; existing page entries are kept
    pub fn set_page_range(&mut self, range: (u32, u32)) {
        self.page_range_start = range.0;
        self.page_range_end = range.1;
    }

    pub fn add_processing_time(&mut self, page_num: u32, seconds: f64) {
        self.page_mut(page_num).processing_time += seconds;
    }

    pub fn completed_pages(&self) -> Vec<u32> {
        self.pages
            .values()
            .filter(|p| p.is_fully_completed())
            .map(|p| p.page_num)
            .collect()
    }

    pub fn pages_completed_count(&self) -> usize {
        self.pages.values().filter(|p| p.is_fully_completed()).count()
    }

    /// Pages in the current range that are not done
    pub fn pending_pages(&self) -> Vec<u32> {
        (self.page_range_start..=self.page_range_end)
            .filter(|n| !self.page(*n).is_some_and(PageState::is_fully_completed))
            .collect()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.pages
            .values()
            .filter(|p| matches!(p.status(), PageStatus::Failed(_)))
            .map(|p| p.page_num)
            .collect()
    }

    pub fn english_cost(&self) -> f64 {
        self.pages.values().map(|p| p.cost_english).sum()
    }

    pub fn tamil_cost(&self) -> f64 {
        self.pages.values().map(|p| p.cost_tamil).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.english_cost() + self.tamil_cost()
    }

    pub fn progress_percentage(&self) -> f64 {
        let expected = self.page_range_end.saturating_sub(self.page_range_start) + 1;
        let done = (self.page_range_start..=self.page_range_end)
            .filter(|n| self.page(*n).is_some_and(PageState::is_fully_completed))
            .count();
        done as f64 * 100.0 / expected as f64
    }
}

/// One completed stage (or failure) for a page
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    Ocr {
        text: String,
        confidence: f64,
    },
    English {
        text: String,
        cost_inr: f64,
        chars: u64,
        truncations: u32,
    },
    Tamil {
        text: String,
        cost_inr: f64,
        chars: u64,
        truncations: u32,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
    /// A quality-gate failure passed re-evaluation
    ClearFailure,
}

/// Result of looking for prior state
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Found(DocumentState),
    NotFound,
    /// State exists but the PDF changed since it was written
    Stale {
        state: DocumentState,
        current_checksum: String,
    },
}

/// Summary of resumable progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeInfo {
    pub pdf_path: PathBuf,
    pub total_pages: u32,
    pub page_range: (u32, u32),
    pub pages_completed: usize,
    pub pending_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,
    pub english_cost: f64,
    pub tamil_cost: f64,
    pub total_cost: f64,
    pub progress_percentage: f64,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub stale: bool,
}

impl ResumeInfo {
    fn from_state(state: &DocumentState, stale: bool) -> Self {
        Self {
            pdf_path: state.pdf_path.clone(),
            total_pages: state.total_pages,
            page_range: state.page_range(),
            pages_completed: state.pages_completed_count(),
            pending_pages: state.pending_pages(),
            failed_pages: state.failed_pages(),
            english_cost: state.english_cost(),
            tamil_cost: state.tamil_cost(),
            total_cost: state.total_cost(),
            progress_percentage: state.progress_percentage(),
            started_at: state.started_at,
            last_updated: state.last_updated,
            stale,
        }
    }
}

/// SHA-256 of a file as lowercase hex
pub fn checksum(path: &Path) -> Result<String> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_BUF_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(io_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Owns the state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// `<state_dir>/<stem>-<path hash>.state.json`
    pub fn state_path(&self, pdf_path: &Path) -> PathBuf {
        self.state_dir
            .join(format!("{}.state.json", document_key(pdf_path)))
    }

    pub fn backup_path(&self, pdf_path: &Path) -> PathBuf {
        self.state_path(pdf_path).with_extension("backup")
    }

    /// Write a fresh state for `pdf_path`
    pub fn create(&self, pdf_path: &Path, total_pages: u32, range: (u32, u32)) -> Result<DocumentState> {
        let pdf_checksum = checksum(pdf_path)?;
        let mut state = DocumentState::new(pdf_path.to_path_buf(), pdf_checksum, total_pages, range);
        self.save(&mut state)?;

        info!(
            "Created new state for {} (pages {}-{}, checksum: {}...)",
            pdf_path.display(),
            range.0,
            range.1,
            &state.pdf_checksum[..8]
        );
        Ok(state)
    }

    /// Prior state with a matching checksum, if any
    pub fn load(&self, pdf_path: &Path) -> Result<Option<DocumentState>> {
        match self.inspect(pdf_path)? {
            LoadOutcome::Found(state) => Ok(Some(state)),
            LoadOutcome::NotFound | LoadOutcome::Stale { .. } => Ok(None),
        }
    }

    /// Look for prior state and classify it against the current PDF
    pub fn inspect(&self, pdf_path: &Path) -> Result<LoadOutcome> {
        let state_path = self.state_path(pdf_path);
        if !state_path.exists() {
            return Ok(LoadOutcome::NotFound);
        }

        let state = match read_state(&state_path) {
            Ok(state) => state,
            Err(StateError::Corrupted { source, .. }) => {
                warn!("State file corrupted: {}", source);
                self.recover_from_backup(pdf_path)?
            }
            Err(e) => return Err(e),
        };

        let current_checksum = checksum(pdf_path)?;
        if state.pdf_checksum != current_checksum {
            warn!(
                "PDF checksum mismatch - file may have been modified. Expected: {}..., Got: {}...",
                &state.pdf_checksum[..state.pdf_checksum.len().min(8)],
                &current_checksum[..8]
            );
            return Ok(LoadOutcome::Stale {
                state,
                current_checksum,
            });
        }

        info!(
            "Loaded existing state: {} pages completed, ₹{:.2} spent",
            state.pages_completed_count(),
            state.total_cost()
        );
        Ok(LoadOutcome::Found(state))
    }

    fn recover_from_backup(&self, pdf_path: &Path) -> Result<DocumentState> {
        let state_path = self.state_path(pdf_path);
        let backup_path = self.backup_path(pdf_path);
        if !backup_path.exists() {
            warn!("No backup file available for recovery");
            return read_state(&state_path);
        }

        info!("Attempting recovery from backup file...");
        let state = read_state(&backup_path)?;
        fs::copy(&backup_path, &state_path).map_err(|source| StateError::Io {
            path: state_path.clone(),
            source,
        })?;

        info!(
            "Recovered state from backup: {} pages completed",
            state.pages_completed_count()
        );
        Ok(state)
    }

    /// Atomically persist `state`
    pub fn save(&self, state: &mut DocumentState) -> Result<()> {
        let state_path = self.state_path(&state.pdf_path);
        let backup_path = self.backup_path(&state.pdf_path);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StateError::Io { path, source }
        };

        fs::create_dir_all(&self.state_dir).map_err(io_err(&self.state_dir))?;
        state.last_updated = Utc::now();

        if state_path.exists() {
            fs::copy(&state_path, &backup_path).map_err(io_err(&backup_path))?;
        }

        let json = serde_json::to_vec_pretty(state).map_err(|source| StateError::Corrupted {
            path: state_path.clone(),
            source,
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.state_dir).map_err(io_err(&self.state_dir))?;
        temp.write_all(&json).map_err(io_err(temp.path()))?;
        temp.as_file().sync_all().map_err(io_err(temp.path()))?;
        temp.persist(&state_path).map_err(|e| StateError::Persist {
            path: state_path.clone(),
            message: e.error.to_string(),
        })?;

        // Make the rename itself durable where the platform allows it
        if let Ok(dir) = fs::File::open(&self.state_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            "State saved: {} pages completed",
            state.pages_completed_count()
        );
        Ok(())
    }

    /// Merge one stage result into `state` and persist it
    pub fn update(&self, state: &mut DocumentState, page_num: u32, result: StageResult) -> Result<()> {
        let page = state.page_mut(page_num);
        let invalid = |reason: &str| StateError::InvalidTransition {
            page: page_num,
            reason: reason.to_string(),
        };

        match result {
            StageResult::Ocr { text, confidence } => {
                page.ocr_text = Some(text);
                page.ocr_confidence = confidence;
                page.ocr_completed = true;
                page.clear_failure();
            }
            StageResult::English {
                text,
                cost_inr,
                chars,
                truncations,
            } => {
                if !page.ocr_completed {
                    return Err(invalid("English before OCR"));
                }
                if page
                    .failure
                    .as_ref()
                    .is_some_and(|f| f.kind == FailureKind::QualityGate)
                {
                    return Err(invalid("English on a page that failed the quality gate"));
                }
                if text.trim().is_empty() {
                    return Err(invalid("empty English text"));
                }
                page.english_text = Some(text);
                page.cost_english = cost_inr;
                page.chars_english = chars;
                page.repetition_truncations += truncations;
                page.english_completed = true;
                page.clear_failure();
            }
            StageResult::Tamil {
                text,
                cost_inr,
                chars,
                truncations,
            } => {
                if !page.english_completed {
                    return Err(invalid("Tamil before English"));
                }
                page.tamil_text = Some(text);
                page.cost_tamil = cost_inr;
                page.chars_tamil = chars;
                page.repetition_truncations += truncations;
                page.tamil_completed = true;
                page.clear_failure();
            }
            StageResult::Failed { kind, message } => {
                page.error = Some(message.clone());
                page.failure = Some(PageFailure { kind, message });
            }
            StageResult::ClearFailure => page.clear_failure(),
        }

        self.save(state)
    }

    /// Remove state and backup for `pdf_path`; true if anything existed
    pub fn clear(&self, pdf_path: &Path) -> Result<bool> {
        let mut removed = false;
        for path in [self.state_path(pdf_path), self.backup_path(pdf_path)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StateError::Io { path, source }),
            }
        }

        if removed {
            info!("Cleared state for {}", pdf_path.display());
        }
        Ok(removed)
    }

    /// Summarize prior progress, stale or not
    pub fn resume_info(&self, pdf_path: &Path) -> Result<Option<ResumeInfo>> {
        Ok(match self.inspect(pdf_path)? {
            LoadOutcome::Found(state) => Some(ResumeInfo::from_state(&state, false)),
            LoadOutcome::Stale { state, .. } => Some(ResumeInfo::from_state(&state, true)),
            LoadOutcome::NotFound => None,
        })
    }
}

fn read_state(path: &Path) -> Result<DocumentState> {
    let content = fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StateError::Corrupted {
        path: path.to_path_buf(),
        source,
    })
}
