//! CLI command definitions and handlers

use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::core::client::SarvamBackend;
use crate::core::config::PipelineConfig;
use crate::core::cost_tracker::CostTracker;
use crate::core::errors::PipelineError;
use crate::core::models::Language;
use crate::pipeline::{CancellationToken, CostReport, PipelineOrchestrator, PipelineReport, RunOptions};
use crate::processors::pdf::find_pdf_files;
use crate::processors::{PlainTextRenderer, TesseractOcr};
use crate::state::StateStore;
use crate::translation::TranslationOrchestrator;

static PAGE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(?:-\s*(\d+)\s*)?$").expect("valid regex"));

/// Commands for Tamil Translate
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate a PDF, or every PDF under a directory
    Translate(TranslateArgs),

    /// Show saved progress for a PDF or directory
    Status {
        /// Input PDF or directory
        input: PathBuf,
    },

    /// Delete saved progress for a PDF or directory
    Clear {
        /// Input PDF or directory
        input: PathBuf,
    },
}

/// Options for `translate`
#[derive(Args, Debug, Clone)]
pub struct TranslateArgs {
    /// Input PDF or directory of PDFs
    pub input: PathBuf,

    /// Pages to process: "1-10", "5", or "all" (default: first 10)
    #[arg(short, long)]
    pub pages: Option<String>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Concurrent chunk requests per page
    #[arg(long)]
    pub workers: Option<usize>,

    /// Maximum characters per API request
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Minimum OCR confidence (0.0-1.0)
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Source language: sanskrit or hindi
    #[arg(long)]
    pub source: Option<String>,

    /// Estimate cost without calling the translation API
    #[arg(long)]
    pub dry_run: bool,

    /// Discard saved progress and start fresh
    #[arg(long)]
    pub no_resume: bool,

    /// Re-check pages that failed the OCR quality gate
    #[arg(long)]
    pub retry_failed: bool,

    /// Translate Tamil from the source text instead of from English
    #[arg(long)]
    pub direct_tamil: bool,

    /// Stop before spending more than this many rupees
    #[arg(long)]
    pub budget: Option<f64>,
}

impl TranslateArgs {
    /// Apply flag overrides on top of loaded configuration
    pub fn apply(&self, config: &mut PipelineConfig) -> anyhow::Result<()> {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
            config.state_dir = output.join(".state");
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.max_chunk_size = chunk_size;
        }
        if let Some(min_confidence) = self.min_confidence {
            config.min_ocr_confidence = min_confidence;
        }
        if let Some(source) = &self.source {
            config.source_language = source.parse::<Language>()?;
        }
        if self.no_resume {
            config.resume = false;
        }
        if self.retry_failed {
            config.retry_failed = true;
        }
        if self.direct_tamil {
            config.two_step_tamil = false;
        }
        if self.budget.is_some() {
            config.max_cost_inr = self.budget;
        }
        Ok(())
    }
}

/// Parse `--pages`; `None` means the configured default
pub fn parse_page_range(pages: Option<&str>) -> anyhow::Result<Option<(u32, u32)>> {
    let Some(pages) = pages else {
        return Ok(None);
    };
    if pages.trim().eq_ignore_ascii_case("all") {
        return Ok(Some((1, u32::MAX)));
    }

    let caps = PAGE_RANGE
        .captures(pages)
        .ok_or_else(|| anyhow::anyhow!("Invalid page range '{}': use N, N-M or all", pages))?;
    let start: u32 = caps[1].parse()?;
    let end: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse()?,
        None => start,
    };

    if start == 0 || start > end {
        anyhow::bail!("Invalid page range '{}': pages start at 1 and must be ascending", pages);
    }
    Ok(Some((start, end)))
}

/// PDFs named by `input`
fn collect_inputs(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let files = if input.is_dir() {
        find_pdf_files(input)?
    } else if input.is_file() {
        vec![input.to_path_buf()]
    } else {
        anyhow::bail!("Input not found: {}", input.display());
    };

    if files.is_empty() {
        anyhow::bail!("No PDF files found in {}", input.display());
    }
    Ok(files)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Handle translation command
pub async fn handle_translate(
    args: TranslateArgs,
    mut config: PipelineConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let start_time = Instant::now();

    args.apply(&mut config)?;
    config.validate()?;
    if !args.dry_run {
        config.validate_api_key()?;
    }

    let page_range = parse_page_range(args.pages.as_deref())?;
    let files = collect_inputs(&args.input)?;

    info!("Starting translation");
    info!("Input: {} ({} PDF files)", args.input.display(), files.len());
    info!("Output: {}", config.output_dir.display());
    info!("Source language: {}", config.source_language);

    let backend = SarvamBackend::from_config(&config)?;
    let options = RunOptions::from_config(&config).with_page_range(page_range);
    // One budget for the whole invocation
    let tracker = CostTracker::new(config.max_cost_inr);

    let mut processed = 0;
    let mut failed = 0;
    let mut estimated_total = 0.0;

    for file_path in files {
        if cancel.is_cancelled() {
            warn!("Cancelled; remaining files skipped");
            break;
        }

        let translator = TranslationOrchestrator::from_config(backend.clone(), &config)?;
        let pipeline = PipelineOrchestrator::new(
            translator,
            TesseractOcr::from_config(&config),
            PlainTextRenderer,
            StateStore::new(&config.state_dir),
            options.clone(),
        )
        .with_cost_tracker(tracker.clone())
        .with_progress(progress_bar());

        println!("\n📄 {}", file_path.display());

        let result = if args.dry_run {
            pipeline
                .dry_run(&file_path, &cancel)
                .await
                .map(|report| {
                    estimated_total += report.total_inr;
                    print_cost_report(&report);
                })
        } else {
            pipeline
                .run(&file_path, &cancel)
                .await
                .map(|report| print_run_report(&report))
        };

        match result {
            Ok(()) => processed += 1,
            Err(e @ PipelineError::Fatal { .. }) => {
                error!("Aborting: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                failed += 1;
                error!("Error processing {}: {}", file_path.display(), e);
                eprintln!("❌ {}", e);
            }
        }
    }

    let duration = start_time.elapsed();
    info!(
        "Completed: {} processed, {} failed in {:?}",
        processed, failed, duration
    );

    println!("\n✅ Done");
    println!("   Processed: {}", processed);
    println!("   Failed: {}", failed);
    if args.dry_run {
        println!("   Estimated cost: ₹{:.2}", estimated_total);
    } else {
        let spent = tracker.get_stats().await;
        println!(
            "   Spent: ₹{:.2} (English {} chars, Tamil {} chars)",
            spent.spent(),
            spent.english_chars,
            spent.tamil_chars
        );
    }
    println!("   Time: {:?}", duration);

    if failed > 0 {
        anyhow::bail!("{} file(s) failed", failed);
    }
    Ok(())
}

fn print_run_report(report: &PipelineReport) {
    println!(
        "   Pages {}-{}: {} completed, {} failed, {} already done",
        report.page_range.0,
        report.page_range.1,
        report.pages_completed,
        report.pages_failed,
        report.pages_skipped
    );
    println!(
        "   Cost: ₹{:.2} this run, ₹{:.2} total",
        report.run_cost_inr, report.total_cost_inr
    );
    if report.repetition_truncations > 0 {
        println!("   Repetition truncations: {}", report.repetition_truncations);
    }
    if report.budget_exhausted {
        println!("   ⚠️  Budget exhausted; rerun with a higher --budget to continue");
    }
    if report.cancelled {
        println!("   ⚠️  Cancelled; rerun to resume");
    }
    for (language, path) in &report.outputs {
        println!("   {}: {}", language, path.display());
    }
}

fn print_cost_report(report: &CostReport) {
    println!(
        "   Pages {}-{}: {} to translate, {} already done, {} without usable OCR",
        report.page_range.0,
        report.page_range.1,
        report.pages_estimated,
        report.pages_already_done,
        report.pages_unavailable
    );
    println!(
        "   English: {} chars in {} chunks, ₹{:.2}",
        report.english.chars, report.english.chunks, report.english.cost_inr
    );
    println!(
        "   Tamil:   {} chars in {} chunks, ₹{:.2}{}",
        report.tamil.chars,
        report.tamil.chunks,
        report.tamil.cost_inr,
        if report.exact { "" } else { " (approximate)" }
    );
    println!("   Total:   ₹{:.2}", report.total_inr);
    if !report.within_budget() {
        println!("   ⚠️  Exceeds budget of ₹{:.2}", report.budget_inr.unwrap_or_default());
    }
}

/// Handle status command
pub async fn handle_status(input: PathBuf, config: PipelineConfig) -> anyhow::Result<()> {
    let store = StateStore::new(&config.state_dir);

    for file_path in collect_inputs(&input)? {
        println!("\n📄 {}", file_path.display());
        match store.resume_info(&file_path)? {
            None => println!("   No saved progress"),
            Some(info) => {
                println!(
                    "   Pages {}-{} of {}: {} done ({:.0}%)",
                    info.page_range.0,
                    info.page_range.1,
                    info.total_pages,
                    info.pages_completed,
                    info.progress_percentage
                );
                println!("   Pending: {:?}", info.pending_pages);
                if !info.failed_pages.is_empty() {
                    println!("   Failed: {:?}", info.failed_pages);
                }
                println!(
                    "   Cost: ₹{:.2} (English ₹{:.2}, Tamil ₹{:.2})",
                    info.total_cost, info.english_cost, info.tamil_cost
                );
                println!("   Last updated: {}", info.last_updated.to_rfc3339());
                if info.stale {
                    println!("   ⚠️  PDF changed since this progress was saved; use --no-resume");
                }
            }
        }
    }

    Ok(())
}

/// Handle clear command
pub async fn handle_clear(input: PathBuf, config: PipelineConfig) -> anyhow::Result<()> {
    let store = StateStore::new(&config.state_dir);

    let mut cleared = 0;
    for file_path in collect_inputs(&input)? {
        if store.clear(&file_path)? {
            cleared += 1;
            println!("🗑️  Cleared {}", file_path.display());
        }
    }

    println!("\n✅ Cleared saved progress for {} file(s)", cleared);
    Ok(())
}
