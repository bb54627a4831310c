//! Configuration management

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::models::{
    CostRate, Language, NumeralsFormat, OutputScript, SpeakerGender, TranslationMode,
    TranslationOptions,
};
use crate::core::retry::RetryPolicy;

/// Hard input ceiling of the translation endpoint, in characters
pub const API_CHAR_LIMIT: usize = 2000;

/// Prefix for environment overrides read by [`PipelineConfig::load`]
pub const ENV_PREFIX: &str = "TAMIL_TRANSLATE";

/// Configuration for the translation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api_key: String,
    pub api_endpoint: String,
    pub model: String,
    pub speaker_gender: SpeakerGender,
    pub translation_mode: TranslationMode,
    pub numerals_format: NumeralsFormat,
    pub output_script: Option<OutputScript>,
    pub source_language: Language,
    pub two_step_tamil: bool,
    pub max_chunk_size: usize,
    pub max_workers: usize,
    pub retry_backoff_ms: Vec<u64>,
    pub request_timeout_ms: u64,
    pub min_ocr_confidence: f64,
    pub cost_per_10k_chars: f64,
    pub max_cost_inr: Option<f64>,
    pub resume: bool,
    pub retry_failed: bool,
    pub default_test_pages: u32,
    pub ocr_dpi: u32,
    pub ocr_languages: String,
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("SARVAM_API_KEY").unwrap_or_default(),
            api_endpoint: std::env::var("API_ENDPOINT")
                .unwrap_or_else(|_| "https://api.sarvam.ai/translate".to_string()),
            model: "sarvam-translate:v1".to_string(),
            speaker_gender: SpeakerGender::Male,
            translation_mode: TranslationMode::Formal,
            numerals_format: NumeralsFormat::Native,
            output_script: None,
            source_language: Language::Sanskrit,
            two_step_tamil: true,
            max_chunk_size: 1800,
            max_workers: 5,
            retry_backoff_ms: vec![1000, 2000, 4000],
            request_timeout_ms: 30000,
            min_ocr_confidence: 0.80,
            cost_per_10k_chars: 20.0,
            max_cost_inr: None,
            resume: true,
            retry_failed: false,
            default_test_pages: 10,
            ocr_dpi: 400,
            ocr_languages: "san+hin".to_string(),
            output_dir: PathBuf::from("output"),
            state_dir: PathBuf::from("output/.state"),
        }
    }
}

impl PipelineConfig {
    /// Layer defaults, an optional config file and `TAMIL_TRANSLATE_*` variables
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let mut config: Self = builder.build()?.try_deserialize()?;

        if config.api_key.is_empty() {
            config.api_key = std::env::var("SARVAM_API_KEY").unwrap_or_default();
        }

        Ok(config)
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate everything except the API key
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_endpoint.is_empty() {
            return Err(anyhow::anyhow!("API endpoint is required"));
        }

        if !(100..API_CHAR_LIMIT).contains(&self.max_chunk_size) {
            return Err(anyhow::anyhow!(
                "max_chunk_size ({}) must be between 100 and {} (exclusive)",
                self.max_chunk_size,
                API_CHAR_LIMIT
            ));
        }

        if self.max_workers == 0 {
            return Err(anyhow::anyhow!("max_workers must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.min_ocr_confidence) {
            return Err(anyhow::anyhow!(
                "min_ocr_confidence ({}) must be between 0.0 and 1.0",
                self.min_ocr_confidence
            ));
        }

        if !(150..=600).contains(&self.ocr_dpi) {
            return Err(anyhow::anyhow!(
                "ocr_dpi ({}) must be between 150 and 600",
                self.ocr_dpi
            ));
        }

        if self.retry_backoff_ms.is_empty() {
            return Err(anyhow::anyhow!("retry_backoff_ms needs at least one entry"));
        }

        if self.cost_per_10k_chars < 0.0 {
            return Err(anyhow::anyhow!("cost_per_10k_chars must not be negative"));
        }

        if let Some(budget) = self.max_cost_inr {
            if budget <= 0.0 {
                return Err(anyhow::anyhow!("max_cost_inr must be greater than 0"));
            }
        }

        if matches!(self.source_language, Language::English | Language::Tamil) {
            warn!(
                "Source language {} is unusual for Devanagari scans",
                self.source_language
            );
        }

        self.translation_options()?;

        Ok(())
    }

    /// Validate the API key separately so dry runs can skip it
    pub fn validate_api_key(&self) -> anyhow::Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "SARVAM_API_KEY not set. Get a key from https://dashboard.sarvam.ai"
            ));
        }
        Ok(())
    }

    /// Per-call options value
    pub fn translation_options(&self) -> anyhow::Result<TranslationOptions> {
        Ok(TranslationOptions::new(
            self.model.clone(),
            self.speaker_gender,
            self.translation_mode,
            self.numerals_format,
            self.output_script,
        )?)
    }

    /// Backoff schedule for transient failures
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_backoff_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }

    /// Billing rate
    pub fn cost_rate(&self) -> CostRate {
        CostRate::new(self.cost_per_10k_chars)
    }

    /// Per-call HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
