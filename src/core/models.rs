//! Core data models for translation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::TranslationError;

/// Languages the pipeline knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Sanskrit (Devanagari source)
    Sanskrit,
    /// Hindi (Devanagari source)
    Hindi,
    /// English (output and pivot)
    English,
    /// Tamil (output)
    Tamil,
}

impl Language {
    /// API language code with region
    pub fn code(&self) -> &'static str {
        match self {
            Language::Sanskrit => "sa-IN",
            Language::Hindi => "hi-IN",
            Language::English => "en-IN",
            Language::Tamil => "ta-IN",
        }
    }

    /// Lowercase name used in file names and state
    pub fn name(&self) -> &'static str {
        match self {
            Language::Sanskrit => "sanskrit",
            Language::Hindi => "hindi",
            Language::English => "english",
            Language::Tamil => "tamil",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Language {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sanskrit" | "sa" | "sa-in" => Ok(Language::Sanskrit),
            "hindi" | "hi" | "hi-in" => Ok(Language::Hindi),
            "english" | "en" | "en-in" => Ok(Language::English),
            "tamil" | "ta" | "ta-in" => Ok(Language::Tamil),
            other => Err(TranslationError::ConfigError {
                message: format!(
                    "Unsupported language: {}. Supported: sanskrit, hindi, english, tamil",
                    other
                ),
            }),
        }
    }
}

/// Speaker gender hint sent with each request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeakerGender {
    Male,
    Female,
}

/// Register of the translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationMode {
    Formal,
    ModernColloquial,
    ClassicColloquial,
    CodeMixed,
}

/// How digits are written in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumeralsFormat {
    /// Script-native digits (traditional texts)
    Native,
    /// 0-9
    International,
}

/// Output script transliteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputScript {
    Roman,
    FullyNative,
    SpokenFormInNative,
}

/// Immutable per-call options, validated once and passed by value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationOptions {
    pub model: String,
    pub speaker_gender: SpeakerGender,
    pub mode: TranslationMode,
    pub numerals_format: NumeralsFormat,
    pub output_script: Option<OutputScript>,
}

impl TranslationOptions {
    /// Build options, rejecting combinations the model cannot serve
    pub fn new(
        model: impl Into<String>,
        speaker_gender: SpeakerGender,
        mode: TranslationMode,
        numerals_format: NumeralsFormat,
        output_script: Option<OutputScript>,
    ) -> Result<Self, TranslationError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(TranslationError::ConfigError {
                message: "model must not be empty".to_string(),
            });
        }
        // sarvam-translate only serves the formal register
        if model.starts_with("sarvam-translate") && mode != TranslationMode::Formal {
            return Err(TranslationError::ConfigError {
                message: format!("model {} only supports formal mode", model),
            });
        }
        Ok(Self {
            model,
            speaker_gender,
            mode,
            numerals_format,
            output_script,
        })
    }
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            model: "sarvam-translate:v1".to_string(),
            speaker_gender: SpeakerGender::Male,
            mode: TranslationMode::Formal,
            numerals_format: NumeralsFormat::Native,
            output_script: None,
        }
    }
}

/// Translation request for one chunk
#[derive(Debug, Clone, Serialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: Language,
    pub target_lang: Language,
    pub options: TranslationOptions,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: Language,
        target_lang: Language,
        options: TranslationOptions,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang,
            target_lang,
            options,
        }
    }
}

/// Per-10,000-character billing rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRate {
    pub inr_per_10k_chars: f64,
}

impl CostRate {
    pub fn new(inr_per_10k_chars: f64) -> Self {
        Self { inr_per_10k_chars }
    }

    /// Cost in INR of billing `chars` characters
    pub fn cost_of(&self, chars: u64) -> f64 {
        chars as f64 * self.inr_per_10k_chars / 10_000.0
    }
}

impl Default for CostRate {
    fn default() -> Self {
        Self::new(20.0)
    }
}

/// Number of billable characters in `text`
pub fn billable_chars(text: &str) -> u64 {
    text.chars().count() as u64
}

/// Translation result for one chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub chunk_index: usize,
    pub translation: String,
    pub source_lang: Language,
    pub target_lang: Language,
    pub billed_chars: u64,
    pub cost_inr: f64,
    pub retries: u32,
    pub repetition_truncated: bool,
}

/// Exact cost of translating a text without sending it
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub chunks: usize,
    pub chars: u64,
    pub cost_inr: f64,
}

impl CostEstimate {
    /// Combine two estimates
    pub fn add(&self, other: &CostEstimate) -> CostEstimate {
        CostEstimate {
            chunks: self.chunks + other.chunks,
            chars: self.chars + other.chars,
            cost_inr: self.cost_inr + other.cost_inr,
        }
    }
}

/// Spend tracking for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLedger {
    pub budget_inr: Option<f64>,
    pub english_chars: u64,
    pub tamil_chars: u64,
    pub english_inr: f64,
    pub tamil_inr: f64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl CostLedger {
    pub fn new(budget_inr: Option<f64>) -> Self {
        Self {
            budget_inr,
            english_chars: 0,
            tamil_chars: 0,
            english_inr: 0.0,
            tamil_inr: 0.0,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn spent(&self) -> f64 {
        self.english_inr + self.tamil_inr
    }

    pub fn remaining(&self) -> Option<f64> {
        self.budget_inr.map(|b| (b - self.spent()).max(0.0))
    }

    pub fn can_spend(&self, cost_inr: f64) -> bool {
        match self.remaining() {
            Some(remaining) => cost_inr <= remaining + 1e-9,
            None => true,
        }
    }

    pub fn record(&mut self, language: Language, chars: u64, cost_inr: f64) {
        match language {
            Language::Tamil => {
                self.tamil_chars += chars;
                self.tamil_inr += cost_inr;
            }
            _ => {
                self.english_chars += chars;
                self.english_inr += cost_inr;
            }
        }
    }
}
