//! Translation client with retry logic and a pluggable transport

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

use crate::core::config::PipelineConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{
    billable_chars, CostRate, Language, TranslationOptions, TranslationRequest,
    TranslationResult,
};
use crate::core::retry::{Attempt, RetryPolicy};
use crate::text::repetition::RepetitionGuard;

/// Error bodies that mean "slow down" even when the status says otherwise
static RATE_LIMIT_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(quota|rate[ _-]?limit)").expect("valid regex"));

/// Error bodies that mean the credential was rejected
static AUTH_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)invalid_api_key|invalid api key").expect("valid regex"));

/// One remote translation call, no retries
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Translate `request.text`, returning the raw translated text
    async fn translate(&self, request: &TranslationRequest) -> Result<String>;
}

#[async_trait]
impl<B: TranslationBackend + ?Sized> TranslationBackend for Arc<B> {
    async fn translate(&self, request: &TranslationRequest) -> Result<String> {
        (**self).translate(request).await
    }
}

/// Sarvam AI `/translate` endpoint
#[derive(Debug, Clone)]
pub struct SarvamBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SarvamResponse {
    translated_text: String,
    #[serde(default)]
    request_id: Option<String>,
}

impl SarvamBackend {
    /// Create a backend with a pooled HTTP client
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// Create from pipeline configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(
            config.api_endpoint.clone(),
            config.api_key.clone(),
            config.request_timeout(),
        )
    }

    fn classify_failure(status: u16, body: String) -> TranslationError {
        if AUTH_BODY.is_match(&body) {
            return TranslationError::AuthError {
                status,
                message: body,
            };
        }
        if status != 429 && RATE_LIMIT_BODY.is_match(&body) {
            return TranslationError::RateLimitError { retry_after: None };
        }
        TranslationError::from_status(status, body)
    }
}

#[async_trait]
impl TranslationBackend for SarvamBackend {
    async fn translate(&self, request: &TranslationRequest) -> Result<String> {
        let options = &request.options;
        let mut body = serde_json::json!({
            "input": request.text,
            "source_language_code": request.source_lang.code(),
            "target_language_code": request.target_lang.code(),
            "speaker_gender": options.speaker_gender,
            "mode": options.mode,
            "model": options.model,
            "numerals_format": options.numerals_format,
        });

        if let Some(script) = options.output_script {
            body["output_script"] = serde_json::json!(script);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-subscription-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            let parsed: SarvamResponse = response
                .json()
                .await
                .map_err(|e| TranslationError::InvalidResponseError {
                    message: e.to_string(),
                })?;

            debug!("Sarvam request {:?} ok", parsed.request_id);
            Ok(parsed.translated_text)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(Self::classify_failure(status.as_u16(), error_text))
        }
    }
}

/// Retrying client that turns one chunk into a costed [`TranslationResult`]
#[derive(Debug, Clone)]
pub struct TranslationClient<B> {
    backend: B,
    retry: RetryPolicy,
    rate: CostRate,
    guard: RepetitionGuard,
}

impl<B: TranslationBackend> TranslationClient<B> {
    /// Create a client around a backend
    pub fn new(backend: B, retry: RetryPolicy, rate: CostRate) -> Self {
        Self {
            backend,
            retry,
            rate,
            guard: RepetitionGuard::default(),
        }
    }

    /// Replace the repetition guard
    pub fn with_guard(mut self, guard: RepetitionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Billing rate used for results
    pub fn rate(&self) -> CostRate {
        self.rate
    }

    /// Access the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Translate one chunk with the bounded retry policy
    pub async fn translate(
        &self,
        chunk_index: usize,
        text: &str,
        source_lang: Language,
        target_lang: Language,
        options: TranslationOptions,
    ) -> Result<TranslationResult> {
        let request = TranslationRequest::new(text, source_lang, target_lang, options);
        let backend = &self.backend;
        let request = &request;

        let outcome = self
            .retry
            .run(move |_| async move { Attempt::from(backend.translate(request).await) })
            .await?;

        let (translation, repetition_truncated) = self.guard.clean(&outcome.value);
        let billed_chars = billable_chars(text);

        Ok(TranslationResult {
            chunk_index,
            translation,
            source_lang,
            target_lang,
            billed_chars,
            cost_inr: self.rate.cost_of(billed_chars),
            retries: outcome.retries,
            repetition_truncated,
        })
    }
}
