//! Classification client
//!
//! Wraps one LLM transport with truncation, prompt construction, strict reply
//! parsing, confidence thresholding and a transient-only retry loop. Every
//! outbound attempt goes through the shared rate limiter.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::json::extract_json_object;
use super::prompts::{build_classify_prompt, build_summary_prompt};
use super::rate_limit::RateLimiter;
use super::transport::{LlmTransport, TransportError};
use crate::config::Config;
use crate::ledger::Triage;

/// Inserted between the kept head and tail of over-long text
pub const TRUNCATION_MARKER: &str = "\n\n[...truncated...]\n\n";

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Transient failures outlasted the retry budget; recorded per file
    #[error("LLM call failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
    /// Halts the whole run
    #[error("fatal LLM error: {0}")]
    Fatal(TransportError),
}

impl ClassifyError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Exactly the object the model is asked to return
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelVerdict {
    pub classification: Triage,
    pub confidence: f64,
    pub reason: String,
    pub topics: Vec<String>,
}

/// Outcome of one classification, after thresholding
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub triage: Triage,
    /// As reported by the model; `None` when the reply was unusable
    pub confidence: Option<f64>,
    pub reason: String,
    pub topics: Vec<String>,
    pub truncated: bool,
    /// Set when the reply could not be parsed
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    pub confidence_threshold: f64,
    /// Input budget in characters
    pub max_input_chars: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub summarize: bool,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ClassifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            confidence_threshold: config.triage.confidence_threshold,
            max_input_chars: config.triage.max_input_tokens,
            max_retries: config.llm.rate_limit.max_retries,
            retry_delay: config.llm.rate_limit.retry_delay(),
            summarize: config.text_extraction.llm_summary_enabled,
        }
    }

    /// The prompt as it would be sent, without any summary step
    pub fn preview_prompt(&self, filename: &str, extension: &str, text: &str, truncated: bool) -> String {
        let (body, cut) = truncate_text(text, self.max_input_chars);
        build_classify_prompt(filename, extension, &body, truncated || cut)
    }
}

/// Keep a head and a tail of `text` within `max_chars`, dropping the middle.
///
/// The head gets two thirds of the budget left after the marker. Returns the
/// text unchanged and `false` when it already fits.
pub fn truncate_text(text: &str, max_chars: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= max_chars {
        return (text.to_string(), false);
    }

    let byte_at = |n: usize| {
        text.char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(text.len())
    };

    // No room for the marker: keep a plain head within budget
    let marker_chars = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_chars {
        return (text[..byte_at(max_chars)].to_string(), true);
    }

    let available = max_chars - marker_chars;
    let head_chars = available * 2 / 3;
    let tail_chars = available - head_chars;

    let head_end = byte_at(head_chars);
    let tail_start = byte_at(total - tail_chars);

    let mut out = String::with_capacity(head_end + TRUNCATION_MARKER.len() + text.len() - tail_start);
    out.push_str(&text[..head_end]);
    out.push_str(TRUNCATION_MARKER);
    out.push_str(&text[tail_start..]);
    (out, true)
}

/// Parse a reply into a verdict, rejecting anything but the exact shape
pub fn parse_response(raw: &str) -> Result<ModelVerdict, String> {
    let json = extract_json_object(raw)?;
    let verdict: ModelVerdict =
        serde_json::from_str(json).map_err(|e| format!("Invalid JSON reply: {}", e))?;

    if !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(format!(
            "confidence {} is outside [0, 1]",
            verdict.confidence
        ));
    }

    Ok(verdict)
}

/// Force `unknown` below the threshold, keeping confidence and reason
pub fn apply_threshold(verdict: ModelVerdict, threshold: f64, truncated: bool) -> Classification {
    let triage = if verdict.confidence < threshold {
        if verdict.classification != Triage::Unknown {
            tracing::info!(
                confidence = verdict.confidence,
                threshold,
                "Confidence below threshold: {} -> unknown",
                verdict.classification
            );
        }
        Triage::Unknown
    } else {
        verdict.classification
    };

    Classification {
        triage,
        confidence: Some(verdict.confidence),
        reason: verdict.reason,
        topics: verdict.topics,
        truncated,
        error: None,
    }
}

fn interpret(raw: &str, threshold: f64, truncated: bool) -> Classification {
    match parse_response(raw) {
        Ok(verdict) => apply_threshold(verdict, threshold, truncated),
        Err(e) => {
            tracing::warn!("Unusable model response: {}", e);
            Classification {
                triage: Triage::Unknown,
                confidence: None,
                reason: raw.trim().to_string(),
                topics: Vec::new(),
                truncated,
                error: Some(format!("Invalid model response: {}", e)),
            }
        }
    }
}

pub struct Classifier {
    transport: Arc<dyn LlmTransport>,
    limiter: Arc<RateLimiter>,
    model: String,
    settings: ClassifierSettings,
}

impl Classifier {
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        limiter: Arc<RateLimiter>,
        model: impl Into<String>,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            transport,
            limiter,
            model: model.into(),
            settings,
        }
    }

    pub fn provider(&self) -> &str {
        self.transport.provider()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Classify with the configured threshold
    pub async fn classify(
        &self,
        text: &str,
        filename: &str,
        extension: &str,
        truncated: bool,
    ) -> Result<Classification, ClassifyError> {
        self.classify_with_threshold(text, filename, extension, truncated, self.settings.confidence_threshold)
            .await
    }

    pub async fn classify_with_threshold(
        &self,
        text: &str,
        filename: &str,
        extension: &str,
        truncated: bool,
        threshold: f64,
    ) -> Result<Classification, ClassifyError> {
        let (body, cut) = truncate_text(text, self.settings.max_input_chars);
        let truncated = truncated || cut;
        if cut {
            tracing::debug!(
                original = text.chars().count(),
                budget = self.settings.max_input_chars,
                "Truncated document text"
            );
        }

        let body = if self.settings.summarize {
            self.summarize(&body, filename).await?
        } else {
            body
        };

        let prompt = build_classify_prompt(filename, extension, &body, truncated);
        let raw = self.call(&prompt).await?;
        tracing::debug!("LLM response: {}", raw);

        Ok(interpret(&raw, threshold, truncated))
    }

    /// Summarise `text`, falling back to it on any non-fatal failure
    pub async fn summarize(&self, text: &str, filename: &str) -> Result<String, ClassifyError> {
        let prompt = build_summary_prompt(filename, text);
        match self.call(&prompt).await {
            Ok(summary) if !summary.trim().is_empty() => Ok(summary.trim().to_string()),
            Ok(_) => {
                tracing::warn!("Empty summary response, using original text");
                Ok(text.to_string())
            }
            Err(ClassifyError::Exhausted { message, .. }) => {
                tracing::warn!("Summary failed, using original text: {}", message);
                Ok(text.to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Send with retries; backoff doubles from `retry_delay`
    async fn call(&self, prompt: &str) -> Result<String, ClassifyError> {
        let attempts = self.settings.max_retries + 1;
        let mut delay = self.settings.retry_delay;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            self.limiter.acquire().await;

            match self.transport.send(prompt, &self.model).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_fatal() => {
                    tracing::error!(attempt, "Fatal LLM error: {}", e);
                    return Err(ClassifyError::Fatal(e));
                }
                Err(e) => {
                    last_error = e.message;
                    if attempt < attempts {
                        tracing::warn!(
                            attempt,
                            max_attempts = attempts,
                            "Transient LLM error, retrying in {}s: {}",
                            delay.as_secs_f64(),
                            last_error
                        );
                        tokio::time::sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }

        Err(ClassifyError::Exhausted {
            attempts,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{verdict_json, ScriptedTransport};
    use tokio::time::Instant;

    fn settings() -> ClassifierSettings {
        ClassifierSettings {
            confidence_threshold: 0.7,
            max_input_chars: 8000,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            summarize: false,
        }
    }

    fn classifier(transport: Arc<ScriptedTransport>, settings: ClassifierSettings) -> Classifier {
        Classifier::new(transport, Arc::new(RateLimiter::unlimited()), "test-model", settings)
    }

    #[test]
    fn test_truncate_within_budget() {
        let (text, truncated) = truncate_text("short text", 100);
        assert_eq!(text, "short text");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_keeps_head_and_tail() {
        let text: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let (out, truncated) = truncate_text(&text, 200);
        assert!(truncated);

        let available = 200 - TRUNCATION_MARKER.chars().count();
        let head = available * 2 / 3;
        let tail = available - head;

        assert_eq!(out.chars().count(), 200);
        assert!(out.starts_with(&text[..head]));
        assert!(out.ends_with(&text[text.len() - tail..]));
        assert!(out.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_multibyte_is_char_safe() {
        let text = "日本語のテキスト".repeat(100);
        let (out, truncated) = truncate_text(&text, 50);
        assert!(truncated);
        assert_eq!(out.chars().count(), 50);
    }

    #[test]
    fn test_truncate_budget_below_marker_keeps_head() {
        let (out, truncated) = truncate_text("abcdefghijklmnopqrstuvwxyz", 10);
        assert!(truncated);
        assert_eq!(out, "abcdefghij");
    }

    #[test]
    fn test_parse_fenced_response() {
        let raw = format!("```json\n{}\n```", verdict_json("evergreen", 0.9));
        let verdict = parse_response(&raw).unwrap();
        assert_eq!(verdict.classification, Triage::Evergreen);
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(verdict.topics, vec!["testing".to_string()]);
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        assert!(parse_response("not json at all").is_err());
        assert!(parse_response(r#"{"classification":"evergreen","confidence":0.9,"reason":"r"}"#).is_err());
        assert!(parse_response(
            r#"{"classification":"evergreen","confidence":0.9,"reason":"r","topics":[],"extra":1}"#
        )
        .is_err());
        assert!(parse_response(
            r#"{"classification":"forever","confidence":0.9,"reason":"r","topics":[]}"#
        )
        .is_err());
        assert!(parse_response(
            r#"{"classification":"temporal","confidence":1.2,"reason":"r","topics":[]}"#
        )
        .is_err());
    }

    #[test]
    fn test_threshold_law() {
        for (label, confidence) in [("evergreen", 0.55), ("temporal", 0.69), ("unknown", 0.1)] {
            let verdict = parse_response(&verdict_json(label, confidence)).unwrap();
            let result = apply_threshold(verdict, 0.7, false);
            assert_eq!(result.triage, Triage::Unknown);
            assert_eq!(result.confidence, Some(confidence));
            assert_eq!(result.reason, "because");
        }

        let verdict = parse_response(&verdict_json("temporal", 0.7)).unwrap();
        assert_eq!(apply_threshold(verdict, 0.7, false).triage, Triage::Temporal);
    }

    #[tokio::test]
    async fn test_classify_success() {
        let transport = Arc::new(ScriptedTransport::always(&verdict_json("evergreen", 0.92)));
        let c = classifier(transport.clone(), settings());

        let result = c.classify("a manual", "manual.pdf", ".pdf", false).await.unwrap();
        assert_eq!(result.triage, Triage::Evergreen);
        assert_eq!(result.confidence, Some(0.92));
        assert!(!result.truncated);
        assert_eq!(transport.calls(), 1);
        assert!(transport.prompts()[0].contains("Truncated: false"));
    }

    #[tokio::test]
    async fn test_classify_flags_truncation_in_prompt() {
        let transport = Arc::new(ScriptedTransport::always(&verdict_json("temporal", 0.8)));
        let mut s = settings();
        s.max_input_chars = 100;
        let c = classifier(transport.clone(), s);

        let result = c.classify(&"x".repeat(500), "a.txt", ".txt", false).await.unwrap();
        assert!(result.truncated);
        let prompt = &transport.prompts()[0];
        assert!(prompt.contains("Truncated: true"));
        assert!(prompt.contains(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_extraction_truncation_carries_through() {
        let transport = Arc::new(ScriptedTransport::always(&verdict_json("temporal", 0.8)));
        let c = classifier(transport.clone(), settings());
        let result = c.classify("short", "a.txt", ".txt", true).await.unwrap();
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_unknown_not_error() {
        let transport = Arc::new(ScriptedTransport::always("I think it's evergreen"));
        let c = classifier(transport, settings());

        let result = c.classify("text", "a.txt", ".txt", false).await.unwrap();
        assert_eq!(result.triage, Triage::Unknown);
        assert_eq!(result.confidence, None);
        assert_eq!(result.reason, "I think it's evergreen");
        assert!(result.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retry_with_backoff() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::transient("429")),
            Err(TransportError::transient("503")),
            Ok(verdict_json("evergreen", 0.9)),
        ]));
        let c = classifier(transport.clone(), settings());
        let start = Instant::now();

        let result = c.classify("text", "a.txt", ".txt", false).await.unwrap();
        assert_eq!(result.triage, Triage::Evergreen);
        assert_eq!(transport.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(5 + 10));
        assert!(start.elapsed() < Duration::from_secs(5 + 10 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let transport = Arc::new(ScriptedTransport::new(
            (0..4).map(|_| Err(TransportError::transient("timeout"))).collect(),
        ));
        let c = classifier(transport.clone(), settings());
        let start = Instant::now();

        let err = c.classify("text", "a.txt", ".txt", false).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Exhausted { attempts: 4, .. }));
        assert!(!err.is_fatal());
        assert_eq!(transport.calls(), 4);
        assert!(start.elapsed() >= Duration::from_secs(5 + 10 + 20));
        assert!(start.elapsed() < Duration::from_secs(5 + 10 + 20 + 1));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::fatal("API error (401): invalid key")),
            Ok(verdict_json("evergreen", 0.9)),
        ]));
        let c = classifier(transport.clone(), settings());

        let err = c.classify("text", "a.txt", ".txt", false).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_summary_feeds_classification() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok("A short summary".to_string()),
            Ok(verdict_json("evergreen", 0.9)),
        ]));
        let mut s = settings();
        s.summarize = true;
        let c = classifier(transport.clone(), s);

        c.classify("long original body", "a.txt", ".txt", false).await.unwrap();
        let prompts = transport.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("A short summary"));
        assert!(!prompts[1].contains("long original body"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_falls_back_on_failure() {
        let mut script: Vec<Result<String, TransportError>> =
            (0..4).map(|_| Err(TransportError::transient("503"))).collect();
        script.push(Ok(verdict_json("temporal", 0.8)));
        let transport = Arc::new(ScriptedTransport::new(script));
        let mut s = settings();
        s.summarize = true;
        let c = classifier(transport.clone(), s);

        let result = c.classify("original body", "a.txt", ".txt", false).await.unwrap();
        assert_eq!(result.triage, Triage::Temporal);
        assert!(transport.prompts()[4].contains("original body"));
    }

    #[test]
    fn test_preview_prompt() {
        let prompt = settings().preview_prompt("a.md", ".md", "hello", false);
        assert!(prompt.contains("FILENAME: a.md"));
        assert!(prompt.contains("hello"));
    }
}
