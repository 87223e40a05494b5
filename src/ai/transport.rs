//! Transport seam between the classifier and a concrete LLM backend

use async_trait::async_trait;
use std::sync::Arc;

use super::anthropic::AnthropicTransport;
use super::cli::CliTransport;
use super::openai::OpenAiTransport;
use crate::config::{ConfigError, LlmConfig};

/// Whether a failed call is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Rate limits, timeouts, connection drops, server errors
    Transient,
    /// Bad credentials, exhausted quota, malformed requests, missing CLI
    Fatal,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == TransportErrorKind::Fatal
    }

    /// Build an error from a non-success HTTP response
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("API error ({}): {}", status, body.trim());
        match classify_status(status, body) {
            TransportErrorKind::Transient => Self::transient(message),
            TransportErrorKind::Fatal => Self::fatal(message),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::fatal(format!("Invalid request: {}", e))
        } else {
            Self::transient(format!("Request failed: {}", e))
        }
    }
}

/// Map an HTTP status to a retry decision.
///
/// A 429 that reports an exhausted quota will not clear by waiting.
pub fn classify_status(status: u16, body: &str) -> TransportErrorKind {
    match status {
        429 if body.contains("insufficient_quota") => TransportErrorKind::Fatal,
        408 | 409 | 425 | 429 => TransportErrorKind::Transient,
        500..=599 => TransportErrorKind::Transient,
        _ => TransportErrorKind::Fatal,
    }
}

/// A backend that turns a prompt into the model's raw text reply
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Provider name recorded alongside each decision
    fn provider(&self) -> &str;

    async fn send(&self, prompt: &str, model: &str) -> Result<String, TransportError>;
}

/// Pick the transport for the configured mode and provider
pub fn select_transport(
    llm: &LlmConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn LlmTransport>, ConfigError> {
    let timeout = llm.rate_limit.request_timeout();
    let provider = llm.provider.to_lowercase();

    if llm.is_cli() {
        let transport = CliTransport::for_provider(&provider, timeout).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unsupported CLI provider {:?} (expected \"claude\" or \"codex\")",
                llm.provider
            ))
        })?;
        return Ok(Arc::new(transport));
    }

    match provider.as_str() {
        "anthropic" => {
            let key = api_key.ok_or_else(|| ConfigError::MissingApiKey(llm.api_key_env.clone()))?;
            Ok(Arc::new(AnthropicTransport::new(
                key,
                llm.base_url.clone(),
                timeout,
            )))
        }
        _ => Ok(Arc::new(OpenAiTransport::new(
            provider,
            api_key,
            llm.effective_base_url(),
            timeout,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(429, "slow down"), TransportErrorKind::Transient);
        assert_eq!(classify_status(503, ""), TransportErrorKind::Transient);
        assert_eq!(classify_status(408, ""), TransportErrorKind::Transient);
        assert_eq!(classify_status(401, ""), TransportErrorKind::Fatal);
        assert_eq!(classify_status(400, "bad model"), TransportErrorKind::Fatal);
        assert_eq!(
            classify_status(429, r#"{"error":{"code":"insufficient_quota"}}"#),
            TransportErrorKind::Fatal
        );
    }

    #[test]
    fn test_select_transport() {
        let mut llm = LlmConfig::default();
        let transport = select_transport(&llm, Some("k".to_string())).unwrap();
        assert_eq!(transport.provider(), "openai");

        llm.provider = "anthropic".to_string();
        assert!(matches!(
            select_transport(&llm, None),
            Err(ConfigError::MissingApiKey(_))
        ));
        let transport = select_transport(&llm, Some("k".to_string())).unwrap();
        assert_eq!(transport.provider(), "anthropic");

        llm.mode = "cli".to_string();
        llm.provider = "claude".to_string();
        assert_eq!(select_transport(&llm, None).unwrap().provider(), "claude");

        llm.provider = "gemini".to_string();
        assert!(matches!(
            select_transport(&llm, None),
            Err(ConfigError::Invalid(_))
        ));
    }
}
