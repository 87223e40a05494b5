//! Anthropic Messages API transport

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::http_client::llm_client;
use super::transport::{LlmTransport, TransportError};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

pub struct AnthropicTransport {
    api_key: String,
    url: String,
    timeout: Duration,
}

impl AnthropicTransport {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Self {
        let url = match base_url {
            Some(base) => format!("{}/v1/messages", base.trim_end_matches('/')),
            None => ANTHROPIC_API_URL.to_string(),
        };
        Self {
            api_key,
            url,
            timeout,
        }
    }
}

/// Concatenate the text blocks of a reply
fn collect_text(response: ApiResponse) -> String {
    response
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl LlmTransport for AnthropicTransport {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn send(&self, prompt: &str, model: &str) -> Result<String, TransportError> {
        let request = ApiRequest {
            model,
            max_tokens: MAX_OUTPUT_TOKENS,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = llm_client()
            .post(&self.url)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), &body));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| TransportError::transient(format!("Failed to parse response: {}", e)))?;

        Ok(collect_text(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_text_skips_non_text_blocks() {
        let raw = r#"{"content":[
            {"type":"thinking","thinking":"hmm"},
            {"type":"text","text":"{\"classification\":"},
            {"type":"text","text":"\"evergreen\"}"}
        ],"stop_reason":"end_turn"}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(collect_text(parsed), r#"{"classification":"evergreen"}"#);
    }

    #[test]
    fn test_base_url_override() {
        let t = AnthropicTransport::new(
            "k".to_string(),
            Some("http://proxy.local/".to_string()),
            Duration::from_secs(1),
        );
        assert_eq!(t.url, "http://proxy.local/v1/messages");
    }
}
