//! LLM classification client and its transports

pub mod anthropic;
pub mod classifier;
pub mod cli;
mod http_client;
pub mod json;
pub mod openai;
pub mod prompts;
pub mod rate_limit;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{
    apply_threshold, parse_response, truncate_text, Classification, Classifier, ClassifierSettings,
    ClassifyError, ModelVerdict, TRUNCATION_MARKER,
};
pub use rate_limit::RateLimiter;
pub use transport::{select_transport, LlmTransport, TransportError, TransportErrorKind};
