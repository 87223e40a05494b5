//! Shared HTTP client
//!
//! One lazily built client for every provider so connections and TLS sessions
//! are reused across classification calls. Per-request timeouts come from the
//! config and are set on each request builder.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

static LLM_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
});

/// Get the global LLM HTTP client
#[inline]
pub fn llm_client() -> &'static Client {
    &LLM_CLIENT
}
