//! Conversation handler subsystem.
//!
//! Every downstream agent, the router itself, and the optional prompt
//! generator are reached through [`HandlerInvoker::invoke`]. Concrete
//! transports implement [`ConversationHandler`] and are created from the
//! `[handlers.<id>]` config tables by [`create_handler`].

pub mod compatible;
pub mod extract;
pub mod registry;
pub mod traits;
pub mod webhook;

pub use compatible::OpenAiCompatibleHandler;
pub use registry::HandlerRegistry;
pub use traits::{
    ConversationHandler, HandlerInvoker, HandlerRequest, HandlerResponse, InvocationError,
};
pub use webhook::WebhookHandler;

use crate::config::{HandlerConfig, HandlerKind};
use anyhow::Context;
use std::sync::Arc;

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Redact API-key-like tokens (`sk-...`, `Bearer ...`, etc.) from text that
/// is about to be logged or shown to a user.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 5] = ["sk-", "Bearer ", "xoxb-", "ghp_", "github_pat_"];

    let mut scrubbed = input.to_string();
    for prefix in PREFIXES {
        let mut search_from = 0;
        while let Some(rel) = scrubbed[search_from..].find(prefix) {
            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);
            if end == content_start {
                search_from = content_start;
                continue;
            }
            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }
    scrubbed
}

/// Scrub secrets and cap the length of handler error text.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }
    let end = scrubbed
        .char_indices()
        .nth(MAX_API_ERROR_CHARS)
        .map_or(scrubbed.len(), |(i, _)| i);
    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized error from a failed HTTP response.
pub async fn api_error(handler: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read handler error body>".to_string());
    anyhow::anyhow!("{handler} returned {status}: {}", sanitize_api_error(&body))
}

/// API key for a handler: explicit config value, then `OPENAI_API_KEY`, then
/// `AGENT_ROUTER_API_KEY`.
fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    if let Some(key) = configured.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    ["OPENAI_API_KEY", "AGENT_ROUTER_API_KEY"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Factory: build the handler described by one `[handlers.<id>]` table.
pub fn create_handler(
    id: &str,
    config: &HandlerConfig,
) -> anyhow::Result<Arc<dyn ConversationHandler>> {
    match config.kind {
        HandlerKind::OpenAiCompatible => {
            let base_url = config
                .base_url
                .as_deref()
                .with_context(|| format!("handler '{id}' needs base_url"))?;
            let model = config
                .model
                .as_deref()
                .with_context(|| format!("handler '{id}' needs model"))?;
            let api_key = resolve_api_key(config.api_key.as_deref());
            Ok(Arc::new(
                OpenAiCompatibleHandler::new(id, base_url, model, api_key.as_deref())
                    .with_system_prompt(config.system_prompt.clone())
                    .with_temperature(config.temperature),
            ))
        }
        HandlerKind::Webhook => {
            let url = config
                .url
                .as_deref()
                .with_context(|| format!("handler '{id}' needs url"))?;
            Ok(Arc::new(WebhookHandler::new(id, url)))
        }
    }
}
