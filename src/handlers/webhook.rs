//! Conversation handler that POSTs the turn as JSON to an HTTP endpoint and
//! extracts the reply from whatever shape comes back.

use super::extract::extract_reply;
use super::traits::{ConversationHandler, HandlerRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

pub struct WebhookHandler {
    name: String,
    url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    language: &'a str,
    conversation_id: &'a str,
}

impl WebhookHandler {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client: Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

/// Reply text from a raw response body: JSON shapes first, then plain text.
fn reply_from_body(body: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => extract_reply(&value),
        Err(_) => {
            let text = body.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}

#[async_trait]
impl ConversationHandler for WebhookHandler {
    async fn handle(&self, request: &HandlerRequest) -> anyhow::Result<String> {
        let payload = WebhookPayload {
            text: &request.text,
            language: &request.language,
            conversation_id: &request.conversation_id,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        let body = response.text().await?;
        tracing::debug!(handler = %self.name, bytes = body.len(), "Webhook responded");
        reply_from_body(&body)
            .ok_or_else(|| anyhow::anyhow!("{} returned no extractable reply", self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_conversation_context() {
        let request = HandlerRequest::new("lock the door")
            .with_language("en")
            .with_conversation_id("c-9");
        let payload = WebhookPayload {
            text: &request.text,
            language: &request.language,
            conversation_id: &request.conversation_id,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["text"], "lock the door");
        assert_eq!(json["conversation_id"], "c-9");
    }

    #[test]
    fn json_body_goes_through_extraction() {
        let body = r#"{"response":{"speech":{"plain":{"speech":"Door locked."}}}}"#;
        assert_eq!(reply_from_body(body).as_deref(), Some("Door locked."));
    }

    #[test]
    fn plain_text_body_is_used_verbatim() {
        assert_eq!(reply_from_body("  Door locked.\n").as_deref(), Some("Door locked."));
        assert_eq!(reply_from_body("   "), None);
    }

    #[test]
    fn json_without_reply_is_none() {
        assert_eq!(reply_from_body(r#"{"ok":true}"#), None);
    }

    #[test]
    fn name_is_handler_id() {
        assert_eq!(WebhookHandler::new("lights", "http://localhost/x").name(), "lights");
    }
}
