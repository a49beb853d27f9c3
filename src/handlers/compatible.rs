//! Conversation handler backed by an OpenAI-compatible chat completions API.
//! Most hosted and local LLM servers speak this format.

use super::traits::{ConversationHandler, HandlerRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OpenAiCompatibleHandler {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) api_key: Option<String>,
    system_prompt: Option<String>,
    temperature: f64,
    client: Client,
}

impl OpenAiCompatibleHandler {
    pub fn new(name: &str, base_url: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(ToString::to_string),
            system_prompt: None,
            temperature: 0.7,
            client: Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Full chat completions URL. A base URL that already ends in
    /// `/chat/completions` is used as-is.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| self.base_url.ends_with("/chat/completions"));

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn build_request(&self, text: &str) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(sys) = &self.system_prompt {
            messages.push(Message {
                role: "system".to_string(),
                content: sys.clone(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: text.to_string(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            stream: Some(false),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ConversationHandler for OpenAiCompatibleHandler {
    async fn handle(&self, request: &HandlerRequest) -> anyhow::Result<String> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "{} API key not set. Add api_key to [handlers.{}] or set OPENAI_API_KEY.",
                self.name,
                self.name
            )
        })?;

        let body = self.build_request(&request.text);
        let response = self
            .client
            .post(self.chat_completions_url())
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error(&self.name, response).await);
        }

        let chat_response: ApiChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| anyhow::anyhow!("No response from {}", self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
