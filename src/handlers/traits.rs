//! Conversation handler traits: the one interface used for router,
//! prompt-generator, and target calls alike.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text plus the conversation context forwarded to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRequest {
    pub text: String,
    pub language: String,
    pub conversation_id: String,
}

impl HandlerRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: "en".to_string(),
            conversation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    /// Same conversation context, different text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: self.language.clone(),
            conversation_id: self.conversation_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub text: String,
}

/// Failure of a single handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    #[error("handler '{0}' is not registered")]
    HandlerNotFound(String),
    #[error("handler '{handler_id}' failed: {message}")]
    Failed { handler_id: String, message: String },
    #[error("handler '{handler_id}' timed out after {timeout_secs}s")]
    Timeout { handler_id: String, timeout_secs: u64 },
}

impl InvocationError {
    pub fn handler_id(&self) -> &str {
        match self {
            Self::HandlerNotFound(id) => id,
            Self::Failed { handler_id, .. } | Self::Timeout { handler_id, .. } => handler_id,
        }
    }
}

/// A downstream conversational agent (an LLM endpoint, a webhook, or
/// another router).
#[async_trait]
pub trait ConversationHandler: Send + Sync {
    /// Handle one turn and return the reply text.
    async fn handle(&self, request: &HandlerRequest) -> anyhow::Result<String>;

    /// Implementation name, for logs.
    fn name(&self) -> &str;
}

/// Addresses handlers by id. The dispatcher only ever talks to this.
#[async_trait]
pub trait HandlerInvoker: Send + Sync {
    async fn invoke(
        &self,
        handler_id: &str,
        request: &HandlerRequest,
    ) -> Result<HandlerResponse, InvocationError>;
}
