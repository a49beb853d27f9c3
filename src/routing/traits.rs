//! Routing types: the per-request decision record, match kinds, fallback
//! reasons, dispatcher states, and the errors the dispatcher can surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::handlers::InvocationError;

/// How the resolver tied a classification answer to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    /// Answer (minus routing marker) equals an agent name.
    Exact,
    /// Answer contains an agent name.
    Substring,
    /// Every token of the agent name appears in the answer.
    TokenOverlap { score: f64 },
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
            Self::TokenOverlap { .. } => "token_overlap",
        }
    }
}

/// Why the dispatcher fell back to the first configured agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RouterFailed,
    NoMatch,
}

impl FallbackReason {
    pub const ALL: [FallbackReason; 2] = [FallbackReason::RouterFailed, FallbackReason::NoMatch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RouterFailed => "router_failed",
            Self::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the router prompt used for a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    /// Deterministic built-in template.
    Static,
    /// Produced by the prompt-generator handler during this process lifetime.
    Generated,
    /// Loaded from the persisted `router.stored_prompt`.
    Stored,
}

impl PromptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Generated => "generated",
            Self::Stored => "stored",
        }
    }
}

/// Dispatcher state machine positions, used as the `state` field of
/// transition log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Start,
    PromptReady,
    Classified,
    Resolved,
    Fallback,
    Dispatched,
    Done,
}

impl DispatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::PromptReady => "prompt_ready",
            Self::Classified => "classified",
            Self::Resolved => "resolved",
            Self::Fallback => "fallback",
            Self::Dispatched => "dispatched",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of the target invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Answered,
    TargetFailed { error: String },
}

/// One conversational turn handed to the router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub text: String,
    /// Defaults to `router.language` when absent.
    pub language: Option<String>,
    /// A fresh id is generated when absent.
    pub conversation_id: Option<String>,
}

impl ConversationTurn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            conversation_id: None,
        }
    }
}

impl From<&str> for ConversationTurn {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Everything the dispatcher decided for one request. Enough to reconstruct
/// the decision path offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub decision_id: String,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    pub input_text: String,
    pub prompt_text: String,
    pub prompt_source: PromptSource,
    pub raw_classification: Option<String>,
    pub matched_agent: Option<String>,
    pub match_kind: Option<MatchKind>,
    pub fallback: Option<FallbackReason>,
    pub target_agent: String,
    pub target_handler_id: String,
    pub outcome: DispatchOutcome,
    pub final_response_text: String,
}

impl RoutingDecision {
    pub fn fallback_used(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn fallback_reason(&self) -> Option<&'static str> {
        self.fallback.as_ref().map(FallbackReason::as_str)
    }

    pub fn target_failed(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::TargetFailed { .. })
    }
}

/// Errors the dispatcher and its components can raise.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("no agents are configured for this router")]
    NoAgentsConfigured,
    #[error("router handler '{handler_id}' is unavailable: {source}")]
    RouterUnavailable {
        handler_id: String,
        #[source]
        source: InvocationError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_reason_serializes_snake_case() {
        let json = serde_json::to_string(&FallbackReason::RouterFailed).unwrap();
        assert_eq!(json, "\"router_failed\"");
        assert_eq!(FallbackReason::NoMatch.to_string(), "no_match");
    }

    #[test]
    fn match_kind_carries_overlap_score() {
        let kind = MatchKind::TokenOverlap { score: 1.0 };
        let json = serde_json::to_value(kind).unwrap();
        assert_eq!(json["kind"], "token_overlap");
        assert_eq!(json["score"], 1.0);
        assert_eq!(kind.as_str(), "token_overlap");
    }

    #[test]
    fn router_unavailable_mentions_handler() {
        let err = RoutingError::RouterUnavailable {
            handler_id: "router".into(),
            source: InvocationError::HandlerNotFound("router".into()),
        };
        assert!(err.to_string().contains("'router'"));
    }
}
