use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

use super::classifier::Classifier;
use super::prompt::{BuiltPrompt, PromptBuilder, PromptCache};
use super::resolver::{resolve, Resolution};
use super::traits::{
    ConversationTurn, DispatchOutcome, DispatchState, FallbackReason, MatchKind, RoutingDecision,
    RoutingError,
};
use crate::config::ConfigSource;
use crate::handlers::{ConversationHandler, HandlerInvoker, HandlerRequest};
use crate::observability::{record_decision, RouterMetrics};

const NO_AGENTS_MESSAGE: &str =
    "Sorry, I can't help with that: no agents are configured for this router.";

fn target_failure_message(agent: &str) -> String {
    format!("Sorry, the {agent} agent couldn't handle that request. Please try again later.")
}

/// Routes each turn to one agent: classify with the router handler, resolve
/// the answer, fall back to the first agent when either step comes up empty,
/// then hand the original text to the target.
pub struct RouterDispatcher {
    name: String,
    source: Arc<dyn ConfigSource>,
    invoker: Arc<dyn HandlerInvoker>,
    prompts: PromptBuilder,
    classifier: Classifier,
    cache: PromptCache,
    metrics: Option<Arc<RouterMetrics>>,
    decision_trace: Option<PathBuf>,
}

impl RouterDispatcher {
    pub fn new(source: Arc<dyn ConfigSource>, invoker: Arc<dyn HandlerInvoker>) -> Self {
        Self {
            name: "router".to_string(),
            source,
            prompts: PromptBuilder::new(Arc::clone(&invoker)),
            classifier: Classifier::new(Arc::clone(&invoker)),
            invoker,
            cache: PromptCache::new(),
            metrics: None,
            decision_trace: None,
        }
    }

    /// Name reported when this router is itself registered as a handler.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_decision_trace(mut self, path: Option<PathBuf>) -> Self {
        self.decision_trace = path;
        self
    }

    /// Route `user_text` and return the reply. Never fails; an empty agent
    /// list yields a plain-language error message.
    pub async fn process(&self, user_text: &str) -> String {
        match self.route(ConversationTurn::new(user_text)).await {
            Ok(decision) => decision.final_response_text,
            Err(e) => {
                tracing::error!("Routing failed: {e}");
                NO_AGENTS_MESSAGE.to_string()
            }
        }
    }

    /// Route one turn and return the full decision record.
    ///
    /// The only error is [`RoutingError::NoAgentsConfigured`], raised before
    /// any handler is called. Router failures and unresolvable answers are
    /// recovered by falling back to the first agent; a failing target is
    /// reported in the decision, not as an error.
    pub async fn route(&self, turn: ConversationTurn) -> Result<RoutingDecision, RoutingError> {
        let decision_id = uuid::Uuid::new_v4().to_string();
        let snapshot = self.source.snapshot();
        tracing::info!(
            decision_id = %decision_id,
            state = %DispatchState::Start,
            input = %turn.text,
            agents = snapshot.agents.len(),
            "Routing request"
        );

        let Some(first) = snapshot.agents.first() else {
            tracing::error!(decision_id = %decision_id, "No agents configured");
            return Err(RoutingError::NoAgentsConfigured);
        };

        let mut request = HandlerRequest::new(turn.text)
            .with_language(turn.language.unwrap_or_else(|| snapshot.router.language.clone()));
        if let Some(conversation_id) = turn.conversation_id {
            request = request.with_conversation_id(conversation_id);
        }

        let prompt = self.cache.get_or_build(&snapshot);
        tracing::info!(
            decision_id = %decision_id,
            state = %DispatchState::PromptReady,
            prompt_source = prompt.source.as_str(),
            registry_fingerprint = %prompt.registry_fingerprint,
            "Router prompt ready"
        );
        tracing::debug!(decision_id = %decision_id, prompt = %prompt.text, "Router prompt text");

        let router_id = snapshot.router.router_handler_id.as_str();
        let mut raw_classification = None;
        let mut matched: Option<MatchKind> = None;
        let mut fallback = None;

        let target = match self
            .classifier
            .classify(&request, &prompt.text, router_id)
            .await
        {
            Ok(raw) => {
                tracing::info!(
                    decision_id = %decision_id,
                    state = %DispatchState::Classified,
                    raw_classification = %raw,
                    "Router answered"
                );
                let resolution = resolve(&raw, &snapshot.agents);
                raw_classification = Some(raw);
                match resolution {
                    Resolution::Matched { agent, kind } => {
                        tracing::info!(
                            decision_id = %decision_id,
                            state = %DispatchState::Resolved,
                            agent = %agent.name,
                            match_kind = kind.as_str(),
                            "Router answer resolved"
                        );
                        matched = Some(kind);
                        agent
                    }
                    Resolution::NoMatch => {
                        tracing::warn!(
                            decision_id = %decision_id,
                            state = %DispatchState::Fallback,
                            reason = %FallbackReason::NoMatch,
                            raw_classification = raw_classification.as_deref().unwrap_or_default(),
                            agent = %first.name,
                            "Router answer matched no agent, using fallback"
                        );
                        fallback = Some(FallbackReason::NoMatch);
                        first
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    decision_id = %decision_id,
                    state = %DispatchState::Fallback,
                    reason = %FallbackReason::RouterFailed,
                    agent = %first.name,
                    "Router unavailable, using fallback: {e}"
                );
                fallback = Some(FallbackReason::RouterFailed);
                first
            }
        };

        tracing::info!(
            decision_id = %decision_id,
            state = %DispatchState::Dispatched,
            agent = %target.name,
            handler = %target.handler_id,
            fallback = fallback.map_or("none", |r| r.as_str()),
            "Dispatching to agent"
        );

        let (outcome, final_response_text) =
            match self.invoker.invoke(&target.handler_id, &request).await {
                Ok(response) => (DispatchOutcome::Answered, response.text),
                Err(e) => {
                    tracing::error!(
                        decision_id = %decision_id,
                        agent = %target.name,
                        handler = %target.handler_id,
                        "Target agent failed: {e}"
                    );
                    (
                        DispatchOutcome::TargetFailed {
                            error: e.to_string(),
                        },
                        target_failure_message(&target.name),
                    )
                }
            };

        let decision = RoutingDecision {
            decision_id,
            timestamp: Utc::now(),
            conversation_id: request.conversation_id,
            input_text: request.text,
            prompt_text: prompt.text,
            prompt_source: prompt.source,
            raw_classification,
            matched_agent: matched.is_some().then(|| target.name.clone()),
            match_kind: matched,
            fallback,
            target_agent: target.name.clone(),
            target_handler_id: target.handler_id.clone(),
            outcome,
            final_response_text,
        };

        tracing::info!(
            decision_id = %decision.decision_id,
            state = %DispatchState::Done,
            agent = %decision.target_agent,
            outcome = if decision.target_failed() { "target_failed" } else { "answered" },
            "Routing complete"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(&decision);
        }
        if let Some(path) = &self.decision_trace {
            if let Err(e) = record_decision(path, &decision).await {
                tracing::warn!("Failed to write decision trace: {e:#}");
            }
        }

        Ok(decision)
    }

    /// Run the prompt generator for the current registry and make the result
    /// the active prompt. Falls back to the static template when the
    /// generator is missing or fails.
    pub async fn regenerate_prompt(&self) -> Result<BuiltPrompt, RoutingError> {
        let snapshot = self.source.snapshot();
        if snapshot.agents.is_empty() {
            return Err(RoutingError::NoAgentsConfigured);
        }
        let built = self.prompts.build(&snapshot.agents, &snapshot.router).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_prompt_generation(built.source);
        }
        self.cache.store(built.clone());
        Ok(built)
    }

    /// The prompt the next request would use. Makes no handler calls.
    pub fn current_prompt(&self) -> Result<BuiltPrompt, RoutingError> {
        let snapshot = self.source.snapshot();
        if snapshot.agents.is_empty() {
            return Err(RoutingError::NoAgentsConfigured);
        }
        Ok(self.cache.get_or_build(&snapshot))
    }
}

#[async_trait]
impl ConversationHandler for RouterDispatcher {
    async fn handle(&self, request: &HandlerRequest) -> anyhow::Result<String> {
        let turn = ConversationTurn {
            text: request.text.clone(),
            language: Some(request.language.clone()),
            conversation_id: Some(request.conversation_id.clone()),
        };
        let decision = self.route(turn).await?;
        Ok(decision.final_response_text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
