//! Router prompt construction and caching.
//!
//! Request-time routing only ever uses a cached prompt, a persisted prompt
//! whose registry fingerprint still matches, or the static template. The
//! prompt-generator handler is called from [`PromptBuilder::build`] alone,
//! which the dispatcher runs on explicit regeneration.

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use super::registry::AgentRegistry;
use super::traits::PromptSource;
use crate::config::{RouterConfig, RouterSnapshot, StoredPrompt};
use crate::handlers::{HandlerInvoker, HandlerRequest};

pub const AGENT_JSON_PLACEHOLDER: &str = "{agent_json}";

pub const DEFAULT_PROMPT_GENERATOR_TEMPLATE: &str = r#"Generate a router system prompt for a multi-agent routing system.

The router must classify user requests and respond with ONLY "ROUTE: <agent name>".

Available agents:
{agent_json}

Requirements:
1. Use ONLY the "ROUTE: <exact agent name>" format
2. Include 5-8 concrete examples showing routing decisions
3. Examples must use the actual agent names from the list above, never placeholders
4. Add explicit routing rules based on agent capabilities
5. The router must NEVER answer questions itself
6. Keep the prompt concise and deterministic

Generate ONLY the router prompt text, nothing else."#;

const MAX_STATIC_EXAMPLES: usize = 6;

/// A router prompt plus the registry fingerprint it was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub text: String,
    pub source: PromptSource,
    pub registry_fingerprint: String,
}

impl BuiltPrompt {
    /// Persistable form, stamped with the current time.
    pub fn to_stored(&self) -> StoredPrompt {
        StoredPrompt {
            text: self.text.clone(),
            registry_fingerprint: self.registry_fingerprint.clone(),
            generated_at: Utc::now(),
        }
    }

    fn from_stored(stored: &StoredPrompt) -> Self {
        Self {
            text: stored.text.clone(),
            source: PromptSource::Stored,
            registry_fingerprint: stored.registry_fingerprint.clone(),
        }
    }

    fn static_for(registry: &AgentRegistry) -> Self {
        Self {
            text: build_static_prompt(registry),
            source: PromptSource::Static,
            registry_fingerprint: registry.fingerprint(),
        }
    }
}

fn example_line(out: &mut String, request: &str, agent: &str) {
    let _ = writeln!(out, "{request} -> ROUTE: {agent}");
}

/// Deterministic router prompt listing every agent in registry order.
pub fn build_static_prompt(registry: &AgentRegistry) -> String {
    let mut prompt = String::from(
        "You are a routing assistant. Classify each user request and decide which one of the agents below should handle it.\n\nAvailable agents:\n",
    );

    for agent in registry {
        let _ = write!(prompt, "- \"{}\": {}", agent.name, agent.description.trim());
        let keywords = agent.keywords.trim();
        if !keywords.is_empty() {
            let _ = write!(prompt, " (Keywords: {keywords})");
        }
        prompt.push('\n');
    }

    prompt.push_str("\nExamples:\n");
    for agent in registry.iter().take(MAX_STATIC_EXAMPLES) {
        let first_keyword = agent
            .keywords
            .split(',')
            .map(str::trim)
            .find(|k| !k.is_empty());
        let request = match first_keyword {
            Some(keyword) => format!("A request about {keyword}"),
            None => format!("A request for \"{}\"", agent.description.trim()),
        };
        example_line(&mut prompt, &request, &agent.name);
    }
    if let Some(first) = registry.first() {
        example_line(&mut prompt, "A request that fits no agent", &first.name);
    }

    prompt.push_str(
        "\nRespond with exactly one line: ROUTE: <agent name>, using an agent name exactly as listed above. \
         Never answer the user's request yourself.",
    );
    prompt
}

#[derive(Serialize)]
struct GeneratorAgent<'a> {
    name: &'a str,
    description: &'a str,
    keywords: &'a str,
}

/// Pretty JSON array of `{name, description, keywords}` in registry order.
pub fn generator_payload(registry: &AgentRegistry) -> String {
    let agents: Vec<GeneratorAgent<'_>> = registry
        .iter()
        .map(|a| GeneratorAgent {
            name: &a.name,
            description: &a.description,
            keywords: &a.keywords,
        })
        .collect();
    serde_json::to_string_pretty(&agents).unwrap_or_else(|_| "[]".to_string())
}

pub fn render_generator_request(template: &str, registry: &AgentRegistry) -> String {
    template.replace(AGENT_JSON_PLACEHOLDER, &generator_payload(registry))
}

/// Runs the prompt generator, degrading to the static template.
pub struct PromptBuilder {
    invoker: Arc<dyn HandlerInvoker>,
}

impl PromptBuilder {
    pub fn new(invoker: Arc<dyn HandlerInvoker>) -> Self {
        Self { invoker }
    }

    /// Build a prompt for `registry`. Uses the configured generator when
    /// there is one; any generator failure or empty output yields the static
    /// template instead. Never fails.
    pub async fn build(&self, registry: &AgentRegistry, config: &RouterConfig) -> BuiltPrompt {
        let Some(generator_id) = config
            .prompt_generator_handler_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            tracing::debug!("No prompt generator configured, using static prompt");
            return BuiltPrompt::static_for(registry);
        };

        let request = HandlerRequest::new(render_generator_request(
            &config.prompt_template,
            registry,
        ))
        .with_language(config.language.clone());

        tracing::info!(generator = generator_id, agents = registry.len(), "Generating router prompt");
        match self.invoker.invoke(generator_id, &request).await {
            Ok(response) => {
                let text = response.text.trim();
                if text.is_empty() {
                    tracing::warn!(generator = generator_id, "Prompt generator returned nothing, using static prompt");
                    return BuiltPrompt::static_for(registry);
                }
                tracing::info!(generator = generator_id, chars = text.len(), "Router prompt generated");
                BuiltPrompt {
                    text: text.to_string(),
                    source: PromptSource::Generated,
                    registry_fingerprint: registry.fingerprint(),
                }
            }
            Err(e) => {
                tracing::warn!(generator = generator_id, "Prompt generation failed, using static prompt: {e}");
                BuiltPrompt::static_for(registry)
            }
        }
    }
}

/// The prompt currently used for routing, keyed by registry fingerprint.
#[derive(Debug, Default)]
pub struct PromptCache {
    current: RwLock<Option<BuiltPrompt>>,
}

impl PromptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prompt for `snapshot` without any external call: the cached prompt if
    /// it still matches the registry, else a matching stored prompt, else
    /// the static template.
    pub fn get_or_build(&self, snapshot: &RouterSnapshot) -> BuiltPrompt {
        let fingerprint = snapshot.agents.fingerprint();
        let stored = snapshot
            .router
            .stored_prompt
            .as_ref()
            .filter(|s| s.registry_fingerprint == fingerprint && !s.text.trim().is_empty());

        {
            let current = self.current.read();
            if let Some(cached) = current.as_ref() {
                // A stored prompt that showed up later beats a cached static one,
                // and a newer stored prompt replaces an older one.
                let superseded = stored.is_some_and(|s| match cached.source {
                    PromptSource::Static => true,
                    PromptSource::Stored => s.text != cached.text,
                    PromptSource::Generated => false,
                });
                if cached.registry_fingerprint == fingerprint && !superseded {
                    return cached.clone();
                }
            }
        }

        let built = match stored {
            Some(stored) => BuiltPrompt::from_stored(stored),
            None => BuiltPrompt::static_for(&snapshot.agents),
        };
        tracing::debug!(
            source = built.source.as_str(),
            fingerprint = %fingerprint,
            "Router prompt cache refreshed"
        );
        *self.current.write() = Some(built.clone());
        built
    }

    pub fn store(&self, prompt: BuiltPrompt) {
        *self.current.write() = Some(prompt);
    }

    pub fn current(&self) -> Option<BuiltPrompt> {
        self.current.read().clone()
    }

    pub fn invalidate(&self) {
        *self.current.write() = None;
    }
}
