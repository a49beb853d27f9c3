//! Intent routing: pick the agent that should answer a conversational turn.
//!
//! [`RouterDispatcher`] drives the flow. It reads the current
//! [`RouterSnapshot`](crate::config::RouterSnapshot), asks the router handler
//! to classify the turn with a cached prompt, resolves the answer to an
//! [`AgentRecord`] with [`resolve`], and falls back to the first agent
//! whenever that comes up empty.

pub mod classifier;
pub mod dispatcher;
pub mod prompt;
pub mod registry;
pub mod resolver;
pub mod traits;


pub use classifier::Classifier;
pub use dispatcher::RouterDispatcher;
pub use prompt::{build_static_prompt, BuiltPrompt, PromptBuilder, PromptCache};
pub use registry::{AgentRecord, AgentRegistry, RegistryError};
pub use resolver::{resolve, Resolution};
pub use traits::{
    ConversationTurn, DispatchOutcome, DispatchState, FallbackReason, MatchKind, PromptSource,
    RoutingDecision, RoutingError,
};

use std::sync::Arc;

use crate::config::ConfigSource;
use crate::handlers::HandlerInvoker;

/// Create a dispatcher over a config source and a handler invoker.
pub fn create_dispatcher(
    source: Arc<dyn ConfigSource>,
    invoker: Arc<dyn HandlerInvoker>,
) -> RouterDispatcher {
    RouterDispatcher::new(source, invoker)
}
