#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps,
    dead_code
)]

use clap::Subcommand;
use serde::{Deserialize, Serialize};

pub mod commands;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod routing;

pub use config::Config;
pub use routing::{ConversationTurn, RouterDispatcher, RoutingDecision};

/// Agent registry subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgentCommands {
    /// List configured agents in fallback order
    List,
    /// Add a new agent
    #[command(long_about = "\
Add a new agent to the end of the registry.

The handler must name a [handlers.<id>] table in config.toml. \
Agent names are unique (case-insensitive). Adding an agent clears \
any stored router prompt.

Examples:
  agent-router agents add --name Weather --handler weather --description \"weather queries\"
  agent-router agents add --name Lights --handler lights --description \"lighting control\" --keywords \"lamp, dim\"")]
    Add {
        /// Unique agent name
        #[arg(long)]
        name: String,
        /// Handler id from [handlers]
        #[arg(long)]
        handler: String,
        /// What the agent is good at
        #[arg(long)]
        description: String,
        /// Optional comma-separated routing hints
        #[arg(long)]
        keywords: Option<String>,
    },
    /// Remove an agent (the last agent cannot be removed)
    Remove {
        /// Agent name
        name: String,
    },
    /// Edit an existing agent in place
    Edit {
        /// Current agent name
        name: String,
        /// New name
        #[arg(long = "name")]
        new_name: Option<String>,
        #[arg(long)]
        handler: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
    },
}

/// Router prompt subcommands
#[derive(Subcommand, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PromptCommands {
    /// Print the prompt the next request would use
    Show,
    /// Run the prompt generator and persist the result
    Regenerate,
}
