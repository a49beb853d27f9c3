//! Command implementations behind the `agent-router` CLI.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{Config, ConfigWatcher, SnapshotStore};
use crate::handlers::HandlerRegistry;
use crate::observability::RouterMetrics;
use crate::routing::{
    AgentRecord, ConversationTurn, PromptSource, RouterDispatcher, RoutingDecision, RoutingError,
};
use crate::{AgentCommands, PromptCommands};

/// Everything needed to route: the live snapshot, the handler set, and the
/// dispatcher over both.
pub struct RouterRuntime {
    pub store: Arc<SnapshotStore>,
    pub handlers: Arc<HandlerRegistry>,
    pub metrics: Arc<RouterMetrics>,
    pub dispatcher: RouterDispatcher,
}

impl RouterRuntime {
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(SnapshotStore::from_config(config));
        let handlers = Arc::new(
            HandlerRegistry::from_config(&config.handlers).context("Failed to build handlers")?,
        );
        let metrics = Arc::new(
            RouterMetrics::new(config.observability.metrics_summary_interval)
                .context("Failed to register router metrics")?,
        );
        let dispatcher = RouterDispatcher::new(store.clone(), handlers.clone())
            .with_metrics(Arc::clone(&metrics))
            .with_decision_trace(config.decision_trace_path());

        Ok(Self {
            store,
            handlers,
            metrics,
            dispatcher,
        })
    }
}

fn print_decision(decision: &RoutingDecision, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(decision)?);
    } else {
        println!("{}", decision.final_response_text);
    }
    Ok(())
}

enum InputLine {
    Skip,
    Quit,
    Metrics,
    Request(ConversationTurn),
}

/// Blank lines are skipped, `/quit` or `/exit` ends the session and
/// `/metrics` dumps the counters. Anything else is forwarded exactly as typed.
fn read_input_line(line: String) -> InputLine {
    let command = line.trim();
    if command.is_empty() {
        InputLine::Skip
    } else if matches!(command, "/quit" | "/exit") {
        InputLine::Quit
    } else if command == "/metrics" {
        InputLine::Metrics
    } else {
        InputLine::Request(ConversationTurn::new(line))
    }
}

/// `route`: one message, or an interactive loop with hot reload.
pub async fn run_route(config: Config, message: Option<String>, json: bool) -> Result<()> {
    let runtime = RouterRuntime::from_config(&config)?;

    if let Some(message) = message {
        let decision = runtime.dispatcher.route(ConversationTurn::new(message)).await?;
        return print_decision(&decision, json);
    }

    let watcher = ConfigWatcher::new(config.config_path.clone(), Arc::clone(&runtime.store))
        .with_handlers(Arc::clone(&runtime.handlers));
    if let Err(e) = watcher.start() {
        tracing::warn!("Config hot reload disabled: {e:#}");
    }

    println!("agent-router interactive mode. Type a request, /metrics for counters, or /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let turn = match read_input_line(line) {
            InputLine::Skip => continue,
            InputLine::Quit => break,
            InputLine::Metrics => {
                print!("{}", runtime.metrics.render());
                continue;
            }
            InputLine::Request(turn) => turn,
        };
        match runtime.dispatcher.route(turn).await {
            Ok(decision) => print_decision(&decision, json)?,
            Err(RoutingError::NoAgentsConfigured) => {
                eprintln!("No agents configured. Add one with `agent-router agents add`.");
            }
            Err(e) => eprintln!("Routing failed: {e}"),
        }
    }

    watcher.stop();
    tracing::info!(requests = runtime.metrics.requests_total(), "Interactive session ended");
    Ok(())
}

/// Apply an agent edit to the on-disk config and save it.
pub async fn handle_agent_command(command: AgentCommands, config_path: PathBuf) -> Result<()> {
    let mut config = Config::read(&config_path).await?;
    match command {
        AgentCommands::List => {
            print_agents(&config);
            return Ok(());
        }
        AgentCommands::Add {
            name,
            handler,
            description,
            keywords,
        } => {
            let record = AgentRecord::new(name, handler, description)
                .with_keywords(keywords.unwrap_or_default());
            let name = record.name.trim().to_string();
            config.agents.add(record)?;
            println!("Added agent '{name}'.");
        }
        AgentCommands::Remove { name } => {
            let removed = config.agents.remove(&name)?;
            println!("Removed agent '{}'.", removed.name);
        }
        AgentCommands::Edit {
            name,
            new_name,
            handler,
            description,
            keywords,
        } => {
            let Some(existing) = config.agents.find_by_name(&name) else {
                bail!("no agent named '{}'", name.trim());
            };
            let mut record = existing.clone();
            if let Some(new_name) = new_name {
                record.name = new_name;
            }
            if let Some(handler) = handler {
                record.handler_id = handler;
            }
            if let Some(description) = description {
                record.description = description;
            }
            if let Some(keywords) = keywords {
                record.keywords = keywords;
            }
            config.agents.update(&name, record)?;
            println!("Updated agent '{}'.", name.trim());
        }
    }

    config.clear_stored_prompt();
    for warning in config.validate()? {
        eprintln!("warning: {warning}");
    }
    config.save().await?;
    Ok(())
}

fn print_agents(config: &Config) {
    if config.agents.is_empty() {
        println!("No agents configured.");
        return;
    }
    println!("Agents ({} total, first is the fallback):\n", config.agents.len());
    for (i, agent) in config.agents.iter().enumerate() {
        let marker = if i == 0 { " (fallback)" } else { "" };
        println!("  {:<20} -> {}{marker}", agent.name, agent.handler_id);
        println!("  {:<20}    {}", "", agent.description);
        if !agent.keywords.is_empty() {
            println!("  {:<20}    keywords: {}", "", agent.keywords);
        }
    }
}

/// `prompt show` / `prompt regenerate`.
pub async fn handle_prompt_command(command: PromptCommands, config: Config) -> Result<()> {
    let runtime = RouterRuntime::from_config(&config)?;
    match command {
        PromptCommands::Show => {
            let prompt = runtime.dispatcher.current_prompt()?;
            println!("# source: {}\n", prompt.source.as_str());
            println!("{}", prompt.text);
        }
        PromptCommands::Regenerate => {
            let built = runtime.dispatcher.regenerate_prompt().await?;
            if built.source == PromptSource::Generated {
                let mut on_disk = Config::read(&config.config_path).await?;
                if on_disk.agents.fingerprint() != built.registry_fingerprint {
                    bail!("agents changed while the prompt was being generated; run regenerate again");
                }
                on_disk.router.stored_prompt = Some(built.to_stored());
                on_disk.save().await?;
                println!("# source: generated (saved to {})\n", on_disk.config_path.display());
            } else {
                eprintln!("warning: prompt generator unavailable, the static prompt stays in use");
                println!("# source: {}\n", built.source.as_str());
            }
            println!("{}", built.text);
        }
    }
    Ok(())
}

pub fn print_status(config: &Config) -> Result<()> {
    let runtime = RouterRuntime::from_config(config)?;

    println!("agent-router status");
    println!();
    println!("Version:      {}", env!("CARGO_PKG_VERSION"));
    println!("Config:       {}", config.config_path.display());
    println!();
    println!("Router:       {}", config.router.router_handler_id);
    println!(
        "Generator:    {}",
        config
            .router
            .prompt_generator_handler_id
            .as_deref()
            .unwrap_or("(none)")
    );
    println!("Language:     {}", config.router.language);
    let prompt_source = match runtime.dispatcher.current_prompt() {
        Ok(prompt) => prompt.source.as_str(),
        Err(_) => "(no agents)",
    };
    println!("Prompt:       {prompt_source}");
    println!(
        "Trace:        {}",
        config
            .decision_trace_path()
            .map_or_else(|| "(off)".to_string(), |p| p.display().to_string())
    );
    println!();
    print_agents(config);
    println!();
    println!("Handlers:");
    for id in runtime.handlers.list() {
        let kind = config
            .handlers
            .get(&id)
            .map_or("?", |h| match h.kind {
                crate::config::HandlerKind::OpenAiCompatible => "openai-compatible",
                crate::config::HandlerKind::Webhook => "webhook",
            });
        println!("  {id:<20} {kind}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn init(dir: &TempDir) -> PathBuf {
        let config = Config::load_or_init(Some(dir.path().to_path_buf()))
            .await
            .unwrap();
        config.config_path
    }

    #[tokio::test]
    async fn agent_edits_persist_and_clear_stored_prompt() {
        let dir = TempDir::new().unwrap();
        let path = init(&dir).await;

        let mut config = Config::read(&path).await.unwrap();
        config.router.stored_prompt = Some(crate::config::StoredPrompt {
            text: "old".into(),
            registry_fingerprint: config.agents.fingerprint(),
            generated_at: chrono::Utc::now(),
        });
        config.save().await.unwrap();

        handle_agent_command(
            AgentCommands::Add {
                name: "Weather".into(),
                handler: "general".into(),
                description: "weather queries".into(),
                keywords: Some("forecast".into()),
            },
            path.clone(),
        )
        .await
        .unwrap();

        let config = Config::read(&path).await.unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents.list()[1].keywords, "forecast");
        assert!(config.router.stored_prompt.is_none());
    }

    #[tokio::test]
    async fn agent_rules_are_enforced() {
        let dir = TempDir::new().unwrap();
        let path = init(&dir).await;

        let duplicate = handle_agent_command(
            AgentCommands::Add {
                name: "general".into(),
                handler: "general".into(),
                description: "dup".into(),
                keywords: None,
            },
            path.clone(),
        )
        .await;
        assert!(duplicate.unwrap_err().to_string().contains("already exists"));

        let last = handle_agent_command(
            AgentCommands::Remove {
                name: "General".into(),
            },
            path.clone(),
        )
        .await;
        assert!(last.unwrap_err().to_string().contains("at least one agent"));
    }

    #[tokio::test]
    async fn edit_renames_in_place() {
        let dir = TempDir::new().unwrap();
        let path = init(&dir).await;

        handle_agent_command(
            AgentCommands::Edit {
                name: "general".into(),
                new_name: Some("Assistant".into()),
                handler: None,
                description: Some("everything else".into()),
                keywords: None,
            },
            path.clone(),
        )
        .await
        .unwrap();

        let config = Config::read(&path).await.unwrap();
        let first = config.agents.first().unwrap();
        assert_eq!(first.name, "Assistant");
        assert_eq!(first.handler_id, "general");
        assert_eq!(first.description, "everything else");
    }

    #[test]
    fn interactive_lines_are_forwarded_untrimmed() {
        match read_input_line("  turn on the lights  ".into()) {
            InputLine::Request(turn) => assert_eq!(turn.text, "  turn on the lights  "),
            _ => panic!("expected a request"),
        }
        assert!(matches!(read_input_line("   ".into()), InputLine::Skip));
        assert!(matches!(read_input_line(" /quit ".into()), InputLine::Quit));
        assert!(matches!(read_input_line("/exit".into()), InputLine::Quit));
        assert!(matches!(read_input_line("/metrics".into()), InputLine::Metrics));
    }

    #[tokio::test]
    async fn runtime_builds_from_default_config() {
        let config = Config::default();
        let runtime = RouterRuntime::from_config(&config).unwrap();
        assert_eq!(runtime.handlers.list(), vec!["general", "router"]);
        assert_eq!(
            runtime.dispatcher.current_prompt().unwrap().source,
            PromptSource::Static
        );
    }
}
