#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use agent_router::commands;
use agent_router::{AgentCommands, Config, PromptCommands};
use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Route each request to the right specialized agent.
#[derive(Parser, Debug)]
#[command(name = "agent-router")]
#[command(version)]
#[command(about = "LLM intent router for multi-agent conversations.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (default: ~/.agent-router)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Route a request to an agent
    #[command(long_about = "\
Route a request to an agent.

Asks the router handler which agent fits the request, then forwards the \
original text to that agent and prints its reply. Without --message, reads \
requests from stdin line by line and hot-reloads config.toml on change.

Examples:
  agent-router route -m \"turn on the kitchen lights\"
  agent-router route -m \"will it rain tomorrow\" --json
  agent-router route                              # interactive session")]
    Route {
        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,

        /// Print the full routing decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage agents (list, add, remove, edit)
    #[command(long_about = "\
Manage the agent registry.

Agents are kept in order; the first one receives every request the \
router cannot place. Any change clears the stored router prompt.

Examples:
  agent-router agents list
  agent-router agents add --name Weather --handler weather --description \"weather queries\"
  agent-router agents edit Weather --keywords \"forecast, rain\"
  agent-router agents remove Weather")]
    Agents {
        #[command(subcommand)]
        agent_command: AgentCommands,
    },

    /// Show or regenerate the router prompt
    #[command(long_about = "\
Show or regenerate the router prompt.

'show' prints the prompt the next request would use without calling \
any handler. 'regenerate' asks the configured prompt generator for a \
new prompt and saves it to config.toml.

Examples:
  agent-router prompt show
  agent-router prompt regenerate")]
    Prompt {
        #[command(subcommand)]
        prompt_command: PromptCommands,
    },

    /// Show router status
    Status,

    /// Manage configuration
    #[command(long_about = "\
Manage agent-router configuration.

Use 'schema' to dump the full JSON Schema for the config file, which \
documents every available key, type, and default value.

Examples:
  agent-router config schema              # print JSON Schema to stdout
  agent-router config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `agent-router`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(agent-router completions bash)
  agent-router completions zsh > ~/.zfunc/_agent-router
  agent-router completions fish > ~/.config/fish/completions/agent-router.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.as_os_str().is_empty() {
            bail!("--config-dir cannot be empty");
        }
    }

    // Completions and schema must remain stdout-only and should not load
    // config or initialize logging.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            return write_shell_completion(*shell, &mut stdout);
        }
        Commands::Config {
            config_command: ConfigCommands::Schema,
        } => {
            let schema = schemars::schema_for!(Config);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO.
    // Logs go to stderr so replies on stdout stay clean.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load_or_init(cli.config_dir).await?;

    match cli.command {
        Commands::Completions { .. } | Commands::Config { .. } => Ok(()),

        Commands::Route { message, json } => commands::run_route(config, message, json).await,

        Commands::Agents { agent_command } => {
            commands::handle_agent_command(agent_command, config.config_path).await
        }

        Commands::Prompt { prompt_command } => {
            commands::handle_prompt_command(prompt_command, config).await
        }

        Commands::Status => commands::print_status(&config),
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn completions_cli_parses_supported_shells() {
        for shell in ["bash", "fish", "zsh", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["agent-router", "completions", shell])
                .expect("completions invocation should parse");
            match cli.command {
                Commands::Completions { .. } => {}
                other => panic!("expected completions command, got {other:?}"),
            }
        }
    }

    #[test]
    fn completion_generation_mentions_binary_name() {
        let mut output = Vec::new();
        write_shell_completion(CompletionShell::Bash, &mut output)
            .expect("completion generation should succeed");
        let script = String::from_utf8(output).expect("completion output should be valid utf-8");
        assert!(
            script.contains("agent-router"),
            "completion script should reference binary name"
        );
    }

    #[test]
    fn route_and_agent_commands_parse() {
        let cli = Cli::try_parse_from([
            "agent-router",
            "--config-dir",
            "/tmp/ar",
            "route",
            "-m",
            "hello",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/ar")));
        match cli.command {
            Commands::Route { message, json } => {
                assert_eq!(message.as_deref(), Some("hello"));
                assert!(json);
            }
            other => panic!("expected route, got {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "agent-router",
            "agents",
            "edit",
            "Weather",
            "--name",
            "Forecast",
        ])
        .unwrap();
        match cli.command {
            Commands::Agents {
                agent_command: AgentCommands::Edit { name, new_name, .. },
            } => {
                assert_eq!(name, "Weather");
                assert_eq!(new_name.as_deref(), Some("Forecast"));
            }
            other => panic!("expected agents edit, got {other:?}"),
        }
    }
}
