use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::snapshot::RouterSnapshot;
use super::traits::ConfigIssue;
use crate::routing::prompt::{AGENT_JSON_PLACEHOLDER, DEFAULT_PROMPT_GENERATOR_TEMPLATE};
use crate::routing::{AgentRecord, AgentRegistry};

pub const CONFIG_DIR_ENV: &str = "AGENT_ROUTER_CONFIG_DIR";
const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level router configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` → `AGENT_ROUTER_CONFIG_DIR` → `~/.agent-router/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Router classification settings (`[router]`).
    #[serde(default)]
    pub router: RouterConfig,

    /// Specialized agents in fallback order (`[[agents]]`). The first entry
    /// receives every request the router cannot place.
    #[serde(default)]
    pub agents: AgentRegistry,

    /// Conversation handlers addressable by id (`[handlers.<id>]`).
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Router ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouterConfig {
    /// Handler asked to classify every utterance.
    #[serde(rename = "handler", default = "default_router_handler")]
    pub router_handler_id: String,

    /// Handler that writes the router prompt on `prompt regenerate`.
    /// Never called per request.
    #[serde(
        rename = "prompt_generator",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt_generator_handler_id: Option<String>,

    /// Request sent to the prompt generator. `{agent_json}` is replaced by
    /// the serialized agent list.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Language tag forwarded with every handler call.
    #[serde(default = "default_language")]
    pub language: String,

    /// Last generated prompt, kept across restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_prompt: Option<StoredPrompt>,
}

fn default_router_handler() -> String {
    "router".into()
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_GENERATOR_TEMPLATE.into()
}

fn default_language() -> String {
    "en".into()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            router_handler_id: default_router_handler(),
            prompt_generator_handler_id: None,
            prompt_template: default_prompt_template(),
            language: default_language(),
            stored_prompt: None,
        }
    }
}

/// A generated router prompt and the registry it was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoredPrompt {
    pub text: String,
    pub registry_fingerprint: String,
    pub generated_at: DateTime<Utc>,
}

// ── Handlers ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HandlerKind {
    /// Chat completions endpoint (`POST {base_url}/chat/completions`).
    #[default]
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    /// Plain JSON webhook (`POST url`).
    #[serde(rename = "webhook")]
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HandlerConfig {
    #[serde(default)]
    pub kind: HandlerKind,

    /// openai-compatible: API base, e.g. `https://api.openai.com/v1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// openai-compatible: model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// openai-compatible: bearer key. Falls back to `OPENAI_API_KEY`, then
    /// `AGENT_ROUTER_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// openai-compatible: system message sent before the user turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// webhook: endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Per-call timeout enforced by the invocation layer.
    #[serde(default = "default_handler_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_handler_timeout_secs() -> u64 {
    60
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            kind: HandlerKind::default(),
            base_url: None,
            model: None,
            api_key: None,
            system_prompt: None,
            temperature: default_temperature(),
            url: None,
            timeout_secs: default_handler_timeout_secs(),
        }
    }
}

impl HandlerConfig {
    fn openai(temperature: f64) -> Self {
        Self {
            base_url: Some("https://api.openai.com/v1".into()),
            model: Some("gpt-4o-mini".into()),
            temperature,
            ..Self::default()
        }
    }
}

// ── Observability ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObservabilityConfig {
    /// Log a counters summary every N requests. 0 disables the summary.
    #[serde(default = "default_metrics_summary_interval")]
    pub metrics_summary_interval: u64,

    /// Append every routing decision as a JSON line to this file. Relative
    /// paths resolve against the config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_trace_path: Option<String>,
}

fn default_metrics_summary_interval() -> u64 {
    20
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_summary_interval: default_metrics_summary_interval(),
            decision_trace_path: None,
        }
    }
}

// ── Defaults & paths ──────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let config_path = default_config_dir()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME));

        let mut agents = AgentRegistry::new();
        let general = AgentRecord::new(
            "General",
            "general",
            "General conversation and anything no other agent covers",
        );
        if let Err(e) = agents.add(general) {
            tracing::error!("Default agent rejected: {e}");
        }

        let mut handlers = BTreeMap::new();
        handlers.insert("router".to_string(), HandlerConfig::openai(0.0));
        handlers.insert("general".to_string(), HandlerConfig::openai(0.7));

        Self {
            config_path,
            router: RouterConfig::default(),
            agents,
            handlers,
            observability: ObservabilityConfig::default(),
        }
    }
}

/// `AGENT_ROUTER_CONFIG_DIR`, else `~/.agent-router`.
pub fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        let dir = dir.trim();
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".agent-router"))
}

fn config_dir_creation_error(path: &Path) -> String {
    format!(
        "Failed to create config directory at {}. \
         Set {CONFIG_DIR_ENV} or pass --config-dir to use another location.",
        path.display()
    )
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ── Load / validate / save ────────────────────────────────────────

impl Config {
    /// Load `config.toml` from `config_dir` (or the default location),
    /// writing defaults on first run. Environment overrides are applied.
    pub async fn load_or_init(config_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => default_config_dir()?,
        };
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(&config_dir)
            .await
            .with_context(|| config_dir_creation_error(&config_dir))?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config {
                config_path: config_path.clone(),
                ..Config::default()
            };
            config.save().await?;
            config
        } else {
            Self::read(&config_path).await?
        };

        config.apply_env_overrides();
        config.check()?;
        tracing::info!(
            path = %config.config_path.display(),
            agents = config.agents.len(),
            handlers = config.handlers.len(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Read and validate a config file as written on disk, without
    /// environment overrides. Use this for edits that are saved back.
    pub async fn read(path: &Path) -> Result<Self> {
        // Warn if config file is world-readable (may contain API keys)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = fs::metadata(path).await {
                if meta.permissions().mode() & 0o004 != 0 {
                    tracing::warn!(
                        "Config file {:?} is world-readable (mode {:o}). \
                         Consider restricting with: chmod 600 {:?}",
                        path,
                        meta.permissions().mode() & 0o777,
                        path,
                    );
                }
            }
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::parse(&contents)?;
        config.config_path = path.to_path_buf();
        config.check()?;
        Ok(config)
    }

    /// Parse TOML text. Performs no validation.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    pub fn config_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Decision trace location, resolved against the config directory.
    pub fn decision_trace_path(&self) -> Option<PathBuf> {
        let raw = self.observability.decision_trace_path.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let path = PathBuf::from(raw);
        Some(if path.is_absolute() {
            path
        } else {
            self.config_dir().join(path)
        })
    }

    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot::from(self)
    }

    /// Every problem found in this config, errors and warnings alike.
    pub fn issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.router.router_handler_id.trim().is_empty() {
            issues.push(ConfigIssue::error("router.handler", "must not be empty"));
        }

        if let Err(e) = self.agents.validate() {
            issues.push(ConfigIssue::error("agents", e.to_string()));
        }
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.handler_id.trim().is_empty() {
                issues.push(ConfigIssue::error(
                    format!("agents[{i}].handler"),
                    format!("agent '{}' has no handler", agent.name),
                ));
            }
        }
        if self.agents.is_empty() {
            issues.push(ConfigIssue::warning(
                "agents",
                "no agents configured; every request will fail until one is added",
            ));
        }

        let mut referenced: Vec<(String, &str)> =
            vec![("router.handler".into(), self.router.router_handler_id.as_str())];
        if let Some(id) = self.router.prompt_generator_handler_id.as_deref() {
            referenced.push(("router.prompt_generator".into(), id));
        }
        for (i, agent) in self.agents.iter().enumerate() {
            referenced.push((format!("agents[{i}].handler"), agent.handler_id.as_str()));
        }
        for (field, id) in referenced {
            if !id.trim().is_empty() && !self.handlers.contains_key(id) {
                issues.push(ConfigIssue::warning(
                    field,
                    format!("handler '{id}' is not defined under [handlers]"),
                ));
            }
        }

        if self.router.prompt_generator_handler_id.is_some()
            && !self.router.prompt_template.contains(AGENT_JSON_PLACEHOLDER)
        {
            issues.push(ConfigIssue::warning(
                "router.prompt_template",
                format!("template has no {AGENT_JSON_PLACEHOLDER} placeholder; the generator will not see the agent list"),
            ));
        }

        issues
    }

    /// Validate configuration values that would cause runtime failures.
    ///
    /// Fails on the first hard error; returns the remaining warnings.
    pub fn validate(&self) -> Result<Vec<ConfigIssue>> {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            self.issues().into_iter().partition(ConfigIssue::is_error);
        if let Some(first) = errors.first() {
            anyhow::bail!("Invalid config: {first}");
        }
        Ok(warnings)
    }

    /// [`Config::validate`] plus logging of warnings.
    fn check(&self) -> Result<()> {
        for warning in self.validate()? {
            tracing::warn!(field = %warning.field, "{}", warning.message);
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Some(handler) = non_empty_env("AGENT_ROUTER_HANDLER") {
            self.router.router_handler_id = handler;
        }
        if let Some(generator) = non_empty_env("AGENT_ROUTER_PROMPT_GENERATOR") {
            self.router.prompt_generator_handler_id = Some(generator);
        }
        if let Some(language) = non_empty_env("AGENT_ROUTER_LANGUAGE") {
            self.router.language = language;
        }
    }

    /// Drop the persisted prompt. Called after any agent edit.
    pub fn clear_stored_prompt(&mut self) {
        self.router.stored_prompt = None;
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut options = OpenOptions::new();
        options.create_new(true).write(true);
        // The file may hold API keys; every save lands as 0600.
        #[cfg(unix)]
        options.mode(0o600);
        let mut temp_file = options
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        tracing::debug!(path = %self.config_path.display(), "Config saved");
        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
