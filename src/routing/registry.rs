//! Ordered registry of the specialized agents a router can dispatch to.
//!
//! Insertion order matters: the first record is the fallback target whenever
//! classification fails or resolves to nothing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A specialized downstream agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AgentRecord {
    /// Unique display name. Matched case-insensitively.
    pub name: String,
    /// Id of the handler (see `[handlers]`) that answers for this agent.
    #[serde(rename = "handler")]
    pub handler_id: String,
    /// What this agent is good at. Only used to render the router prompt.
    pub description: String,
    /// Optional comma-separated routing hints.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keywords: String,
}

impl AgentRecord {
    pub fn new(
        name: impl Into<String>,
        handler_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            handler_id: handler_id.into(),
            description: description.into(),
            keywords: String::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    fn matches_name(&self, name: &str) -> bool {
        normalize_name(&self.name) == normalize_name(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("an agent named '{0}' already exists")]
    DuplicateName(String),
    #[error("at least one agent must remain configured")]
    MinimumAgentCount,
    #[error("no agent named '{0}'")]
    NotFound(String),
    #[error("agent name must not be empty")]
    EmptyName,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Ordered, name-unique collection of [`AgentRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AgentRegistry {
    agents: Vec<AgentRecord>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, enforcing the same rules as [`AgentRegistry::add`].
    pub fn from_records(records: Vec<AgentRecord>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for record in records {
            registry.add(record)?;
        }
        Ok(registry)
    }

    pub fn list(&self) -> &[AgentRecord] {
        &self.agents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentRecord> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The fallback target: first record in configured order.
    pub fn first(&self) -> Option<&AgentRecord> {
        self.agents.first()
    }

    /// Case-insensitive lookup, ignoring surrounding whitespace.
    pub fn find_by_name(&self, name: &str) -> Option<&AgentRecord> {
        self.agents.iter().find(|a| a.matches_name(name))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.agents.iter().position(|a| a.matches_name(name))
    }

    pub fn add(&mut self, mut record: AgentRecord) -> Result<(), RegistryError> {
        record.name = record.name.trim().to_string();
        if record.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.position(&record.name).is_some() {
            return Err(RegistryError::DuplicateName(record.name));
        }
        self.agents.push(record);
        Ok(())
    }

    /// Replace the record called `name` in place. The new record may carry a
    /// different name as long as it does not collide with another agent.
    pub fn update(&mut self, name: &str, mut record: AgentRecord) -> Result<(), RegistryError> {
        let index = self
            .position(name)
            .ok_or_else(|| RegistryError::NotFound(name.trim().to_string()))?;
        record.name = record.name.trim().to_string();
        if record.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(other) = self.position(&record.name) {
            if other != index {
                return Err(RegistryError::DuplicateName(record.name));
            }
        }
        self.agents[index] = record;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<AgentRecord, RegistryError> {
        let index = self
            .position(name)
            .ok_or_else(|| RegistryError::NotFound(name.trim().to_string()))?;
        if self.agents.len() == 1 {
            return Err(RegistryError::MinimumAgentCount);
        }
        Ok(self.agents.remove(index))
    }

    /// Check invariants on a registry that bypassed [`AgentRegistry::add`]
    /// (e.g. one deserialized from a config file).
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if self.agents[..i].iter().any(|a| a.matches_name(&agent.name)) {
                return Err(RegistryError::DuplicateName(agent.name.clone()));
            }
        }
        Ok(())
    }

    /// Hex SHA-256 over every field that feeds the router prompt, in order.
    /// Changes whenever a cached prompt would go stale.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for agent in &self.agents {
            for field in [&agent.name, &agent.description, &agent.keywords] {
                hasher.update(field.as_bytes());
                hasher.update([0u8]);
            }
            hasher.update([0xffu8]);
        }
        hex::encode(hasher.finalize())
    }
}

impl<'a> IntoIterator for &'a AgentRegistry {
    type Item = &'a AgentRecord;
    type IntoIter = std::slice::Iter<'a, AgentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.agents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AgentRegistry {
        AgentRegistry::from_records(vec![
            AgentRecord::new("Weather", "hA", "weather queries"),
            AgentRecord::new("Lights", "hB", "light control"),
        ])
        .unwrap()
    }

    #[test]
    fn first_is_insertion_order() {
        let registry = sample();
        assert_eq!(registry.first().unwrap().name, "Weather");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn find_by_name_ignores_case_and_whitespace() {
        let registry = sample();
        assert_eq!(registry.find_by_name("  lIgHtS ").unwrap().handler_id, "hB");
        assert!(registry.find_by_name("Security").is_none());
    }

    #[test]
    fn add_rejects_case_insensitive_duplicate() {
        let mut registry = sample();
        let err = registry
            .add(AgentRecord::new("weather", "hC", "dup"))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("weather".into()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn add_rejects_blank_name() {
        let mut registry = AgentRegistry::new();
        assert_eq!(
            registry.add(AgentRecord::new("   ", "h", "d")),
            Err(RegistryError::EmptyName)
        );
    }

    #[test]
    fn add_trims_stored_name() {
        let mut registry = AgentRegistry::new();
        registry.add(AgentRecord::new(" General ", "h1", "anything")).unwrap();
        assert_eq!(registry.first().unwrap().name, "General");
    }

    #[test]
    fn remove_last_agent_is_refused() {
        let mut registry = sample();
        registry.remove("weather").unwrap();
        assert_eq!(registry.remove("Lights"), Err(RegistryError::MinimumAgentCount));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_unknown_agent_is_not_found() {
        let mut registry = sample();
        assert_eq!(
            registry.remove("Security"),
            Err(RegistryError::NotFound("Security".into()))
        );
    }

    #[test]
    fn update_keeps_position_and_rejects_collisions() {
        let mut registry = sample();
        registry
            .update("Weather", AgentRecord::new("Forecast", "hA", "forecasts"))
            .unwrap();
        assert_eq!(registry.first().unwrap().name, "Forecast");

        let err = registry
            .update("Forecast", AgentRecord::new("LIGHTS", "hA", "x"))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("LIGHTS".into()));

        // Renaming to its own name with different case is fine.
        registry
            .update("lights", AgentRecord::new("LIGHTS", "hB", "light control"))
            .unwrap();
        assert_eq!(registry.list()[1].name, "LIGHTS");
    }

    #[test]
    fn validate_catches_duplicates_from_deserialization() {
        let registry: AgentRegistry = serde_json::from_str(
            r#"[{"name":"A","handler":"h1","description":"x"},{"name":"a","handler":"h2","description":"y"}]"#,
        )
        .unwrap();
        assert_eq!(
            registry.validate(),
            Err(RegistryError::DuplicateName("a".into()))
        );
    }

    #[test]
    fn fingerprint_tracks_prompt_relevant_fields() {
        let registry = sample();
        let same = sample();
        assert_eq!(registry.fingerprint(), same.fingerprint());

        let mut changed = sample();
        changed
            .update("Lights", AgentRecord::new("Lights", "hB", "lamps").with_keywords("dim"))
            .unwrap();
        assert_ne!(registry.fingerprint(), changed.fingerprint());

        // Handler ids do not show up in the prompt.
        let mut rehomed = sample();
        rehomed
            .update("Lights", AgentRecord::new("Lights", "hZ", "light control"))
            .unwrap();
        assert_eq!(registry.fingerprint(), rehomed.fingerprint());
    }
}
