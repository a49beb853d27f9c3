use std::fmt;
use std::sync::Arc;

use super::snapshot::RouterSnapshot;
use super::RouterConfig;
use crate::routing::AgentRegistry;

/// Read-only view of the live router configuration.
///
/// Implementations hand out whole immutable snapshots. Callers hold on to a
/// snapshot for the duration of one request and ask again for the next one.
pub trait ConfigSource: Send + Sync {
    /// The current snapshot. Cheap; never blocks on writers.
    fn snapshot(&self) -> Arc<RouterSnapshot>;

    fn get_registry(&self) -> AgentRegistry {
        self.snapshot().agents.clone()
    }

    fn get_config(&self) -> RouterConfig {
        self.snapshot().router.clone()
    }
}

/// Severity level for configuration issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueSeverity {
    Warning,
    Error,
}

/// A single configuration issue found during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: ConfigIssueSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigIssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigIssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == ConfigIssueSeverity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
