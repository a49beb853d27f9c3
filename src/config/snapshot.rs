use arc_swap::ArcSwap;
use std::sync::Arc;

use super::traits::ConfigSource;
use super::{Config, RouterConfig};
use crate::routing::AgentRegistry;

/// Everything the dispatcher reads for one request, published as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSnapshot {
    pub agents: AgentRegistry,
    pub router: RouterConfig,
}

impl RouterSnapshot {
    pub fn new(agents: AgentRegistry, router: RouterConfig) -> Self {
        Self { agents, router }
    }
}

impl From<&Config> for RouterSnapshot {
    fn from(config: &Config) -> Self {
        Self::new(config.agents.clone(), config.router.clone())
    }
}

/// Atomically swappable holder of the current [`RouterSnapshot`].
///
/// Readers get a lock-free `Arc`; writers replace the whole snapshot, so a
/// request never observes a half-applied edit.
pub struct SnapshotStore {
    current: ArcSwap<RouterSnapshot>,
}

impl SnapshotStore {
    pub fn new(snapshot: RouterSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(RouterSnapshot::from(config))
    }

    pub fn publish(&self, snapshot: RouterSnapshot) {
        self.current.store(Arc::new(snapshot));
        tracing::debug!("Router snapshot published");
    }
}

impl ConfigSource for SnapshotStore {
    fn snapshot(&self) -> Arc<RouterSnapshot> {
        self.current.load_full()
    }
}
