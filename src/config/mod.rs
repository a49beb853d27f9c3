pub mod schema;
pub mod snapshot;
pub mod traits;
pub mod watch;

pub use schema::{
    default_config_dir, Config, HandlerConfig, HandlerKind, ObservabilityConfig, RouterConfig,
    StoredPrompt, CONFIG_DIR_ENV,
};
pub use snapshot::{RouterSnapshot, SnapshotStore};
pub use traits::{ConfigIssue, ConfigIssueSeverity, ConfigSource};
pub use watch::ConfigWatcher;
