use super::traits::{
    ConversationHandler, HandlerInvoker, HandlerRequest, HandlerResponse, InvocationError,
};
use crate::config::HandlerConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

struct RegisteredHandler {
    handler: Arc<dyn ConversationHandler>,
    timeout: Duration,
}

/// Handlers addressable by id, each with its own call timeout.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[handlers]` config tables. A table that
    /// cannot be turned into a handler is an error for the whole set.
    pub fn from_config(configs: &BTreeMap<String, HandlerConfig>) -> anyhow::Result<Self> {
        let registry = Self::new();
        registry.replace_from_config(configs)?;
        Ok(registry)
    }

    /// Swap the whole handler set. The old set stays in place if any entry
    /// fails to build.
    pub fn replace_from_config(
        &self,
        configs: &BTreeMap<String, HandlerConfig>,
    ) -> anyhow::Result<()> {
        let mut next = HashMap::with_capacity(configs.len());
        for (id, config) in configs {
            let handler = super::create_handler(id, config)?;
            next.insert(
                id.clone(),
                RegisteredHandler {
                    handler,
                    timeout: Duration::from_secs(config.timeout_secs.max(1)),
                },
            );
        }
        *self.handlers.write() = next;
        tracing::info!(count = configs.len(), "Handler set loaded");
        Ok(())
    }

    pub fn register(
        &self,
        id: impl Into<String>,
        handler: Arc<dyn ConversationHandler>,
        timeout: Duration,
    ) {
        self.handlers
            .write()
            .insert(id.into(), RegisteredHandler { handler, timeout });
    }

    pub fn remove(&self, id: &str) -> bool {
        self.handlers.write().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.read().contains_key(id)
    }

    /// Registered handler ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl HandlerInvoker for HandlerRegistry {
    async fn invoke(
        &self,
        handler_id: &str,
        request: &HandlerRequest,
    ) -> Result<HandlerResponse, InvocationError> {
        let (handler, timeout) = {
            let handlers = self.handlers.read();
            let entry = handlers
                .get(handler_id)
                .ok_or_else(|| InvocationError::HandlerNotFound(handler_id.to_string()))?;
            (Arc::clone(&entry.handler), entry.timeout)
        };

        match tokio::time::timeout(timeout, handler.handle(request)).await {
            Ok(Ok(text)) => Ok(HandlerResponse { text }),
            Ok(Err(e)) => Err(InvocationError::Failed {
                handler_id: handler_id.to_string(),
                message: super::sanitize_api_error(&format!("{e:#}")),
            }),
            Err(_) => Err(InvocationError::Timeout {
                handler_id: handler_id.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerKind;

    struct EchoHandler;

    #[async_trait]
    impl ConversationHandler for EchoHandler {
        async fn handle(&self, request: &HandlerRequest) -> anyhow::Result<String> {
            Ok(format!("echo: {}", request.text))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ConversationHandler for FailingHandler {
        async fn handle(&self, _request: &HandlerRequest) -> anyhow::Result<String> {
            anyhow::bail!("upstream rejected key sk-secret123")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl ConversationHandler for SlowHandler {
        async fn handle(&self, _request: &HandlerRequest) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".into())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn invoke_reaches_registered_handler() {
        let registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(EchoHandler), DEFAULT_HANDLER_TIMEOUT);

        let response = registry
            .invoke("echo", &HandlerRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(response.text, "echo: hi");
    }

    #[tokio::test]
    async fn invoke_unknown_handler_is_not_found() {
        let registry = HandlerRegistry::new();
        let err = registry
            .invoke("ghost", &HandlerRequest::new("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, InvocationError::HandlerNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn handler_failure_is_sanitized() {
        let registry = HandlerRegistry::new();
        registry.register("bad", Arc::new(FailingHandler), DEFAULT_HANDLER_TIMEOUT);

        let err = registry
            .invoke("bad", &HandlerRequest::new("hi"))
            .await
            .unwrap_err();
        match err {
            InvocationError::Failed { handler_id, message } => {
                assert_eq!(handler_id, "bad");
                assert!(message.contains("[REDACTED]"));
                assert!(!message.contains("sk-secret123"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let registry = HandlerRegistry::new();
        registry.register("slow", Arc::new(SlowHandler), Duration::from_secs(1));

        let err = registry
            .invoke("slow", &HandlerRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { timeout_secs: 1, .. }));
    }

    #[test]
    fn list_is_sorted_and_remove_works() {
        let registry = HandlerRegistry::new();
        registry.register("zeta", Arc::new(EchoHandler), DEFAULT_HANDLER_TIMEOUT);
        registry.register("alpha", Arc::new(EchoHandler), DEFAULT_HANDLER_TIMEOUT);
        assert_eq!(registry.list(), vec!["alpha", "zeta"]);

        assert!(registry.remove("zeta"));
        assert!(!registry.remove("zeta"));
        assert!(!registry.contains("zeta"));
    }

    #[test]
    fn replace_from_config_keeps_old_set_on_error() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "lights".to_string(),
            HandlerConfig {
                kind: HandlerKind::Webhook,
                url: Some("http://localhost:8123/lights".into()),
                ..HandlerConfig::default()
            },
        );
        let registry = HandlerRegistry::from_config(&configs).unwrap();
        assert_eq!(registry.list(), vec!["lights"]);

        configs.insert(
            "broken".to_string(),
            HandlerConfig {
                kind: HandlerKind::Webhook,
                ..HandlerConfig::default()
            },
        );
        assert!(registry.replace_from_config(&configs).is_err());
        assert_eq!(registry.list(), vec!["lights"]);
    }
}
