use std::sync::Arc;

use super::traits::RoutingError;
use crate::handlers::{HandlerInvoker, HandlerRequest};

pub const USER_REQUEST_LABEL: &str = "User request:";

/// Router prompt, a blank line, the label, then the utterance untouched.
pub fn build_payload(prompt_text: &str, user_text: &str) -> String {
    format!("{prompt_text}\n\n{USER_REQUEST_LABEL}\n{user_text}")
}

/// Asks the router handler which agent should take a turn.
pub struct Classifier {
    invoker: Arc<dyn HandlerInvoker>,
}

impl Classifier {
    pub fn new(invoker: Arc<dyn HandlerInvoker>) -> Self {
        Self { invoker }
    }

    /// One router call, no retries. The raw answer is returned as-is for
    /// the resolver.
    pub async fn classify(
        &self,
        request: &HandlerRequest,
        prompt_text: &str,
        router_handler_id: &str,
    ) -> Result<String, RoutingError> {
        let payload = request.with_text(build_payload(prompt_text, &request.text));
        tracing::debug!(router = router_handler_id, payload = %payload.text, "Classifier payload");

        self.invoker
            .invoke(router_handler_id, &payload)
            .await
            .map(|response| response.text)
            .map_err(|source| RoutingError::RouterUnavailable {
                handler_id: router_handler_id.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerResponse, InvocationError};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Recorder {
        reply: Result<String, InvocationError>,
        last: Mutex<Option<(String, HandlerRequest)>>,
    }

    #[async_trait]
    impl HandlerInvoker for Recorder {
        async fn invoke(
            &self,
            handler_id: &str,
            request: &HandlerRequest,
        ) -> Result<HandlerResponse, InvocationError> {
            *self.last.lock() = Some((handler_id.to_string(), request.clone()));
            self.reply.clone().map(|text| HandlerResponse { text })
        }
    }

    fn recorder(reply: Result<String, InvocationError>) -> Arc<Recorder> {
        Arc::new(Recorder {
            reply,
            last: Mutex::new(None),
        })
    }

    #[test]
    fn payload_layout() {
        assert_eq!(
            build_payload("PROMPT", "turn on the lights"),
            "PROMPT\n\nUser request:\nturn on the lights"
        );
    }

    #[tokio::test]
    async fn classify_sends_full_utterance_with_context() {
        let invoker = recorder(Ok("ROUTE: Lights".into()));
        let classifier = Classifier::new(invoker.clone());
        let long_text = "lights ".repeat(2_000);
        let request = HandlerRequest::new(long_text.clone())
            .with_language("fr")
            .with_conversation_id("c-1");

        let raw = classifier.classify(&request, "PROMPT", "router").await.unwrap();
        assert_eq!(raw, "ROUTE: Lights");

        let (handler_id, sent) = invoker.last.lock().clone().unwrap();
        assert_eq!(handler_id, "router");
        assert!(sent.text.ends_with(&long_text));
        assert_eq!(sent.language, "fr");
        assert_eq!(sent.conversation_id, "c-1");
    }

    #[tokio::test]
    async fn empty_input_is_passed_through() {
        let invoker = recorder(Ok("ROUTE: Lights".into()));
        let classifier = Classifier::new(invoker.clone());
        classifier
            .classify(&HandlerRequest::new("   "), "PROMPT", "router")
            .await
            .unwrap();
        let (_, sent) = invoker.last.lock().clone().unwrap();
        assert_eq!(sent.text, "PROMPT\n\nUser request:\n   ");
    }

    #[tokio::test]
    async fn invocation_failure_is_router_unavailable() {
        let classifier = Classifier::new(recorder(Err(InvocationError::Timeout {
            handler_id: "router".into(),
            timeout_secs: 3,
        })));
        let err = classifier
            .classify(&HandlerRequest::new("hi"), "PROMPT", "router")
            .await
            .unwrap_err();
        match err {
            RoutingError::RouterUnavailable { handler_id, source } => {
                assert_eq!(handler_id, "router");
                assert!(matches!(source, InvocationError::Timeout { .. }));
            }
            RoutingError::NoAgentsConfigured => panic!("unexpected error"),
        }
    }
}
