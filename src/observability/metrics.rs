//! Prometheus counters for routing outcomes, plus a periodic log summary.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::routing::{FallbackReason, PromptSource, RoutingDecision};

pub struct RouterMetrics {
    registry: Registry,
    requests: IntCounter,
    routed: IntCounterVec,
    fallbacks: IntCounterVec,
    target_failures: IntCounterVec,
    prompt_generations: IntCounterVec,
    summary_interval: u64,
}

impl RouterMetrics {
    pub fn new(summary_interval: u64) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounter::new("router_requests_total", "Requests routed")?;
        let routed = IntCounterVec::new(
            Opts::new("router_routed_total", "Requests dispatched per target agent"),
            &["agent"],
        )?;
        let fallbacks = IntCounterVec::new(
            Opts::new("router_fallback_total", "Requests sent to the fallback agent"),
            &["reason"],
        )?;
        let target_failures = IntCounterVec::new(
            Opts::new(
                "router_target_failures_total",
                "Target agent invocations that failed",
            ),
            &["agent"],
        )?;
        let prompt_generations = IntCounterVec::new(
            Opts::new(
                "router_prompt_generations_total",
                "Explicit router prompt regenerations",
            ),
            &["result"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(routed.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(target_failures.clone()))?;
        registry.register(Box::new(prompt_generations.clone()))?;

        Ok(Self {
            registry,
            requests,
            routed,
            fallbacks,
            target_failures,
            prompt_generations,
            summary_interval,
        })
    }

    pub fn record_decision(&self, decision: &RoutingDecision) {
        self.requests.inc();
        self.routed
            .with_label_values(&[decision.target_agent.as_str()])
            .inc();
        if let Some(reason) = decision.fallback {
            self.fallbacks.with_label_values(&[reason.as_str()]).inc();
        }
        if decision.target_failed() {
            self.target_failures
                .with_label_values(&[decision.target_agent.as_str()])
                .inc();
        }
        self.maybe_log_summary();
    }

    /// `generated` when the generator produced the prompt, `static_fallback`
    /// when it degraded to the template.
    pub fn record_prompt_generation(&self, source: PromptSource) {
        let result = match source {
            PromptSource::Generated => "generated",
            PromptSource::Static | PromptSource::Stored => "static_fallback",
        };
        self.prompt_generations.with_label_values(&[result]).inc();
    }

    pub fn requests_total(&self) -> u64 {
        self.requests.get()
    }

    pub fn fallback_total(&self, reason: FallbackReason) -> u64 {
        self.fallbacks.with_label_values(&[reason.as_str()]).get()
    }

    pub fn routed_total(&self, agent: &str) -> u64 {
        self.routed.with_label_values(&[agent]).get()
    }

    fn maybe_log_summary(&self) {
        let total = self.requests_total();
        if self.summary_interval == 0 || total % self.summary_interval != 0 {
            return;
        }
        let fallback: u64 = FallbackReason::ALL
            .iter()
            .map(|r| self.fallback_total(*r))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let fallback_rate = fallback as f64 / total as f64 * 100.0;
        tracing::info!(
            total,
            routed = total - fallback,
            fallback,
            router_failed = self.fallback_total(FallbackReason::RouterFailed),
            no_match = self.fallback_total(FallbackReason::NoMatch),
            "Routing summary: {fallback_rate:.1}% fallback"
        );
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
