//! Append-only JSONL trace of routing decisions.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::routing::RoutingDecision;

/// Append `decision` as one JSON line to `path`, creating parent
/// directories as needed.
pub async fn record_decision(path: &Path, decision: &RoutingDecision) -> Result<()> {
    let mut line = serde_json::to_string(decision).context("Failed to serialize decision")?;
    line.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create trace directory {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open decision trace {}", path.display()))?;
    file.write_all(line.as_bytes())
        .await
        .context("Failed to append decision")?;
    file.flush().await.context("Failed to flush decision trace")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{DispatchOutcome, FallbackReason, PromptSource};
    use chrono::Utc;
    use tempfile::TempDir;

    fn decision(id: &str) -> RoutingDecision {
        RoutingDecision {
            decision_id: id.into(),
            timestamp: Utc::now(),
            conversation_id: "c".into(),
            input_text: "what's up".into(),
            prompt_text: "p".into(),
            prompt_source: PromptSource::Static,
            raw_classification: Some("I don't know".into()),
            matched_agent: None,
            match_kind: None,
            fallback: Some(FallbackReason::NoMatch),
            target_agent: "General".into(),
            target_handler_id: "general".into(),
            outcome: DispatchOutcome::Answered,
            final_response_text: "hello".into(),
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_decision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("decisions.jsonl");

        record_decision(&path, &decision("a")).await.unwrap();
        record_decision(&path, &decision("b")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: RoutingDecision = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.decision_id, "b");
        assert_eq!(second.fallback, Some(FallbackReason::NoMatch));
        let raw: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(raw["fallback"], "no_match");
        assert_eq!(raw["outcome"]["status"], "answered");
    }
}
