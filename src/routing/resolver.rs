//! Resolve the router's free-text answer to a configured agent.
//!
//! Strategies run in order and the first hit wins:
//! 1. exact name (after stripping a `ROUTE:` marker and decoration)
//! 2. name contained in the answer, longest names first
//! 3. every token of the name present in the answer
//!
//! Pure: no I/O, no logging.

use std::collections::HashSet;

use super::registry::{AgentRecord, AgentRegistry};
use super::traits::MatchKind;

/// Marker the router is asked to prefix its answer with.
pub const ROUTE_MARKER: &str = "ROUTE";

/// Minimum fraction of a candidate's tokens that must appear in the answer.
pub const TOKEN_MATCH_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Matched {
        agent: &'a AgentRecord,
        kind: MatchKind,
    },
    NoMatch,
}

impl<'a> Resolution<'a> {
    pub fn agent(&self) -> Option<&'a AgentRecord> {
        match self {
            Self::Matched { agent, .. } => Some(agent),
            Self::NoMatch => None,
        }
    }
}

/// Strip surrounding whitespace and a leading `ROUTE:` marker (any case,
/// optional whitespace before the colon).
pub fn strip_route_marker(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(head) = trimmed.get(..ROUTE_MARKER.len()) else {
        return trimmed;
    };
    if !head.eq_ignore_ascii_case(ROUTE_MARKER) {
        return trimmed;
    }
    match trimmed[ROUTE_MARKER.len()..].trim_start().strip_prefix(':') {
        Some(rest) => rest.trim(),
        None => trimmed,
    }
}

fn is_decoration(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '"' | '\'' | '`' | '*' | '[' | ']' | '(' | ')' | '<' | '>' | '.' | ',' | '!' | '?' | ';'
        )
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        let token = token.to_lowercase();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

fn exact_match<'a>(answer: &str, registry: &'a AgentRegistry) -> Option<&'a AgentRecord> {
    let candidate = strip_route_marker(answer).trim_matches(is_decoration);
    if candidate.is_empty() {
        return None;
    }
    registry.find_by_name(candidate)
}

fn substring_match<'a>(answer: &str, registry: &'a AgentRegistry) -> Option<&'a AgentRecord> {
    let haystack = answer.to_lowercase();
    let mut by_length: Vec<&AgentRecord> = registry.iter().collect();
    // Stable sort: equal lengths keep registry order.
    by_length.sort_by(|a, b| b.name.chars().count().cmp(&a.name.chars().count()));
    by_length.into_iter().find(|agent| {
        let needle = agent.name.trim().to_lowercase();
        !needle.is_empty() && haystack.contains(&needle)
    })
}

fn token_match<'a>(answer: &str, registry: &'a AgentRegistry) -> Option<(&'a AgentRecord, f64)> {
    let answer_tokens: HashSet<String> = tokenize(answer).into_iter().collect();
    if answer_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&AgentRecord, f64)> = None;
    for agent in registry {
        let name_tokens = tokenize(&agent.name);
        if name_tokens.is_empty() {
            continue;
        }
        let present = name_tokens
            .iter()
            .filter(|t| answer_tokens.contains(t.as_str()))
            .count();
        let score = present as f64 / name_tokens.len() as f64;
        // Strictly greater: ties stay with the earlier record.
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((agent, score));
        }
    }

    best.filter(|(_, score)| *score >= TOKEN_MATCH_THRESHOLD)
}

/// Resolve `raw_answer` against `registry`.
pub fn resolve<'a>(raw_answer: &str, registry: &'a AgentRegistry) -> Resolution<'a> {
    if raw_answer.trim().is_empty() {
        return Resolution::NoMatch;
    }

    if let Some(agent) = exact_match(raw_answer, registry) {
        return Resolution::Matched {
            agent,
            kind: MatchKind::Exact,
        };
    }

    if let Some(agent) = substring_match(raw_answer, registry) {
        return Resolution::Matched {
            agent,
            kind: MatchKind::Substring,
        };
    }

    if let Some((agent, score)) = token_match(raw_answer, registry) {
        return Resolution::Matched {
            agent,
            kind: MatchKind::TokenOverlap { score },
        };
    }

    Resolution::NoMatch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(names: &[&str]) -> AgentRegistry {
        AgentRegistry::from_records(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| AgentRecord::new(*n, format!("h{i}"), "test"))
                .collect(),
        )
        .unwrap()
    }

    fn resolved_name(raw: &str, reg: &AgentRegistry) -> Option<String> {
        resolve(raw, reg).agent().map(|a| a.name.clone())
    }

    #[test]
    fn strips_route_marker_variants() {
        assert_eq!(strip_route_marker("ROUTE: Lights"), "Lights");
        assert_eq!(strip_route_marker("  route:Lights \n"), "Lights");
        assert_eq!(strip_route_marker("Route : Lights"), "Lights");
        assert_eq!(strip_route_marker("Lights"), "Lights");
        assert_eq!(strip_route_marker("Router Lights"), "Router Lights");
        assert_eq!(strip_route_marker("é"), "é");
    }

    #[test]
    fn exact_match_with_marker_and_decoration() {
        let reg = registry(&["Weather", "Lights"]);
        let res = resolve("ROUTE: Lights", &reg);
        assert_eq!(res.agent().unwrap().name, "Lights");
        assert!(matches!(res, Resolution::Matched { kind: MatchKind::Exact, .. }));

        assert_eq!(resolved_name("ROUTE: \"lights\".", &reg).as_deref(), Some("Lights"));
        assert_eq!(resolved_name("[Weather]", &reg).as_deref(), Some("Weather"));
    }

    #[test]
    fn exact_match_wins_over_longer_substring() {
        // "Route Weather" is a substring of the raw answer, but the answer
        // minus its marker is exactly "Weather".
        let reg = registry(&["Route Weather", "Weather"]);
        let res = resolve("ROUTE: Weather", &reg);
        assert_eq!(res.agent().unwrap().name, "Weather");
        assert!(matches!(res, Resolution::Matched { kind: MatchKind::Exact, .. }));
    }

    #[test]
    fn longest_name_takes_precedence_in_substring_pass() {
        let reg = registry(&["Garden", "Garden Advanced"]);
        let res = resolve("Garden Advanced handles this", &reg);
        assert_eq!(res.agent().unwrap().name, "Garden Advanced");
        assert!(matches!(res, Resolution::Matched { kind: MatchKind::Substring, .. }));
    }

    #[test]
    fn substring_ties_keep_registry_order() {
        let reg = registry(&["Alpha", "Bravo"]);
        assert_eq!(
            resolved_name("either bravo or alpha", &reg).as_deref(),
            Some("Alpha")
        );
    }

    #[test]
    fn token_overlap_requires_every_name_token() {
        let reg = registry(&["Home_Security", "Kitchen Lights"]);
        let res = resolve("send this to the security team for the home", &reg);
        assert_eq!(res.agent().unwrap().name, "Home_Security");
        assert!(matches!(
            res,
            Resolution::Matched {
                kind: MatchKind::TokenOverlap { score },
                ..
            } if score == 1.0
        ));

        // Only one of two tokens present: rejected.
        assert!(resolve("the kitchen is dark", &reg).agent().is_none());
    }

    #[test]
    fn token_overlap_ties_prefer_earlier_record() {
        let reg = registry(&["Lights-Kitchen", "Kitchen.Lights"]);
        assert_eq!(
            resolved_name("kitchen and its lights", &reg).as_deref(),
            Some("Lights-Kitchen")
        );
    }

    #[test]
    fn vague_answer_is_no_match() {
        let reg = registry(&["Weather", "Security"]);
        assert_eq!(resolve("I'm not sure, maybe lighting?", &reg), Resolution::NoMatch);
    }

    #[test]
    fn empty_answer_is_no_match() {
        let reg = registry(&["Weather"]);
        assert_eq!(resolve("", &reg), Resolution::NoMatch);
        assert_eq!(resolve("   \n", &reg), Resolution::NoMatch);
        assert_eq!(resolve("ROUTE:", &reg), Resolution::NoMatch);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let reg = registry(&["Weather"]);
        assert_eq!(resolved_name("WEATHER", &reg).as_deref(), Some("Weather"));
        assert_eq!(
            resolved_name("i think WEATHER fits", &reg).as_deref(),
            Some("Weather")
        );
    }
}
