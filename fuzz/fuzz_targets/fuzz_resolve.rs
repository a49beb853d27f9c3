#![no_main]
use agent_router::routing::{resolve, AgentRecord, AgentRegistry, Resolution};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    // First line is the router answer, the rest are agent names.
    let mut lines = s.lines();
    let answer = lines.next().unwrap_or_default();
    let mut registry = AgentRegistry::new();
    for (i, name) in lines.enumerate() {
        let _ = registry.add(AgentRecord::new(name, format!("h{i}"), "fuzz"));
    }

    if let Resolution::Matched { agent, .. } = resolve(answer, &registry) {
        assert!(registry.find_by_name(&agent.name).is_some());
    }
});
