use std::sync::Arc;

use tracing::debug;

use crate::multi_agent::registry::{AgentRecord, AgentRegistry};

/// Capability-match queries over the available agents of a registry.
#[derive(Clone)]
pub struct AgentDiscovery {
    registry: Arc<AgentRegistry>,
}

impl AgentDiscovery {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Agents whose capability set is a superset of `required`, in
    /// registration order.
    pub fn discover<S: AsRef<str>>(&self, required: &[S]) -> Vec<AgentRecord> {
        let found: Vec<AgentRecord> = self
            .registry
            .available()
            .into_iter()
            .filter(|r| r.has_capabilities(required))
            .collect();
        debug!("Discovery matched {} agent(s)", found.len());
        found
    }

    /// Agents with at least one capability carrying any of `tags`.
    pub fn discover_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<AgentRecord> {
        self.registry
            .available()
            .into_iter()
            .filter(|r| {
                r.capabilities
                    .iter()
                    .any(|c| tags.iter().any(|t| c.has_tag(t.as_ref())))
            })
            .collect()
    }

    /// Highest-scoring agent offering `capability`; the earliest registered
    /// wins ties.
    pub fn find_best_agent<F>(&self, capability: &str, criteria: F) -> Option<AgentRecord>
    where
        F: Fn(&AgentRecord) -> f64,
    {
        let mut best: Option<(f64, AgentRecord)> = None;
        for record in self.discover(&[capability]) {
            let score = criteria(&record);
            if score.is_nan() {
                continue;
            }
            match &best {
                Some((top, _)) if score <= *top => {}
                _ => best = Some((score, record)),
            }
        }
        best.map(|(_, record)| record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{agent::types::AgentCapability, multi_agent::registry::RegistryConfig};

    fn registry_with(agents: &[(&str, Vec<&str>)]) -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
        for (id, caps) in agents {
            let caps = caps
                .iter()
                .map(|c| AgentCapability::new(c, "cap").with_tags(&[*c]))
                .collect();
            registry
                .register(AgentRecord::new(id, id, caps))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_discover_requires_superset() {
        let registry = registry_with(&[("only_a", vec!["A"]), ("a_and_b", vec!["A", "B"])]);
        let discovery = AgentDiscovery::new(registry);

        let ids: Vec<String> = discovery.discover(&["A", "B"]).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a_and_b"]);
        assert_eq!(discovery.discover(&["A"]).len(), 2);
        assert!(discovery.discover(&["C"]).is_empty());
    }

    #[test]
    fn test_find_best_agent_tie_goes_to_first_registered() {
        let registry = registry_with(&[
            ("first", vec!["A"]),
            ("second", vec!["A"]),
            ("third", vec!["A"]),
        ]);
        let discovery = AgentDiscovery::new(registry);

        let tie = discovery.find_best_agent("A", |_| 1.0).unwrap();
        assert_eq!(tie.id, "first");

        let best = discovery
            .find_best_agent("A", |r| if r.id == "third" { 9.0 } else { 1.0 })
            .unwrap();
        assert_eq!(best.id, "third");
        assert!(discovery.find_best_agent("Z", |_| 1.0).is_none());
    }

    #[test]
    fn test_discover_by_tags() {
        let registry = registry_with(&[("math", vec!["math"]), ("text", vec!["text"])]);
        let discovery = AgentDiscovery::new(registry);
        let found = discovery.discover_by_tags(&["text", "poetry"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "text");
    }
}
