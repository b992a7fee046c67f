//! Downstream flow hierarchy of the river network
//!
//! For every (river, immediate downstream) pair of the network, the hierarchy stores the
//! ordered chain of rivers further downstream, stopping before a terminal sink, at a
//! self-reference, or at the first river already visited.

use crate::layers::RiverNetwork;
use crate::naming::normalize_apostrophes;
use std::collections::{HashMap, HashSet};

/// Downstream names at which traversal stops by default
pub const DEFAULT_TERMINAL_SINKS: &[&str] = &["Чорне море", "Азовське море"];

/// (river, immediate downstream river)
pub type HierarchyKey = (String, String);

/// Precomputed downstream chains keyed by (river, immediate downstream)
#[derive(Debug, Clone, Default)]
pub struct RiverHierarchy {
    /// Normalized river name -> downstream reference of its first network row
    flows_to: HashMap<String, Option<String>>,
    /// Normalized terminal sink names
    sinks: HashSet<String>,
    chains: HashMap<HierarchyKey, Vec<String>>,
}

impl RiverHierarchy {
    /// Build chains for every network row with both a name and a downstream reference
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build<S: AsRef<str>>(network: &RiverNetwork, terminal_sinks: &[S]) -> Self {
        let mut flows_to = HashMap::new();
        for link in network.links() {
            if let Some(name) = &link.name {
                flows_to
                    .entry(normalize_apostrophes(name))
                    .or_insert_with(|| link.flow_to.clone());
            }
        }

        let mut hierarchy = Self {
            flows_to,
            sinks: terminal_sinks
                .iter()
                .map(|s| normalize_apostrophes(s.as_ref()))
                .collect(),
            chains: HashMap::new(),
        };

        for link in network.links() {
            let (Some(name), Some(flow_to)) = (&link.name, &link.flow_to) else {
                continue;
            };
            let key = (name.clone(), flow_to.clone());
            if hierarchy.chains.contains_key(&key) {
                continue;
            }
            let chain = hierarchy.walk(name, flow_to);
            hierarchy.chains.insert(key, chain);
        }

        tracing::info!(
            "Built river hierarchy: {} rivers, {} chains",
            hierarchy.flows_to.len(),
            hierarchy.chains.len()
        );
        hierarchy
    }

    /// Immediate downstream reference of a river, if the network has one
    pub fn flows_to(&self, river: &str) -> Option<&str> {
        self.flows_to
            .get(&normalize_apostrophes(river))
            .and_then(|f| f.as_deref())
    }

    /// Whether a name is one of the terminal sinks
    pub fn is_sink(&self, name: &str) -> bool {
        self.sinks.contains(&normalize_apostrophes(name))
    }

    /// Precomputed chain for a key; `None` when the pair is not a network row
    pub fn get(&self, key: &HierarchyKey) -> Option<&[String]> {
        self.chains.get(key).map(Vec::as_slice)
    }

    /// Chain of rivers downstream of `river`'s immediate downstream river.
    ///
    /// Unknown rivers and rivers draining straight into a sink yield an empty chain.
    pub fn chain(&self, river: &str) -> Vec<String> {
        match self.flows_to(river) {
            Some(flow_to) => {
                let key = (river.to_string(), flow_to.to_string());
                match self.chains.get(&key) {
                    Some(chain) => chain.clone(),
                    None => self.walk(river, flow_to),
                }
            }
            None => Vec::new(),
        }
    }

    /// Length of the longest chain
    pub fn max_chain_len(&self) -> usize {
        self.chains.values().map(Vec::len).max().unwrap_or(0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Follow downstream references starting after `flow_to`
    fn walk(&self, river: &str, flow_to: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(normalize_apostrophes(river));
        visited.insert(normalize_apostrophes(flow_to));

        let mut chain = Vec::new();
        let mut current = normalize_apostrophes(flow_to);
        while let Some(Some(next)) = self.flows_to.get(&current) {
            let normalized = normalize_apostrophes(next);
            if normalized == current || self.sinks.contains(&normalized) {
                break;
            }
            if !visited.insert(normalized.clone()) {
                tracing::debug!("Cycle in river network at {:?} (from {:?})", next, river);
                break;
            }
            chain.push(next.clone());
            current = normalized;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::RiverLink;

    fn network(rows: &[(&str, &str)]) -> RiverNetwork {
        RiverNetwork::new(
            rows.iter()
                .map(|(name, flow_to)| RiverLink::new(name, flow_to))
                .collect(),
        )
    }

    fn key(a: &str, b: &str) -> HierarchyKey {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_chain_stops_before_sink() {
        let hierarchy = RiverHierarchy::build(
            &network(&[("A", "B"), ("B", "C"), ("C", "Чорне море")]),
            DEFAULT_TERMINAL_SINKS,
        );
        assert_eq!(hierarchy.get(&key("A", "B")).unwrap(), ["C".to_string()]);
        assert!(hierarchy.get(&key("B", "C")).unwrap().is_empty());
        assert!(hierarchy.get(&key("C", "Чорне море")).unwrap().is_empty());
        assert_eq!(hierarchy.chain("A"), vec!["C".to_string()]);
        assert!(hierarchy.is_sink("Азовське море"));
    }

    #[test]
    fn test_self_loop_yields_empty_chain() {
        let hierarchy = RiverHierarchy::build(&network(&[("A", "A")]), DEFAULT_TERMINAL_SINKS);
        assert!(hierarchy.get(&key("A", "A")).unwrap().is_empty());

        let hierarchy =
            RiverHierarchy::build(&network(&[("A", "B"), ("B", "B")]), DEFAULT_TERMINAL_SINKS);
        assert!(hierarchy.get(&key("A", "B")).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_terminates_without_repeats() {
        let hierarchy = RiverHierarchy::build(
            &network(&[("A", "B"), ("B", "C"), ("C", "D"), ("D", "B")]),
            DEFAULT_TERMINAL_SINKS,
        );
        let chain = hierarchy.get(&key("A", "B")).unwrap();
        assert_eq!(chain, ["C".to_string(), "D".to_string()]);

        for chain in hierarchy.chains.values() {
            let unique: HashSet<&String> = chain.iter().collect();
            assert_eq!(unique.len(), chain.len());
            assert!(chain.iter().all(|name| !hierarchy.is_sink(name)));
        }
    }

    #[test]
    fn test_unknown_river_yields_empty_chain() {
        let hierarchy = RiverHierarchy::build(&network(&[("A", "B")]), DEFAULT_TERMINAL_SINKS);
        assert!(hierarchy.chain("Z").is_empty());
        assert!(hierarchy.get(&key("Z", "A")).is_none());
        // B has no row of its own
        assert!(hierarchy.get(&key("A", "B")).unwrap().is_empty());
    }

    #[test]
    fn test_apostrophe_variants_match() {
        let hierarchy = RiverHierarchy::build(
            &network(&[
                ("Уборть", "Прип'ять"),
                ("Прип’ять", "Дніпро"),
                ("Дніпро", "Чорне море"),
            ]),
            DEFAULT_TERMINAL_SINKS,
        );
        assert_eq!(
            hierarchy.get(&key("Уборть", "Прип'ять")).unwrap(),
            ["Дніпро".to_string()]
        );
        assert_eq!(hierarchy.flows_to("Прип'ять"), Some("Дніпро"));
    }

    #[test]
    fn test_first_row_wins() {
        let hierarchy = RiverHierarchy::build(
            &network(&[("A", "B"), ("B", "C"), ("B", "D"), ("C", "E")]),
            DEFAULT_TERMINAL_SINKS,
        );
        assert_eq!(
            hierarchy.get(&key("A", "B")).unwrap(),
            ["C".to_string(), "E".to_string()]
        );
        assert_eq!(hierarchy.flows_to("B"), Some("C"));
        assert_eq!(hierarchy.max_chain_len(), 2);
    }

    #[test]
    fn test_rows_without_downstream_are_ignored() {
        let hierarchy =
            RiverHierarchy::build(&network(&[("A", ""), ("", "B")]), DEFAULT_TERMINAL_SINKS);
        assert!(hierarchy.is_empty());
        assert_eq!(hierarchy.flows_to("A"), None);
    }
}
