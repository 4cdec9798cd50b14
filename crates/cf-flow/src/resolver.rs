use cf_core::{Table, Target};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use tracing::debug;

/// Outgoing port of one rule: the chain it lives in and its position there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RulePort {
    pub chain: String,
    pub index: usize,
}

/// One transition from a rule to a verdict node or a chain entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowEdge {
    pub from: RulePort,
    pub to: Target,
}

/// Result of walking a table from one or more start chains.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Edges in emission order
    pub edges: Vec<FlowEdge>,
    /// Condition text per chain, indexed by rule position
    pub conditions: BTreeMap<String, Vec<String>>,
    /// Chains whose rules were expanded, in processing order
    pub visited: Vec<String>,
}

impl fmt::Display for RulePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:R{}", self.chain, self.index)
    }
}

impl fmt::Display for FlowEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.to {
            Target::Verdict(verdict) => write!(f, "{} -> {}", self.from, verdict),
            Target::Chain(chain) => write!(f, "{} -> {}:name", self.from, chain),
        }
    }
}

impl Resolution {
    pub fn condition(&self, chain: &str, index: usize) -> Option<&str> {
        self.conditions
            .get(chain)
            .and_then(|rows| rows.get(index))
            .map(String::as_str)
    }

    pub fn rule_conditions(&self, chain: &str) -> &[String] {
        self.conditions
            .get(chain)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edges_from<'a>(&'a self, chain: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.from.chain == chain)
    }

    pub fn edges_into<'a>(&'a self, chain: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.to.chain_name() == Some(chain))
    }

    /// Distinct chain names touched by any edge, source or destination, in first-seen order.
    pub fn chain_nodes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut nodes = vec![];
        for edge in &self.edges {
            let names = [Some(edge.from.chain.as_str()), edge.to.chain_name()];
            for name in names.into_iter().flatten() {
                if seen.insert(name) {
                    nodes.push(name);
                }
            }
        }
        nodes
    }

    /// Distinct verdict labels reached, in first-seen order. One node per label.
    pub fn verdicts(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| e.to.is_terminal())
            .map(|e| e.to.as_str())
            .filter(|label| seen.insert(*label))
            .collect()
    }

    pub fn is_visited(&self, chain: &str) -> bool {
        self.visited.iter().any(|c| c == chain)
    }
}

/// Breadth-first walk over the chains of one table.
///
/// Each chain is expanded at most once, so cycles and shared sub-chains
/// cost one edge per reference and nothing more.
pub struct FlowResolver<'a> {
    table: &'a Table,
    policy_as_trailing_rule: bool,
}

impl<'a> FlowResolver<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            policy_as_trailing_rule: true,
        }
    }

    pub fn with_policy_as_trailing_rule(mut self, enabled: bool) -> Self {
        self.policy_as_trailing_rule = enabled;
        self
    }

    pub fn resolve(&self, start: &str) -> Resolution {
        self.resolve_from([start])
    }

    pub fn resolve_from<I, S>(&self, starts: I) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queue: VecDeque<String> = VecDeque::new();
        for start in starts {
            let start = start.as_ref();
            if !queue.iter().any(|q| q == start) {
                queue.push_back(start.to_string());
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut resolution = Resolution::default();

        while let Some(chain) = queue.pop_front() {
            if visited.contains(&chain) {
                continue;
            }

            let steps = self.steps(&chain);
            debug!(table = %self.table.name, chain = %chain, rules = steps.len(), "expanding chain");

            for (index, (conditions, target)) in steps.into_iter().enumerate() {
                resolution
                    .conditions
                    .entry(chain.clone())
                    .or_default()
                    .push(conditions.to_string());

                if let Some(next) = target.chain_name() {
                    if !queue.iter().any(|q| q == next) {
                        queue.push_back(next.to_string());
                    }
                }

                resolution.edges.push(FlowEdge {
                    from: RulePort {
                        chain: chain.clone(),
                        index,
                    },
                    to: target,
                });
            }

            visited.insert(chain.clone());
            resolution.visited.push(chain);
        }

        resolution
    }

    /// A chain's rules as (conditions, target), with the policy appended when enabled.
    fn steps(&self, chain: &str) -> Vec<(&'a str, Target)> {
        let Some(found) = self.table.chain(chain) else {
            return vec![];
        };

        let mut steps: Vec<(&'a str, Target)> = found
            .rules
            .iter()
            .map(|rule| (rule.conditions.as_str(), rule.target.clone()))
            .collect();

        if self.policy_as_trailing_rule {
            if let Some(policy) = &found.policy {
                steps.push(("", Target::Verdict(policy.clone())));
            }
        }

        steps
    }
}
