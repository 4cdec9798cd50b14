// iptables-save ruleset model
use serde::{Deserialize, Serialize};
use std::fmt;

/// Targets that end evaluation instead of continuing in another chain.
pub const TERMINAL_VERDICTS: [&str; 8] = [
    "ACCEPT",
    "DROP",
    "REJECT",
    "MASQUERADE",
    "DNAT",
    "SNAT",
    "RETURN",
    "MARK",
];

/// Chains the kernel enters directly, in the order graphs are generated.
pub const BUILTIN_CHAINS: [&str; 5] = ["PREROUTING", "POSTROUTING", "INPUT", "OUTPUT", "FORWARD"];

/// Check whether a target string names a terminal verdict.
///
/// Only the first whitespace-delimited token counts, so
/// `REJECT --reject-with tcp-reset` is terminal.
pub fn is_terminal(target: &str) -> bool {
    target
        .split_whitespace()
        .next()
        .map(|head| TERMINAL_VERDICTS.contains(&head))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ruleset {
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub chains: Vec<Chain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    pub policy: Option<String>,
    pub counters: String,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JumpKind {
    Jump,
    Goto,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum Target {
    Verdict(String),
    Chain(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub chain: String,
    pub conditions: String,
    pub kind: JumpKind,
    pub target: Target,
}

impl Ruleset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Start a table, replacing any earlier table with the same name.
    pub fn begin_table(&mut self, name: &str) -> &mut Table {
        let idx = match self.tables.iter().position(|t| t.name == name) {
            Some(idx) => {
                self.tables[idx] = Table::new(name);
                idx
            }
            None => {
                self.tables.push(Table::new(name));
                self.tables.len() - 1
            }
        };
        &mut self.tables[idx]
    }

    pub fn chain(&self, table: &str, chain: &str) -> Option<&Chain> {
        self.table(table).and_then(|t| t.chain(chain))
    }

    /// Iterate every (table, chain) pair in declaration order.
    pub fn chains(&self) -> impl Iterator<Item = (&Table, &Chain)> {
        self.tables
            .iter()
            .flat_map(|table| table.chains.iter().map(move |chain| (table, chain)))
    }

    pub fn rule_count(&self) -> usize {
        self.chains().map(|(_, chain)| chain.rules.len()).sum()
    }
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            chains: vec![],
        }
    }

    pub fn chain(&self, name: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.name == name)
    }

    pub fn chain_mut(&mut self, name: &str) -> Option<&mut Chain> {
        self.chains.iter_mut().find(|c| c.name == name)
    }

    /// Declare a chain. Redeclaring keeps the position but resets the chain.
    pub fn declare_chain(&mut self, chain: Chain) {
        match self.chain_mut(&chain.name) {
            Some(existing) => *existing = chain,
            None => self.chains.push(chain),
        }
    }

    /// Append a rule to the chain it names, handing it back if that chain is unknown.
    pub fn append_rule(&mut self, rule: Rule) -> Result<(), Rule> {
        match self.chain_mut(&rule.chain) {
            Some(chain) => {
                chain.rules.push(rule);
                Ok(())
            }
            None => Err(rule),
        }
    }

    pub fn policy(&self, chain: &str) -> Option<&str> {
        self.chain(chain).and_then(|c| c.policy.as_deref())
    }

    pub fn rules(&self, chain: &str) -> &[Rule] {
        self.chain(chain).map(|c| c.rules.as_slice()).unwrap_or(&[])
    }
}

impl Chain {
    /// Build a chain from its declaration; a policy of `-` means none.
    pub fn new(name: &str, policy: &str, counters: &str) -> Self {
        let policy = match policy {
            "-" => None,
            other => Some(other.to_string()),
        };

        Self {
            name: name.to_string(),
            policy,
            counters: counters.to_string(),
            rules: vec![],
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.policy.is_some()
    }
}

impl Target {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if is_terminal(text) {
            Target::Verdict(text.to_string())
        } else {
            Target::Chain(text.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Verdict(name) | Target::Chain(name) => name,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Target::Verdict(_))
    }

    pub fn chain_name(&self) -> Option<&str> {
        match self {
            Target::Chain(name) => Some(name),
            Target::Verdict(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JumpKind {
    pub fn flag(&self) -> &'static str {
        match self {
            JumpKind::Jump => "-j",
            JumpKind::Goto => "-g",
        }
    }
}

impl Rule {
    pub fn new(chain: &str, conditions: &str, kind: JumpKind, target: &str) -> Self {
        Self {
            chain: chain.to_string(),
            conditions: conditions.to_string(),
            kind,
            target: Target::parse(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_matching_uses_first_token() {
        assert!(is_terminal("ACCEPT"));
        assert!(is_terminal("REJECT --reject-with icmp-port-unreachable"));
        assert!(is_terminal("MARK --set-xmark 0x1/0xffffffff"));
        assert!(!is_terminal("accept"));
        assert!(!is_terminal("LOG_DROP"));
        assert!(!is_terminal(""));
    }

    #[test]
    fn chain_policy_dash_means_none() {
        let user = Chain::new("LOG_DROP", "-", "[0:0]");
        assert!(user.policy.is_none());
        assert!(!user.is_builtin());

        let builtin = Chain::new("INPUT", "DROP", "[12:3400]");
        assert_eq!(builtin.policy.as_deref(), Some("DROP"));
        assert_eq!(builtin.counters, "[12:3400]");
    }

    #[test]
    fn append_rule_to_unknown_chain_is_rejected() {
        let mut table = Table::new("filter");
        table.declare_chain(Chain::new("INPUT", "ACCEPT", "[0:0]"));

        assert!(table
            .append_rule(Rule::new("INPUT", "-p tcp", JumpKind::Jump, "DROP"))
            .is_ok());
        let rejected = table
            .append_rule(Rule::new("MISSING", "", JumpKind::Jump, "ACCEPT"))
            .unwrap_err();
        assert_eq!(rejected.chain, "MISSING");
        assert_eq!(table.rules("INPUT").len(), 1);
        assert!(table.rules("MISSING").is_empty());
    }

    #[test]
    fn begin_table_replaces_existing() {
        let mut ruleset = Ruleset::new();
        ruleset
            .begin_table("filter")
            .declare_chain(Chain::new("INPUT", "ACCEPT", "[0:0]"));
        ruleset.begin_table("nat");
        ruleset.begin_table("filter");

        assert_eq!(ruleset.tables.len(), 2);
        assert_eq!(ruleset.tables[0].name, "filter");
        assert!(ruleset.chain("filter", "INPUT").is_none());
    }

    #[test]
    fn chains_iterates_every_pair_in_order() {
        let mut ruleset = Ruleset::new();
        let filter = ruleset.begin_table("filter");
        filter.declare_chain(Chain::new("INPUT", "ACCEPT", "[0:0]"));
        filter.declare_chain(Chain::new("FORWARD", "DROP", "[0:0]"));
        ruleset
            .begin_table("nat")
            .declare_chain(Chain::new("POSTROUTING", "ACCEPT", "[0:0]"));

        let pairs: Vec<(&str, &str)> = ruleset
            .chains()
            .map(|(t, c)| (t.name.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("filter", "INPUT"),
                ("filter", "FORWARD"),
                ("nat", "POSTROUTING")
            ]
        );
    }

    #[test]
    fn target_parse_classifies() {
        assert_eq!(Target::parse(" DROP "), Target::Verdict("DROP".into()));
        assert_eq!(
            Target::parse("LOG_DROP"),
            Target::Chain("LOG_DROP".into())
        );
        assert_eq!(Target::parse("LOG_DROP").chain_name(), Some("LOG_DROP"));
        assert_eq!(Target::parse("DROP").chain_name(), None);
    }
}
