use crate::diagnostic::{Diagnostic, ParseError};
use crate::model::{Chain, JumpKind, Rule, Ruleset};
use anyhow::{Context, Result};
use regex::Regex;
use std::io::BufRead;
use std::sync::LazyLock;
use tracing::{debug, warn};

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*(?P<table>\S+)").expect("table pattern"));
static CHAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:(?P<chain>\S+) (?P<policy>\S+) (?P<counters>\S+)").expect("chain pattern")
});
static RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-A (?P<chain>\S+)(?: (?P<conditions>.*))? -(?P<kind>[jg]) (?P<target>.*)")
        .expect("rule pattern")
});
static COMMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^COMMIT").expect("commit pattern"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(?P<comment>.*)").expect("comment pattern"));

/// One classified line of iptables-save output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Table {
        name: &'a str,
    },
    Chain {
        name: &'a str,
        policy: &'a str,
        counters: &'a str,
    },
    Rule {
        chain: &'a str,
        conditions: &'a str,
        kind: JumpKind,
        target: &'a str,
    },
    Commit,
    Comment,
}

/// Classify a trimmed line. Patterns are tried in a fixed order and the first match wins.
pub fn classify(line: &str) -> Option<LineKind<'_>> {
    if let Some(caps) = TABLE_RE.captures(line) {
        let name = caps.name("table")?.as_str();
        return Some(LineKind::Table { name });
    }

    if let Some(caps) = CHAIN_RE.captures(line) {
        return Some(LineKind::Chain {
            name: caps.name("chain")?.as_str(),
            policy: caps.name("policy")?.as_str(),
            counters: caps.name("counters")?.as_str(),
        });
    }

    if let Some(caps) = RULE_RE.captures(line) {
        let kind = match caps.name("kind")?.as_str() {
            "g" => JumpKind::Goto,
            _ => JumpKind::Jump,
        };
        return Some(LineKind::Rule {
            chain: caps.name("chain")?.as_str(),
            conditions: caps.name("conditions").map(|m| m.as_str()).unwrap_or(""),
            kind,
            target: caps.name("target")?.as_str().trim(),
        });
    }

    if COMMIT_RE.is_match(line) {
        return Some(LineKind::Commit);
    }

    if COMMENT_RE.is_match(line) {
        return Some(LineKind::Comment);
    }

    None
}

/// Everything the parser produced: the model and the lines it had to skip.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub ruleset: Ruleset,
    pub diagnostics: Vec<Diagnostic>,
}

/// Mutable state threaded through each line handler.
#[derive(Debug, Default)]
pub struct ParserState {
    ruleset: Ruleset,
    current_table: Option<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_table(&self) -> Option<&str> {
        self.current_table.as_deref()
    }

    /// Feed one raw line. Blank lines are ignored; anything unusable becomes a diagnostic.
    pub fn handle_line(&mut self, line_no: usize, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        let result = match classify(line) {
            Some(LineKind::Table { name }) => {
                self.ruleset.begin_table(name);
                self.current_table = Some(name.to_string());
                Ok(())
            }
            Some(LineKind::Chain {
                name,
                policy,
                counters,
            }) => self.handle_chain(name, policy, counters),
            Some(LineKind::Rule {
                chain,
                conditions,
                kind,
                target,
            }) => self.handle_rule(chain, conditions, kind, target),
            Some(LineKind::Commit) => {
                self.current_table = None;
                Ok(())
            }
            Some(LineKind::Comment) => Ok(()),
            None => Err(ParseError::Unrecognized),
        };

        if let Err(error) = result {
            let diagnostic = Diagnostic::new(line_no, line, error);
            warn!("{}", diagnostic);
            self.diagnostics.push(diagnostic);
        }
    }

    fn handle_chain(
        &mut self,
        name: &str,
        policy: &str,
        counters: &str,
    ) -> Result<(), ParseError> {
        let table = self
            .current_table
            .as_deref()
            .and_then(|t| self.ruleset.table_mut(t))
            .ok_or(ParseError::NoActiveTable {
                directive: "chain declaration",
            })?;

        debug!(table = %table.name, chain = name, policy, "declared chain");
        table.declare_chain(Chain::new(name, policy, counters));
        Ok(())
    }

    fn handle_rule(
        &mut self,
        chain: &str,
        conditions: &str,
        kind: JumpKind,
        target: &str,
    ) -> Result<(), ParseError> {
        if target.is_empty() {
            return Err(ParseError::EmptyTarget {
                chain: chain.to_string(),
            });
        }

        let table = self
            .current_table
            .as_deref()
            .and_then(|t| self.ruleset.table_mut(t))
            .ok_or(ParseError::NoActiveTable { directive: "rule" })?;

        table
            .append_rule(Rule::new(chain, conditions, kind, target))
            .map_err(|rule| ParseError::UnknownChain {
                table: table.name.clone(),
                chain: rule.chain,
            })
    }

    pub fn finish(self) -> ParseOutcome {
        ParseOutcome {
            ruleset: self.ruleset,
            diagnostics: self.diagnostics,
        }
    }
}

pub struct RulesetParser;

impl RulesetParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse an iptables-save stream. Only I/O failures are fatal.
    pub fn parse<R: BufRead>(&self, reader: R) -> Result<ParseOutcome> {
        let mut state = ParserState::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read input line {}", idx + 1))?;
            state.handle_line(idx + 1, &line);
        }

        Ok(state.finish())
    }

    pub fn parse_str(&self, input: &str) -> ParseOutcome {
        let mut state = ParserState::new();
        for (idx, line) in input.lines().enumerate() {
            state.handle_line(idx + 1, line);
        }
        state.finish()
    }
}

impl Default for RulesetParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Target;

    const SAMPLE: &str = "\
# Generated by iptables-save v1.8.7
*nat
:PREROUTING ACCEPT [0:0]
:POSTROUTING ACCEPT [0:0]
-A POSTROUTING -s 10.0.0.0/24 -o eth0 -j MASQUERADE
COMMIT
*filter
:INPUT DROP [120:9000]
:FORWARD DROP [0:0]
:OUTPUT ACCEPT [0:0]
:LOG_DROP - [0:0]
-A INPUT -i lo -j ACCEPT
-A INPUT -p tcp -m tcp --dport 22 -j ACCEPT
-A INPUT -j LOG_DROP
-A FORWARD -g LOG_DROP
-A LOG_DROP -m limit --limit 5/min -j LOG --log-prefix \"dropped: \"
-A LOG_DROP -j DROP
COMMIT
";

    #[test]
    fn classify_recognizes_each_directive() {
        assert_eq!(classify("*filter"), Some(LineKind::Table { name: "filter" }));
        assert_eq!(
            classify(":INPUT ACCEPT [0:0]"),
            Some(LineKind::Chain {
                name: "INPUT",
                policy: "ACCEPT",
                counters: "[0:0]"
            })
        );
        assert_eq!(classify("COMMIT"), Some(LineKind::Commit));
        assert_eq!(classify("# comment"), Some(LineKind::Comment));
        assert_eq!(classify("garbage here"), None);
    }

    #[test]
    fn classify_rule_splits_conditions_and_target() {
        assert_eq!(
            classify("-A INPUT -p tcp --dport 22 -j ACCEPT"),
            Some(LineKind::Rule {
                chain: "INPUT",
                conditions: "-p tcp --dport 22",
                kind: JumpKind::Jump,
                target: "ACCEPT"
            })
        );
        assert_eq!(
            classify("-A INPUT -j REJECT --reject-with icmp-port-unreachable"),
            Some(LineKind::Rule {
                chain: "INPUT",
                conditions: "",
                kind: JumpKind::Jump,
                target: "REJECT --reject-with icmp-port-unreachable"
            })
        );
        assert_eq!(
            classify("-A FORWARD -i br0 -g LOG_DROP"),
            Some(LineKind::Rule {
                chain: "FORWARD",
                conditions: "-i br0",
                kind: JumpKind::Goto,
                target: "LOG_DROP"
            })
        );
    }

    #[test]
    fn rule_without_target_is_unrecognized() {
        assert_eq!(classify("-A INPUT -p tcp"), None);
    }

    #[test]
    fn parses_tables_chains_and_rules() {
        let outcome = RulesetParser::new().parse_str(SAMPLE);
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);

        let ruleset = &outcome.ruleset;
        assert_eq!(ruleset.tables.len(), 2);
        assert_eq!(ruleset.tables[0].name, "nat");

        let filter = ruleset.table("filter").expect("filter table");
        assert_eq!(filter.chains.len(), 4);
        assert_eq!(filter.policy("INPUT"), Some("DROP"));
        assert_eq!(filter.policy("LOG_DROP"), None);

        let input = filter.rules("INPUT");
        assert_eq!(input.len(), 3);
        assert_eq!(input[0].conditions, "-i lo");
        assert_eq!(input[2].conditions, "");
        assert_eq!(input[2].target, Target::Chain("LOG_DROP".into()));

        let forward = filter.rules("FORWARD");
        assert_eq!(forward[0].kind, JumpKind::Goto);

        assert_eq!(ruleset.rule_count(), 7);
    }

    #[test]
    fn unrecognized_line_is_reported_and_parsing_continues() {
        let input = "*filter\n:INPUT ACCEPT [0:0]\n-A INPUT -j ACCEPT\nthis is noise\n-A INPUT -p udp -j DROP\nCOMMIT\n";
        let outcome = RulesetParser::new().parse_str(input);

        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].line_no, 4);
        assert_eq!(outcome.diagnostics[0].error, ParseError::Unrecognized);

        let rules = outcome.ruleset.table("filter").unwrap().rules("INPUT");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].target, Target::Verdict("DROP".into()));
    }

    #[test]
    fn blank_lines_are_silent() {
        let outcome = RulesetParser::new().parse_str("\n   \n*filter\n\nCOMMIT\n");
        assert!(outcome.diagnostics.is_empty());
        assert!(outcome.ruleset.table("filter").is_some());
    }

    #[test]
    fn directives_outside_table_are_reported() {
        let input = ":INPUT ACCEPT [0:0]\n*filter\n:INPUT ACCEPT [0:0]\nCOMMIT\n-A INPUT -j DROP\n";
        let outcome = RulesetParser::new().parse_str(input);

        let errors: Vec<_> = outcome.diagnostics.iter().map(|d| &d.error).collect();
        assert_eq!(
            errors,
            vec![
                &ParseError::NoActiveTable {
                    directive: "chain declaration"
                },
                &ParseError::NoActiveTable { directive: "rule" },
            ]
        );
        assert!(outcome.ruleset.table("filter").unwrap().rules("INPUT").is_empty());
    }

    #[test]
    fn rule_for_undeclared_chain_is_reported() {
        let input = "*filter\n:INPUT ACCEPT [0:0]\n-A GHOST -j DROP\nCOMMIT\n";
        let outcome = RulesetParser::new().parse_str(input);

        assert_eq!(
            outcome.diagnostics[0].error,
            ParseError::UnknownChain {
                table: "filter".into(),
                chain: "GHOST".into()
            }
        );
        assert_eq!(outcome.ruleset.table("filter").unwrap().chains.len(), 1);
    }

    #[test]
    fn parse_reads_from_buffered_reader() {
        let outcome = RulesetParser::new()
            .parse(std::io::Cursor::new(SAMPLE.as_bytes()))
            .expect("parse");
        assert_eq!(outcome.ruleset.tables.len(), 2);
    }

    #[test]
    fn parser_state_tracks_current_table() {
        let mut state = ParserState::new();
        assert_eq!(state.current_table(), None);
        state.handle_line(1, "*mangle");
        assert_eq!(state.current_table(), Some("mangle"));
        state.handle_line(2, "COMMIT");
        assert_eq!(state.current_table(), None);
    }
}
