use crate::markup::{dot_quote, html_escape, widen};
use cf_core::{JumpKind, Table, Target};
use cf_flow::{FlowEdge, Resolution};
use std::collections::HashSet;

/// Graphviz DOT emitter for resolved flows and table overviews
pub struct DotGenerator {
    format: String,
}

impl DotGenerator {
    pub fn new(format: &str) -> Self {
        Self {
            format: format.to_string(),
        }
    }

    /// Flow graph for one entry chain of a table.
    pub fn flow_graph(&self, table: &str, chain: &str, resolution: &Resolution) -> String {
        let stem = format!("{}-{}", table, chain);
        let mut lines = header_comment(table, &stem, &self.format);

        lines.push(format!(
            "digraph {} {{",
            dot_quote(&format!("table_{}_{}", table, chain))
        ));
        lines.push("  rankdir=LR;".to_string());
        lines.push(String::new());

        for name in resolution.chain_nodes() {
            lines.push(chain_node(table, name, resolution.rule_conditions(name)));
        }
        lines.push(String::new());

        let verdicts = resolution.verdicts();
        for verdict in &verdicts {
            lines.push(format!("  {}", dot_quote(verdict)));
        }
        lines.push(String::new());

        if !verdicts.is_empty() {
            let group: Vec<String> = verdicts.iter().map(|v| dot_quote(v)).collect();
            lines.push(format!("  {{rank=same; {}}}", group.join(" ")));
        }

        lines.extend(resolution.edges.iter().map(flow_edge));
        lines.push("}".to_string());

        lines.join("\n") + "\n"
    }

    /// Chain-to-chain overview of a whole table; verdicts are left out.
    pub fn table_overview(&self, table: &Table) -> String {
        let mut lines = header_comment(&table.name, &table.name, &self.format);

        lines.push(format!(
            "digraph {} {{",
            dot_quote(&format!("table_{}", table.name))
        ));
        lines.push("  rankdir=LR;".to_string());
        lines.push("  node [shape=box];".to_string());
        lines.push(String::new());

        for chain in &table.chains {
            let url = dot_quote(&format!("{}/{}.html", table.name, chain.name));
            match &chain.policy {
                Some(policy) => lines.push(format!(
                    "  {} [label={},URL={},style=filled,fillcolor=lightgrey];",
                    dot_quote(&chain.name),
                    dot_quote(&format!("{}\\n(policy {})", chain.name, policy)),
                    url
                )),
                None => lines.push(format!("  {} [URL={}];", dot_quote(&chain.name), url)),
            }
        }
        lines.push(String::new());

        let mut seen = HashSet::new();
        for chain in &table.chains {
            for rule in &chain.rules {
                let Target::Chain(target) = &rule.target else {
                    continue;
                };
                if !seen.insert((chain.name.as_str(), target.as_str(), rule.kind)) {
                    continue;
                }
                let style = match rule.kind {
                    JumpKind::Jump => "",
                    JumpKind::Goto => " [style=dashed]",
                };
                lines.push(format!(
                    "  {} -> {}{};",
                    dot_quote(&chain.name),
                    dot_quote(target),
                    style
                ));
            }
        }
        lines.push("}".to_string());

        lines.join("\n") + "\n"
    }
}

impl Default for DotGenerator {
    fn default() -> Self {
        Self::new("svg")
    }
}

fn header_comment(table: &str, stem: &str, format: &str) -> Vec<String> {
    vec![
        "/*".to_string(),
        " * This represents the relationship between chains in the".to_string(),
        format!(" * {} table.  To render it, install GraphViz", table),
        " * (http://www.graphviz.org/) and then run:".to_string(),
        " *".to_string(),
        format!(" * dot -T {0} -o {1}.{0} {1}.dot", format, stem),
        " *".to_string(),
        " */".to_string(),
    ]
}

/// A chain as an HTML-like table: a header port plus one port per rule.
fn chain_node(table: &str, name: &str, conditions: &[String]) -> String {
    let mut label = vec![format!(
        "<<table border=\"0\" cellborder=\"1\" cellspacing=\"0\"><tr><td bgcolor=\"lightgrey\" PORT=\"name\">{}</td></tr>",
        html_escape(&widen(name))
    )];
    for (idx, condition) in conditions.iter().enumerate() {
        label.push(format!(
            "<tr><td PORT=\"R{}\">{}</td></tr>",
            idx,
            html_escape(&widen(condition))
        ));
    }
    label.push("</table>>];".to_string());

    format!(
        "  {} [URL={},shape=none,margin=0,label={}",
        dot_quote(name),
        dot_quote(&format!("{}/{}.html", table, name)),
        label.join("\n")
    )
}

fn flow_edge(edge: &FlowEdge) -> String {
    let source = format!("{}:R{}:e", dot_quote(&edge.from.chain), edge.from.index);
    match &edge.to {
        Target::Verdict(verdict) => format!("  {} -> {}", source, dot_quote(verdict)),
        Target::Chain(chain) => format!("  {} -> {}:name:w", source, dot_quote(chain)),
    }
}
