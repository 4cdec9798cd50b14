use crate::markup::html_escape;
use cf_core::{Chain, Target};

/// XHTML pages linked from the graph nodes
pub struct HtmlGenerator;

impl HtmlGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Listing of one chain's rules, with jump targets linked to their own pages.
    pub fn chain_page(&self, chain: &Chain) -> String {
        let mut lines = xhtml_head(&chain.name);
        lines.push(
            "    <p>[ <a href=\"javascript:history.go(-1)\">previous page</a> ]</p>".to_string(),
        );
        lines.push("    <pre class=\"iptables\">".to_string());

        for rule in &chain.rules {
            let target = match &rule.target {
                Target::Verdict(verdict) => {
                    format!("<span class=\"builtin\">{}</span>", html_escape(verdict))
                }
                Target::Chain(name) => {
                    let name = html_escape(name);
                    format!("<a href=\"{0}.html\">{0}</a>", name)
                }
            };
            let conditions = if rule.conditions.is_empty() {
                String::new()
            } else {
                format!("{} ", html_escape(&rule.conditions))
            };
            lines.push(format!(
                "-A {} {}{} {}",
                html_escape(&rule.chain),
                conditions,
                rule.kind.flag(),
                target
            ));
        }

        if let Some(policy) = &chain.policy {
            lines.push(format!(
                "(default <span class=\"builtin\">{}</span>)",
                html_escape(policy)
            ));
        }

        lines.push("    </pre>".to_string());
        lines.extend(xhtml_tail());
        lines.join("\n") + "\n"
    }

    /// Index of every generated graph. Each entry is a file stem such as `filter-INPUT`.
    pub fn index_page(&self, entry_graphs: &[String], table_graphs: &[String], format: &str) -> String {
        let mut lines = xhtml_head("iptables flow graphs");

        lines.push("    <h1>Entry chains</h1>".to_string());
        lines.extend(graph_list(entry_graphs, format));
        lines.push("    <h1>Tables</h1>".to_string());
        lines.extend(graph_list(table_graphs, format));

        lines.extend(xhtml_tail());
        lines.join("\n") + "\n"
    }
}

impl Default for HtmlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn graph_list(stems: &[String], format: &str) -> Vec<String> {
    if stems.is_empty() {
        return vec!["    <p>(none)</p>".to_string()];
    }

    let mut lines = vec!["    <ul>".to_string()];
    for stem in stems {
        let stem = html_escape(stem);
        lines.push(format!(
            "      <li><a href=\"{0}.{1}\">{0}</a> (<a href=\"{0}.dot\">dot</a>)</li>",
            stem, format
        ));
    }
    lines.push("    </ul>".to_string());
    lines
}

fn xhtml_head(title: &str) -> Vec<String> {
    vec![
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>".to_string(),
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\"".to_string(),
        "  \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">".to_string(),
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xml:lang=\"en\">".to_string(),
        "  <head>".to_string(),
        format!("    <title>{}</title>", html_escape(title)),
        "    <style>".to_string(),
        "    .builtin {".to_string(),
        "    color: red;".to_string(),
        "    }".to_string(),
        "    </style>".to_string(),
        "  </head>".to_string(),
        "  <body>".to_string(),
    ]
}

fn xhtml_tail() -> Vec<String> {
    vec!["  </body>".to_string(), "</html>".to_string()]
}
